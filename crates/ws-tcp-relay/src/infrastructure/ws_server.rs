//! Forward mode: WebSocket listener relaying to a raw TCP target.
//!
//! Per accepted connection, in its own task:
//!
//! 1. Terminate TLS if certificate material is configured.
//! 2. Run the WebSocket opening handshake, checking the client's first
//!    offered subprotocol.  A mismatch is answered with `400 Bad Request` and
//!    the session ends here, before the target is dialed.
//! 3. Dial the target and pump bytes until either side closes.
//!
//! Failures in any step are logged and only affect that session.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, info, warn};

use crate::application::{
    first_offered_subprotocol, negotiate_subprotocol, relay_session, PeerDialer, RelayError,
};
use crate::domain::{Direction, RelayConfig, SessionInfo, SessionState};
use crate::infrastructure::dialer::TcpDialer;
use crate::infrastructure::frame_adapter::WsByteStream;
use crate::infrastructure::listener::{accept_loop, bind};
use crate::infrastructure::stream::ClientStream;
use crate::infrastructure::tls;

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound forward-mode listener.
///
/// Generic over the dialer so tests can observe whether the target is ever
/// dialed; production code uses [`TcpDialer`].
pub struct ForwardServer<D = TcpDialer> {
    listener: TcpListener,
    ctx: Arc<ForwardContext<D>>,
}

/// Everything a forward session needs, shared read-only across tasks.
struct ForwardContext<D> {
    config: RelayConfig,
    tls: Option<TlsAcceptor>,
    dialer: D,
}

impl ForwardServer<TcpDialer> {
    /// Loads TLS material (if any) and binds `config.listen_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate or key cannot be loaded, or if the
    /// listener cannot be bound.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        let dialer = TcpDialer::new(config.target.clone());
        Self::with_dialer(config, dialer).await
    }
}

impl<D> ForwardServer<D>
where
    D: PeerDialer + 'static,
{
    /// Like [`ForwardServer::bind`] with a caller-supplied dialer.
    ///
    /// # Errors
    ///
    /// See [`ForwardServer::bind`].
    pub async fn with_dialer(config: RelayConfig, dialer: D) -> anyhow::Result<Self> {
        let tls = config
            .server_tls
            .as_ref()
            .map(tls::server_acceptor)
            .transpose()
            .context("failed to load TLS certificate")?;

        let listener = bind(config.listen_addr).await?;

        Ok(Self {
            listener,
            ctx: Arc::new(ForwardContext {
                config,
                tls,
                dialer,
            }),
        })
    }

    /// The address actually bound (useful when the configured port is 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts WebSocket clients until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Only if the accept-error policy declares the listener dead.
    pub async fn run(self, running: Arc<AtomicBool>) -> Result<(), RelayError> {
        let scheme = if self.ctx.tls.is_some() { "wss" } else { "ws" };
        info!(
            "listening on {} ({scheme}, forward mode) -> tcp {}",
            self.local_addr().unwrap_or(self.ctx.config.listen_addr),
            self.ctx.config.target
        );

        let policy = self.ctx.config.accept_errors;
        accept_loop(&self.listener, &running, policy, |stream, peer_addr| {
            info!("new WebSocket client connection from {peer_addr}");
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                ctx.handle(stream, peer_addr).await;
            });
        })
        .await
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

impl<D: PeerDialer> ForwardContext<D> {
    /// Session task entry point: runs the session and logs how it ended.
    async fn handle(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let mut session = SessionInfo::new(peer_addr, Direction::Forward, self.config.frame_mode);

        match self.run_session(stream, &mut session).await {
            Ok(()) => info!("session {session} closed"),
            Err(e @ RelayError::ProtocolMismatch { .. }) => {
                warn!("session {session} rejected: {e}")
            }
            Err(e) => warn!("session {session} aborted: {e}"),
        }
        session.advance(SessionState::Closed);
    }

    async fn run_session(
        &self,
        stream: TcpStream,
        session: &mut SessionInfo,
    ) -> Result<(), RelayError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("session {session}: set_nodelay failed: {e}");
        }

        let stream = match &self.tls {
            Some(acceptor) => {
                let tls_stream = acceptor
                    .accept(stream)
                    .await
                    .map_err(|e| RelayError::Handshake(format!("TLS: {e}")))?;
                ClientStream::Tls(Box::new(tls_stream))
            }
            None => ClientStream::Plain(stream),
        };
        let scheme = if stream.is_encrypted() { "wss" } else { "ws" };

        let (ws_stream, subprotocol) =
            accept_websocket(stream, self.config.subprotocol.as_deref()).await?;
        session.subprotocol = subprotocol;
        info!(
            "session {session}: {scheme} established (subprotocol: {})",
            session.subprotocol.as_deref().unwrap_or("none")
        );

        let client = WsByteStream::new(ws_stream, self.config.frame_mode);
        relay_session(client, &self.dialer, session).await
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Completes the server side of the WebSocket opening handshake.
///
/// The first token of the client's `Sec-WebSocket-Protocol` offer is checked
/// against `expected` and, when accepted, echoed in the response.  Returns the
/// established stream and the agreed subprotocol.
///
/// # Errors
///
/// - [`RelayError::ProtocolMismatch`] if the offer does not satisfy
///   `expected`; the client receives `400 Bad Request`.
/// - [`RelayError::Handshake`] for any other handshake failure.
pub async fn accept_websocket<S>(
    stream: S,
    expected: Option<&str>,
) -> Result<(WebSocketStream<S>, Option<String>), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut negotiated: Result<Option<String>, RelayError> = Ok(None);

    let callback = |request: &Request, mut response: Response| {
        let offered = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .and_then(first_offered_subprotocol);

        match negotiate_subprotocol(expected, offered) {
            Ok(selected) => {
                if let Some(value) = selected
                    .as_deref()
                    .and_then(|p| HeaderValue::from_str(p).ok())
                {
                    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                }
                negotiated = Ok(selected);
                Ok(response)
            }
            Err(e) => {
                let rejection = reject(&e.to_string());
                negotiated = Err(e);
                Err(rejection)
            }
        }
    };

    let handshake = accept_hdr_async(stream, callback).await;

    let subprotocol = negotiated?;
    let ws_stream = handshake.map_err(|e| RelayError::Handshake(e.to_string()))?;
    Ok((ws_stream, subprotocol))
}

fn reject(reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────
