//! Peer dialers.
//!
//! - [`TcpDialer`]: forward mode, opens a raw TCP connection to the target.
//! - [`WsDialer`]: reverse mode, opens a WebSocket client connection to
//!   `ws://target` (or `wss://target`), offering the configured subprotocol.
//!   A target that completes the handshake without selecting the offered
//!   subprotocol is still accepted; the client stack refuses such a response,
//!   so the dialer reconnects once without the offer.
//!
//! Neither retries, and neither sets a connect timeout: a slow dial only
//! blocks the session that issued it.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::{ProtocolError, SubProtocolError};
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::header::{ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::application::{PeerDialer, RelayError};
use crate::domain::{FrameMode, RelayConfig};
use crate::infrastructure::frame_adapter::WsByteStream;
use crate::infrastructure::tls;

/// `ws://target` or `wss://target`.
pub fn peer_url(target: &str, tls: bool) -> String {
    let scheme = if tls { "wss" } else { "ws" };
    format!("{scheme}://{target}")
}

/// `http://target` or `https://target`, sent as the `Origin` header.
pub fn origin_url(target: &str, tls: bool) -> String {
    let scheme = if tls { "https" } else { "http" };
    format!("{scheme}://{target}")
}

// ── Forward mode ──────────────────────────────────────────────────────────────

/// Dials the raw TCP target.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    target: String,
}

impl TcpDialer {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl PeerDialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self) -> Result<TcpStream, RelayError> {
        let stream = TcpStream::connect(self.target.as_str())
            .await
            .map_err(|e| RelayError::dial(&self.target, e))?;

        // Relayed traffic is often small interactive writes.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay on connection to {} failed: {e}", self.target);
        }
        Ok(stream)
    }

    fn target(&self) -> &str {
        &self.target
    }
}

// ── Reverse mode ──────────────────────────────────────────────────────────────

/// Dials the WebSocket target and wraps the result as a byte stream.
#[derive(Clone)]
pub struct WsDialer {
    target: String,
    url: String,
    origin: String,
    subprotocol: Option<String>,
    frame_mode: FrameMode,
    tls: Option<Arc<ClientConfig>>,
}

impl WsDialer {
    /// Builds a dialer from the relay configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the target does not form a valid WebSocket URL, if
    /// the subprotocol is not a valid header value, or if the TLS client
    /// configuration cannot be built.
    pub fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        let tls = if config.client_tls {
            Some(tls::client_config(config.trust).context("failed to build TLS client config")?)
        } else {
            None
        };

        let dialer = Self {
            target: config.target.clone(),
            url: peer_url(&config.target, config.client_tls),
            origin: origin_url(&config.target, config.client_tls),
            subprotocol: config.subprotocol.clone(),
            frame_mode: config.frame_mode,
            tls,
        };

        // Surface a malformed target at startup instead of on every dial.
        dialer
            .request()
            .with_context(|| format!("invalid WebSocket target '{}'", config.target))?;

        Ok(dialer)
    }

    /// The URL every session dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds the opening-handshake request.
    pub fn request(&self) -> Result<Request, RelayError> {
        self.build_request(self.subprotocol.as_deref())
    }

    fn build_request(&self, subprotocol: Option<&str>) -> Result<Request, RelayError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::dial(&self.target, e))?;

        let headers = request.headers_mut();
        let origin =
            HeaderValue::from_str(&self.origin).map_err(|e| RelayError::dial(&self.target, e))?;
        headers.insert(ORIGIN, origin);

        if let Some(protocol) = subprotocol {
            let value =
                HeaderValue::from_str(protocol).map_err(|e| RelayError::dial(&self.target, e))?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        Ok(request)
    }

    async fn handshake(
        &self,
        request: Request,
    ) -> Result<(WebSocketStream<MaybeTlsStream<TcpStream>>, Response), WsError> {
        let connector = match &self.tls {
            Some(config) => Connector::Rustls(Arc::clone(config)),
            None => Connector::Plain,
        };
        connect_async_tls_with_config(request, None, true, Some(connector)).await
    }
}

#[async_trait]
impl PeerDialer for WsDialer {
    type Conn = WsByteStream<MaybeTlsStream<TcpStream>>;

    async fn dial(&self) -> Result<Self::Conn, RelayError> {
        let attempt = match self.handshake(self.request()?).await {
            Err(WsError::Protocol(ProtocolError::SecWebSocketSubProtocolError(
                SubProtocolError::NoSubProtocol,
            ))) => {
                warn!(
                    "{} ignored subprotocol {:?}; reconnecting without it",
                    self.url,
                    self.subprotocol.as_deref().unwrap_or_default()
                );
                self.handshake(self.build_request(None)?).await
            }
            other => other,
        };
        let (ws_stream, response) = attempt.map_err(|e| RelayError::dial(&self.url, e))?;

        let negotiated = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        debug!("connected to {} (subprotocol: {negotiated:?})", self.url);

        Ok(WsByteStream::new(ws_stream, self.frame_mode))
    }

    fn target(&self) -> &str {
        &self.url
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
