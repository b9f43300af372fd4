//! Reverse mode: raw TCP listener relaying to a WebSocket target.
//!
//! Each accepted TCP client gets its own outbound WebSocket connection to the
//! fixed target (`ws://` or `wss://`), offering the configured subprotocol.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::application::{relay_session, PeerDialer, RelayError};
use crate::domain::{Direction, RelayConfig, SessionInfo};
use crate::infrastructure::dialer::WsDialer;
use crate::infrastructure::listener::{accept_loop, bind};

/// A bound reverse-mode listener.
pub struct ReverseServer<D = WsDialer> {
    listener: TcpListener,
    ctx: Arc<ReverseContext<D>>,
}

struct ReverseContext<D> {
    config: RelayConfig,
    dialer: D,
}

impl ReverseServer<WsDialer> {
    /// Prepares the WebSocket dialer and binds `config.listen_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target is not a valid WebSocket authority, the
    /// TLS client config cannot be built, or the listener cannot be bound.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        let dialer = WsDialer::new(&config)?;
        Self::with_dialer(config, dialer).await
    }
}

impl<D> ReverseServer<D>
where
    D: PeerDialer + 'static,
{
    /// Like [`ReverseServer::bind`] with a caller-supplied dialer.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn with_dialer(config: RelayConfig, dialer: D) -> anyhow::Result<Self> {
        let listener = bind(config.listen_addr).await?;
        Ok(Self {
            listener,
            ctx: Arc::new(ReverseContext { config, dialer }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts TCP clients until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Only if the accept-error policy declares the listener dead.
    pub async fn run(self, running: Arc<AtomicBool>) -> Result<(), RelayError> {
        info!(
            "listening on {} (tcp, reverse mode) -> {}",
            self.local_addr().unwrap_or(self.ctx.config.listen_addr),
            self.ctx.dialer.target()
        );

        let policy = self.ctx.config.accept_errors;
        accept_loop(&self.listener, &running, policy, |stream, peer_addr| {
            info!("new TCP client connection from {peer_addr}");
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                ctx.handle(stream, peer_addr).await;
            });
        })
        .await
    }
}

impl<D: PeerDialer> ReverseContext<D> {
    async fn handle(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let mut session = SessionInfo::new(peer_addr, Direction::Reverse, self.config.frame_mode);
        session.subprotocol = self.config.subprotocol.clone();

        if let Err(e) = stream.set_nodelay(true) {
            debug!("session {session}: set_nodelay failed: {e}");
        }

        match relay_session(stream, &self.dialer, &mut session).await {
            Ok(()) => info!("session {session} closed"),
            Err(e) => warn!("session {session} aborted: {e}"),
        }
    }
}
