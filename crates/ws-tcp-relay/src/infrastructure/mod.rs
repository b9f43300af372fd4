//! Infrastructure layer for ws-tcp-relay.
//!
//! Everything that touches a socket: listeners, the WebSocket handshake and
//! framing, TLS, and the two peer dialers.
//!
//! # What does NOT belong here?
//!
//! - Copy loops and teardown ordering (application layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod dialer;
pub mod frame_adapter;
pub mod listener;
pub mod stream;
pub mod tcp_server;
pub mod tls;
pub mod ws_server;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::domain::{Direction, RelayConfig};

pub use dialer::{TcpDialer, WsDialer};
pub use frame_adapter::WsByteStream;
pub use tcp_server::ReverseServer;
pub use ws_server::ForwardServer;

/// Binds the listener for `config.direction` and serves until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if startup fails (TLS material, invalid target, bind
/// failure) or if the accept loop gives up.
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    match config.direction {
        Direction::Forward => ForwardServer::bind(config).await?.run(running).await?,
        Direction::Reverse => ReverseServer::bind(config).await?.run(running).await?,
    }
    Ok(())
}
