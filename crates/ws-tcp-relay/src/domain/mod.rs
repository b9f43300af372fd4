//! Domain layer for ws-tcp-relay.
//!
//! Pure types with no I/O: the relay configuration and the session model.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod session;

pub use config::{
    AcceptErrorPolicy, Direction, FrameMode, RelayConfig, ServerTlsConfig, TrustPolicy,
};
pub use session::{SessionInfo, SessionState};
