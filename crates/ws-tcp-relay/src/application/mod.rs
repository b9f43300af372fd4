//! Application layer for ws-tcp-relay.
//!
//! Knows *what* a session does (negotiate, dial, pump, tear down) but not
//! which sockets it runs on.  Everything here is generic over
//! `AsyncRead + AsyncWrite`, so it can be tested with in-memory pipes.
//!
//! # What does NOT belong here?
//!
//! - Binding listeners or accepting connections (infrastructure)
//! - WebSocket framing and TLS (infrastructure)

pub mod error;
pub mod negotiate;
pub mod pump;
pub mod session;

pub use error::RelayError;
pub use negotiate::{first_offered_subprotocol, negotiate_subprotocol};
pub use pump::{Pump, PumpState};
pub use session::{relay_session, PeerDialer};
