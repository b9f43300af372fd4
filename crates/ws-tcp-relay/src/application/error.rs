//! Relay error taxonomy.
//!
//! Only [`RelayError::Listen`] (and [`RelayError::Accept`] once the configured
//! limit of consecutive failures is reached) ends the process.  Every other
//! variant aborts one session and is logged by the listener.
//!
//! I/O failures during an active relay are deliberately absent: they are the
//! normal way a copy worker stops and never leave the pump.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors produced while accepting, negotiating or dialing a session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be created or bound.  Fatal.
    #[error("failed to bind listener on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// `accept()` failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The peer connection could not be established (refused, unresolvable,
    /// TLS failure, or WebSocket handshake rejected).
    #[error("failed to dial {target}: {reason}")]
    Dial { target: String, reason: String },

    /// The client did not offer the expected subprotocol.
    #[error("subprotocol mismatch: expected '{expected}', client offered '{offered}'")]
    ProtocolMismatch { expected: String, offered: String },

    /// The client-side TLS or WebSocket opening handshake failed.
    #[error("client handshake failed: {0}")]
    Handshake(String),
}

impl RelayError {
    /// Builds a [`RelayError::Dial`] from any displayable cause.
    pub fn dial(target: impl Into<String>, reason: impl ToString) -> Self {
        RelayError::Dial {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`RelayError::ProtocolMismatch`]; an absent offer is shown as
    /// an empty string.
    pub fn mismatch(expected: &str, offered: Option<&str>) -> Self {
        RelayError::ProtocolMismatch {
            expected: expected.to_string(),
            offered: offered.unwrap_or_default().to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
