//! Session identity and lifecycle.
//!
//! A session is one client connection paired with one dialed peer connection.
//! It lives only in memory, for the duration of one relay.
//!
//! ```text
//! Accepted ──► Dialing ──► Relaying ──► Closed
//!                 │                       ▲
//!                 └───────────────────────┘   (dial / negotiation failure)
//! ```

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

use super::config::{Direction, FrameMode};

/// Lifecycle state of a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The client connection has been accepted (and its handshake, if any,
    /// completed).
    Accepted,
    /// The peer connection is being established.
    Dialing,
    /// Both connections are owned by the pump.
    Relaying,
    /// Both connections are closed.  Terminal.
    Closed,
}

impl SessionState {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Accepted, Dialing)
                | (Accepted, Closed)
                | (Dialing, Relaying)
                | (Dialing, Closed)
                | (Relaying, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Accepted => "accepted",
            SessionState::Dialing => "dialing",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Descriptive metadata for one session.
///
/// The connections themselves are not stored here; they are moved into the
/// pump, which owns them exclusively.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Random identifier used to correlate log lines.
    pub id: Uuid,
    /// Remote address of the accepted client.
    pub client_addr: SocketAddr,
    /// Relay direction this session was accepted under.
    pub direction: Direction,
    /// Outgoing WebSocket frame encoding.
    pub frame_mode: FrameMode,
    /// Subprotocol agreed during the WebSocket handshake, if any.
    pub subprotocol: Option<String>,
    state: SessionState,
}

impl SessionInfo {
    /// Creates a session in the [`SessionState::Accepted`] state.
    pub fn new(client_addr: SocketAddr, direction: Direction, frame_mode: FrameMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_addr,
            direction,
            frame_mode,
            subprotocol: None,
            state: SessionState::Accepted,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves the session to `next`.
    ///
    /// Illegal transitions are ignored and reported as `false`; the session
    /// keeps its current state.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if self.state.can_transition_to(next) {
            tracing::debug!("session {self}: {} -> {next}", self.state);
            self.state = next;
            true
        } else {
            false
        }
    }

    /// First eight hex digits of the id; enough to tell sessions apart in logs.
    pub fn short_id(&self) -> String {
        let mut s = self.id.simple().to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}/{})",
            self.short_id(),
            self.client_addr,
            self.direction,
            self.frame_mode
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
