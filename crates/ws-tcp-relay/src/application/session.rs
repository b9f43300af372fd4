//! Session orchestration: dial the peer, then hand both connections to the
//! pump.
//!
//! The listener owns the client connection only until [`relay_session`] is
//! called.  From then on the connection belongs to the session, and once the
//! peer is dialed both belong to the [`Pump`].

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::application::error::RelayError;
use crate::application::pump::Pump;
use crate::domain::session::{SessionInfo, SessionState};

/// Produces the peer-side connection for a session.
///
/// Forward mode dials raw TCP; reverse mode dials a WebSocket endpoint.  Tests
/// substitute in-memory or counting implementations.
#[async_trait]
pub trait PeerDialer: Send + Sync {
    /// The duplex byte stream returned by a successful dial.
    type Conn: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Opens one peer connection.  No retries.
    ///
    /// # Errors
    ///
    /// [`RelayError::Dial`] if the peer cannot be reached or rejects the
    /// handshake.
    async fn dial(&self) -> Result<Self::Conn, RelayError>;

    /// Human-readable target for log lines.
    fn target(&self) -> &str;
}

/// Runs one session to completion.
///
/// On dial failure the client connection is shut down and the error is
/// returned; the pump is never started.  On success the call returns after
/// both directions have finished and both connections are closed.
///
/// # Errors
///
/// Whatever [`PeerDialer::dial`] returned.
pub async fn relay_session<C, D>(
    mut client: C,
    dialer: &D,
    session: &mut SessionInfo,
) -> Result<(), RelayError>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    D: PeerDialer + ?Sized,
{
    session.advance(SessionState::Dialing);

    let peer = match dialer.dial().await {
        Ok(peer) => peer,
        Err(e) => {
            // Best effort: the client may already be gone.
            let _ = client.shutdown().await;
            session.advance(SessionState::Closed);
            return Err(e);
        }
    };

    info!("session {session}: connected to {}", dialer.target());
    session.advance(SessionState::Relaying);

    Pump::new(format!("session {session}")).run(client, peer).await;

    session.advance(SessionState::Closed);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
