//! Listening socket and the shared accept loop.
//!
//! Both relay directions accept plain TCP first (the forward listener layers
//! TLS and the WebSocket upgrade on top inside the session task), so they
//! share one loop.  The loop never waits for a session: each accepted
//! connection is handed to `on_accept`, which is expected to spawn.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::application::RelayError;
use crate::domain::AcceptErrorPolicy;

/// How often the loop wakes to check the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Pause after a failed `accept()`, so a persistent failure such as
/// descriptor exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Binds the listening socket.
///
/// # Errors
///
/// [`RelayError::Listen`] if the address is in use, not local, or the
/// process lacks permission.  This is the one fatal condition.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Listen { addr, source })
}

/// Accepts connections until `running` is cleared.
///
/// # Errors
///
/// [`RelayError::Accept`] once `policy` declares the run of consecutive
/// accept failures fatal.  With the default policy this never happens.
pub async fn accept_loop<F>(
    listener: &TcpListener,
    running: &AtomicBool,
    policy: AcceptErrorPolicy,
    mut on_accept: F,
) -> Result<(), RelayError>
where
    F: FnMut(TcpStream, SocketAddr),
{
    let mut consecutive_errors: u32 = 0;

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            return Ok(());
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                consecutive_errors = 0;
                on_accept(stream, peer_addr);
            }
            Ok(Err(e)) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                warn!("accept error ({consecutive_errors} in a row): {e}");
                if policy.is_fatal(consecutive_errors) {
                    return Err(RelayError::Accept(e));
                }
                sleep(ACCEPT_BACKOFF).await;
            }
            // Poll timeout; re-check the shutdown flag.
            Err(_) => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_bind_in_use_is_listen_error() {
        // Arrange: occupy a port
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        // Act
        let result = bind(addr).await;

        // Assert
        assert!(matches!(result, Err(RelayError::Listen { .. })));
    }

    #[tokio::test]
    async fn test_accept_loop_hands_off_and_stops_on_flag() {
        // Arrange
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let running_loop = Arc::clone(&running);
        let accept = tokio::spawn(async move {
            accept_loop(
                &listener,
                &running_loop,
                AcceptErrorPolicy::default(),
                |_stream, peer| {
                    let _ = tx.send(peer);
                },
            )
            .await
        });

        // Act: one client connects
        let client = TcpStream::connect(addr).await.unwrap();
        let seen = rx.recv().await.unwrap();

        // Assert: the accepted peer is our client
        assert_eq!(seen, client.local_addr().unwrap());

        // Act: request shutdown
        running.store(false, Ordering::Relaxed);
        let result = timeout(Duration::from_secs(2), accept).await.unwrap().unwrap();

        // Assert
        assert!(result.is_ok());
    }
}
