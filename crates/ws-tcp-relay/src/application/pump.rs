//! Bidirectional pump: two copy workers plus coordinated teardown.
//!
//! ```text
//!        ┌──────── worker a→b ────────┐
//!   A ───┤                            ├─── B
//!        └──────── worker b→a ────────┘
//! ```
//!
//! Each connection is split into a read half and a write half.  Worker a→b
//! owns A's read half and B's write half; worker b→a owns the other two.
//! Each worker runs in its own Tokio task and its `JoinHandle` is the one-shot
//! completion signal, so a worker that panics still completes its handle.
//!
//! The pump is the only component that closes connections:
//!
//! 1. Wait for whichever worker finishes first (EOF, I/O error or panic).
//! 2. Enter `Closing`: broadcast the close signal, which makes the other
//!    worker abandon its pending read/write immediately.
//! 3. Shut down both destinations concurrently, the second as soon as its
//!    worker has returned, then enter `Closed`.  A destination that is slow
//!    to close never delays the other one.
//!
//! When `run` returns, every half has been dropped and no worker is running.

use std::io;
use std::time::Duration;

use futures_util::future::{self, Either};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Upper bound on flushing a close to one destination during teardown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Teardown state of a pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Both workers are copying.
    Relaying,
    /// The first worker has finished; connections are being closed.
    Closing,
    /// Both workers have finished and both connections are closed.
    Closed,
}

/// Why a copy worker stopped.
#[derive(Debug)]
pub enum CopyEnd {
    /// The source reported end-of-stream after `bytes` were relayed.
    Eof { bytes: u64 },
    /// A read or write failed.
    Failed(io::Error),
    /// The pump asked the worker to stop.
    Closed,
}

/// A finished worker hands its halves back so the pump can close them.
#[derive(Debug)]
pub struct CopyWorkerExit<R, W> {
    pub reader: R,
    pub writer: W,
    pub end: CopyEnd,
}

/// Drains `reader` into `writer` until end-of-stream, an I/O error, or the
/// close signal.
///
/// The worker never closes either half itself.
pub async fn copy_worker<R, W>(
    mut reader: R,
    mut writer: W,
    mut close: watch::Receiver<bool>,
) -> CopyWorkerExit<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let end = tokio::select! {
        res = tokio::io::copy(&mut reader, &mut writer) => match res {
            Ok(bytes) => CopyEnd::Eof { bytes },
            Err(e) => CopyEnd::Failed(e),
        },
        _ = close.wait_for(|closed| *closed) => CopyEnd::Closed,
    };

    CopyWorkerExit {
        reader,
        writer,
        end,
    }
}

/// Couples two duplex connections until either side stops.
pub struct Pump {
    label: String,
    state: PumpState,
    close_tx: watch::Sender<bool>,
}

impl Pump {
    /// Creates a pump; `label` prefixes its log lines.
    pub fn new(label: impl Into<String>) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            label: label.into(),
            state: PumpState::Relaying,
            close_tx,
        }
    }

    /// Relays `a` ⇄ `b` and returns once both workers have finished and both
    /// connections are closed.
    pub async fn run<A, B>(mut self, a: A, b: B) -> PumpState
    where
        A: AsyncRead + AsyncWrite + Send + 'static,
        B: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);

        let a_to_b = tokio::spawn(copy_worker(a_read, b_write, self.close_tx.subscribe()));
        let b_to_a = tokio::spawn(copy_worker(b_read, a_write, self.close_tx.subscribe()));

        match future::select(a_to_b, b_to_a).await {
            Either::Left((first, second)) => {
                self.begin_close();
                tokio::join!(self.finish_worker("a->b", first), async {
                    self.finish_worker("b->a", second.await).await
                });
            }
            Either::Right((first, second)) => {
                self.begin_close();
                tokio::join!(self.finish_worker("b->a", first), async {
                    self.finish_worker("a->b", second.await).await
                });
            }
        }

        self.state = PumpState::Closed;
        debug!("{}: pump closed", self.label);
        self.state
    }

    /// Relaying → Closing.  Calling it again is a no-op.
    fn begin_close(&mut self) {
        if self.state == PumpState::Relaying {
            self.state = PumpState::Closing;
            self.close_tx.send_replace(true);
        }
    }

    /// Logs a worker's exit and closes the connection it was writing to.
    async fn finish_worker<R, W>(
        &self,
        direction: &str,
        joined: Result<CopyWorkerExit<R, W>, JoinError>,
    ) where
        W: AsyncWrite + Unpin,
    {
        let mut exit = match joined {
            Ok(exit) => exit,
            Err(e) => {
                // The worker's halves were dropped while unwinding.
                warn!("{}: {direction} worker aborted: {e}", self.label);
                return;
            }
        };

        match &exit.end {
            CopyEnd::Eof { bytes } => {
                debug!("{}: {direction} reached EOF after {bytes} bytes", self.label)
            }
            CopyEnd::Failed(e) => debug!("{}: {direction} stopped: {e}", self.label),
            CopyEnd::Closed => debug!("{}: {direction} stopped by pump", self.label),
        }

        // Shutdown errors are expected here (the peer may already be gone).
        match tokio::time::timeout(SHUTDOWN_GRACE, exit.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{}: {direction} shutdown: {e}", self.label),
            Err(_) => debug!("{}: {direction} shutdown timed out", self.label),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
