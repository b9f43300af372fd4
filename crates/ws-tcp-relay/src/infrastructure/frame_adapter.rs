//! Byte-stream view of a WebSocket connection.
//!
//! [`WsByteStream`] implements `AsyncRead + AsyncWrite` over a
//! `WebSocketStream`, so the pump can treat a WebSocket exactly like a TCP
//! socket.
//!
//! - **Reading**: the payload of every text or binary frame is surfaced as
//!   plain bytes, in order.  Frame boundaries are not preserved.  Ping/pong
//!   frames are skipped (tungstenite answers pings itself).  A close frame or
//!   the end of the stream reads as EOF.
//! - **Writing**: each `write` becomes one frame, encoded according to
//!   [`FrameMode`].  Text frames carry the bytes untouched; the relay does not
//!   re-encode payloads.  In text mode a multi-byte UTF-8 character split
//!   across two writes is held back and sent with the next write, so every
//!   text frame of UTF-8 input is itself valid UTF-8.  Payloads that are not
//!   UTF-8 at all need binary mode; receivers reject them as text.
//! - **Shutdown**: sends any held-back bytes, then a close frame.  Shutting
//!   down an already closed connection succeeds.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::domain::FrameMode;

/// Wraps `payload` in a single final frame of the configured type.
pub fn encapsulate(mode: FrameMode, payload: Vec<u8>) -> Message {
    match mode {
        FrameMode::Binary => Message::Binary(payload),
        // Built as a raw frame so arbitrary bytes pass through unchanged.
        FrameMode::Text => Message::Frame(Frame::message(payload, OpCode::Data(Data::Text), true)),
    }
}

/// Length of the prefix of `data` that can go out as a text frame.
///
/// Only an incomplete character at the very end is held back (at most three
/// bytes).  Invalid sequences elsewhere are not ours to fix and are sent as is.
fn text_boundary(data: &[u8]) -> usize {
    match std::str::from_utf8(data) {
        Ok(_) => data.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => data.len(),
    }
}

fn into_io_error(err: WsError) -> io::Error {
    match err {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::NotConnected, err)
        }
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

/// `AsyncRead + AsyncWrite` adapter over a WebSocket.
pub struct WsByteStream<S> {
    inner: WebSocketStream<S>,
    mode: FrameMode,
    /// Payload of the last frame not yet handed to a reader.
    pending: Vec<u8>,
    pos: usize,
    eof: bool,
    /// Text mode: leading bytes of a character whose tail has not been
    /// written yet.
    partial: Vec<u8>,
}

impl<S> WsByteStream<S> {
    /// Wraps an established WebSocket.  `mode` selects the outgoing frame type.
    pub fn new(inner: WebSocketStream<S>, mode: FrameMode) -> Self {
        Self {
            inner,
            mode,
            pending: Vec::new(),
            pos: 0,
            eof: false,
            partial: Vec::new(),
        }
    }
}

impl<S> AsyncRead for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        loop {
            if this.pos < this.pending.len() {
                let n = (this.pending.len() - this.pos).min(buf.remaining());
                buf.put_slice(&this.pending[this.pos..this.pos + n]);
                this.pos += n;
                if this.pos == this.pending.len() {
                    this.pending.clear();
                    this.pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if this.eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => this.pending = data,
                Some(Ok(Message::Text(text))) => this.pending = text.into_bytes(),
                Some(Ok(Message::Close(_))) | None => this.eof = true,
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => this.eof = true,
                Some(Err(e)) => return Poll::Ready(Err(into_io_error(e))),
            }
            // Empty frames leave `pending` empty; keep polling rather than
            // reporting a zero-length read, which would mean EOF.
        }
    }
}

impl<S> AsyncWrite for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = &mut *self;
        ready!(Pin::new(&mut this.inner).poll_ready(cx)).map_err(into_io_error)?;

        let payload = match this.mode {
            FrameMode::Binary => buf.to_vec(),
            FrameMode::Text => {
                let mut data = std::mem::take(&mut this.partial);
                data.extend_from_slice(buf);
                let boundary = text_boundary(&data);
                this.partial = data.split_off(boundary);
                if data.is_empty() {
                    // Nothing complete yet; the bytes are held, not lost.
                    return Poll::Ready(Ok(buf.len()));
                }
                data
            }
        };

        Pin::new(&mut this.inner)
            .start_send(encapsulate(this.mode, payload))
            .map_err(into_io_error)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(into_io_error)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if !this.partial.is_empty() {
            // A truncated character: the stream ended mid-sequence.
            match ready!(Pin::new(&mut this.inner).poll_ready(cx)) {
                Ok(()) => {
                    let rest = std::mem::take(&mut this.partial);
                    let sent = Pin::new(&mut this.inner).start_send(encapsulate(this.mode, rest));
                    if let Err(e) = sent {
                        return Poll::Ready(closed_is_ok(e));
                    }
                }
                Err(e) => {
                    this.partial.clear();
                    return Poll::Ready(closed_is_ok(e));
                }
            }
        }

        match ready!(Pin::new(&mut this.inner).poll_close(cx)) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(closed_is_ok(e)),
        }
    }
}

/// Shutdown of a connection that is already closed is not an error.
fn closed_is_ok(err: WsError) -> io::Result<()> {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Ok(()),
        other => Err(into_io_error(other)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// Returns (relay-side adapter, remote WebSocket) over an in-memory pipe.
    async fn ws_pair(
        mode: FrameMode,
    ) -> (WsByteStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (local, remote) = duplex(4096);
        let local = WebSocketStream::from_raw_socket(local, Role::Server, None).await;
        let remote = WebSocketStream::from_raw_socket(remote, Role::Client, None).await;
        (WsByteStream::new(local, mode), remote)
    }

    #[test]
    fn test_encapsulate_binary() {
        let msg = encapsulate(FrameMode::Binary, vec![0xDE, 0xAD]);
        assert_eq!(msg, Message::Binary(vec![0xDE, 0xAD]));
    }

    #[test]
    fn test_encapsulate_text_uses_text_opcode() {
        let msg = encapsulate(FrameMode::Text, b"hi".to_vec());
        match msg {
            Message::Frame(frame) => {
                assert_eq!(frame.header().opcode, OpCode::Data(Data::Text));
                assert!(frame.header().is_final);
                assert_eq!(frame.payload(), b"hi");
            }
            other => panic!("expected a raw text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_binary_mode_writes_binary_frames() {
        // Arrange
        let (mut adapter, mut remote) = ws_pair(FrameMode::Binary).await;

        // Act
        adapter.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();
        adapter.flush().await.unwrap();

        // Assert
        let msg = remote.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[tokio::test]
    async fn test_text_mode_writes_text_frames() {
        let (mut adapter, mut remote) = ws_pair(FrameMode::Text).await;

        adapter.write_all(b"ping").await.unwrap();
        adapter.flush().await.unwrap();

        let msg = remote.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::Text("ping".to_string()));
    }

    #[test]
    fn test_text_boundary_holds_back_only_a_truncated_tail() {
        assert_eq!(text_boundary(b"abc"), 3);
        assert_eq!(text_boundary(&[b'a', 0xC3]), 1);
        assert_eq!(text_boundary(&[0xE2, 0x82]), 0);
        assert_eq!(text_boundary(&[0xFF, b'a']), 2);
    }

    #[tokio::test]
    async fn test_text_mode_character_split_across_writes_reads_back_whole() {
        // Arrange: two adapters in text mode, as in a reverse -> forward chain
        let (local, remote) = duplex(4096);
        let local = WebSocketStream::from_raw_socket(local, Role::Client, None).await;
        let remote = WebSocketStream::from_raw_socket(remote, Role::Server, None).await;
        let mut writer = WsByteStream::new(local, FrameMode::Text);
        let mut reader = WsByteStream::new(remote, FrameMode::Text);

        // Act: "é" (C3 A9) arrives in two separate writes
        writer.write_all(&[0xC3]).await.unwrap();
        writer.flush().await.unwrap();
        writer.write_all(&[0xA9]).await.unwrap();
        writer.flush().await.unwrap();

        let mut received = [0u8; 2];
        reader.read_exact(&mut received).await.unwrap();

        // Assert
        assert_eq!(std::str::from_utf8(&received).unwrap(), "é");
    }

    #[tokio::test]
    async fn test_text_mode_sends_complete_prefix_and_holds_partial_character() {
        let (mut adapter, mut remote) = ws_pair(FrameMode::Text).await;

        adapter.write_all(&[b'h', b'i', 0xE2, 0x82]).await.unwrap();
        adapter.write_all(&[0xAC]).await.unwrap();
        adapter.flush().await.unwrap();

        let first = remote.next().await.unwrap().unwrap();
        let second = remote.next().await.unwrap().unwrap();
        assert_eq!(first, Message::Text("hi".to_string()));
        assert_eq!(second, Message::Text("€".to_string()));
    }

    #[tokio::test]
    async fn test_reads_text_and_binary_payloads_in_order() {
        // Arrange: the remote mixes frame types regardless of our mode
        let (mut adapter, mut remote) = ws_pair(FrameMode::Text).await;
        remote.send(Message::Text("abc".into())).await.unwrap();
        remote.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        remote.send(Message::Close(None)).await.unwrap();

        // Act
        let mut received = Vec::new();
        adapter.read_to_end(&mut received).await.unwrap();

        // Assert
        assert_eq!(received, [b'a', b'b', b'c', 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_ping_and_empty_frames_are_not_eof() {
        let (mut adapter, mut remote) = ws_pair(FrameMode::Binary).await;
        remote.send(Message::Ping(vec![9])).await.unwrap();
        remote.send(Message::Binary(Vec::new())).await.unwrap();
        remote.send(Message::Binary(vec![7])).await.unwrap();

        let mut buf = [0u8; 4];
        let n = adapter.read(&mut buf).await.unwrap();

        assert_eq!(n, 1);
        assert_eq!(buf[0], 7);
    }

    #[tokio::test]
    async fn test_large_frame_is_read_across_small_buffers() {
        let (mut adapter, mut remote) = ws_pair(FrameMode::Binary).await;
        remote.send(Message::Binary(vec![5u8; 10])).await.unwrap();

        let mut first = [0u8; 4];
        let mut rest = [0u8; 6];
        adapter.read_exact(&mut first).await.unwrap();
        adapter.read_exact(&mut rest).await.unwrap();

        assert_eq!(first, [5u8; 4]);
        assert_eq!(rest, [5u8; 6]);
    }

    #[tokio::test]
    async fn test_remote_drop_reads_as_eof() {
        let (mut adapter, remote) = ws_pair(FrameMode::Binary).await;
        drop(remote);

        let mut buf = [0u8; 4];
        let n = adapter.read(&mut buf).await.unwrap_or(0);

        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_frame_and_is_repeatable() {
        // Arrange
        let (mut adapter, mut remote) = ws_pair(FrameMode::Binary).await;

        // Act
        adapter.shutdown().await.unwrap();
        adapter.shutdown().await.unwrap();

        // Assert
        let msg = remote.next().await.unwrap().unwrap();
        assert!(matches!(msg, Message::Close(_)));
    }
}
