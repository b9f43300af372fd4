//! Accepted client socket, plain or TLS.
//!
//! The forward listener optionally terminates TLS before the WebSocket
//! upgrade.  [`ClientStream`] gives both cases one concrete type so the
//! WebSocket and pump code is not duplicated.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A client connection accepted by the forward listener.
pub enum ClientStream {
    /// Plain TCP.
    Plain(TcpStream),
    /// TLS-terminated TCP (boxed; the TLS state is large).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ClientStream {
    /// Returns `true` for TLS-terminated connections.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, ClientStream::Tls(_))
    }
}

impl AsyncRead for ClientStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ClientStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ClientStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_plain_stream_passes_bytes_through() {
        // Arrange: a loopback TCP pair
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let mut server = ClientStream::Plain(accepted.unwrap().0);
        let mut client = connected.unwrap();

        // Act
        client.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();

        // Assert
        assert_eq!(&buf, b"abc");
        assert!(!server.is_encrypted());
    }

    #[tokio::test]
    async fn test_tls_stream_decrypts_client_bytes() {
        use crate::domain::{ServerTlsConfig, TrustPolicy};
        use crate::infrastructure::tls::{client_config, server_acceptor};
        use rustls::pki_types::ServerName;
        use tokio_rustls::TlsConnector;

        // Arrange: loopback TCP with the fixture certificate on the server side
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let acceptor = server_acceptor(&ServerTlsConfig {
            cert_path: dir.join("localhost.crt"),
            key_path: dir.join("localhost.key"),
        })
        .unwrap();
        let connector = TlsConnector::from(client_config(TrustPolicy::AcceptAny).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, connected) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let name = ServerName::try_from("localhost").unwrap();
        let (server_tls, client_tls) = tokio::join!(
            acceptor.accept(accepted.unwrap().0),
            connector.connect(name, connected.unwrap())
        );
        let mut server = ClientStream::Tls(Box::new(server_tls.unwrap()));
        let mut client = client_tls.unwrap();

        // Act
        client.write_all(b"secret").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();

        // Assert
        assert_eq!(&buf, b"secret");
        assert!(server.is_encrypted());
    }
}
