//! ws-tcp-relay library crate.
//!
//! Relays byte streams between WebSocket connections and raw TCP
//! connections, in either direction.
//!
//! # Architecture
//!
//! ```text
//! forward:  WebSocket client ──► [listener] ──► TCP target
//! reverse:  TCP client       ──► [listener] ──► WebSocket target
//!
//! [ws-tcp-relay]
//!   ├── domain/           RelayConfig, SessionInfo / SessionState
//!   ├── application/      Pump, subprotocol negotiation, session flow, RelayError
//!   └── infrastructure/
//!         ├── listener      shared accept loop
//!         ├── ws_server     forward listener (TLS + WebSocket upgrade)
//!         ├── tcp_server    reverse listener
//!         ├── dialer        TcpDialer / WsDialer
//!         ├── frame_adapter WebSocket as AsyncRead + AsyncWrite
//!         └── tls           rustls acceptor and connector config
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` is generic over `AsyncRead + AsyncWrite` and never opens
//!   sockets.
//! - `infrastructure` depends on both and on tokio, tungstenite and rustls.

/// Domain layer: configuration and session model.
pub mod domain;

/// Application layer: pump, negotiation, session orchestration.
pub mod application;

/// Infrastructure layer: listeners, dialers, WebSocket framing, TLS.
pub mod infrastructure;
