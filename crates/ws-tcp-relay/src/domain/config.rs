//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup (from CLI arguments in `main.rs`, or from
//! [`RelayConfig::default`] in tests) and never mutated afterwards.  The
//! listeners wrap it in an `Arc` and hand a clone of that `Arc` to every
//! session task.
//!
//! No environment variables or files are read here; the infrastructure layer
//! is responsible for turning paths into certificates and keys.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Which side of the relay accepts clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Listen for WebSocket clients, dial the raw TCP target.
    #[default]
    Forward,
    /// Listen for raw TCP clients, dial the WebSocket target.
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Reverse => f.write_str("reverse"),
        }
    }
}

/// Frame type used for data the relay *sends* on the WebSocket side.
///
/// Incoming frames are accepted in either encoding regardless of this
/// setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// Text frames (opcode 0x1).
    #[default]
    Text,
    /// Binary frames (opcode 0x2).
    Binary,
}

impl fmt::Display for FrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameMode::Text => f.write_str("text"),
            FrameMode::Binary => f.write_str("binary"),
        }
    }
}

/// Certificate material for terminating TLS on the WebSocket listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTlsConfig {
    /// PEM file holding the certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PEM file holding the private key (PKCS#8, PKCS#1 or SEC1).
    pub key_path: PathBuf,
}

/// How the reverse-mode dialer treats the certificate presented by a `wss://`
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Accept any certificate without chain validation.
    ///
    /// This is the documented default so the relay can reach endpoints using
    /// self-signed certificates.
    #[default]
    AcceptAny,
    /// Validate the certificate chain against the bundled Mozilla roots.
    WebPkiRoots,
}

/// What the accept loop does when a single `accept()` call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptErrorPolicy {
    /// Number of *consecutive* accept failures after which the listener gives
    /// up.  `None` means accept errors are never fatal.
    pub max_consecutive: Option<u32>,
}

impl AcceptErrorPolicy {
    /// Returns `true` once `consecutive` failures reach the configured limit.
    pub fn is_fatal(&self, consecutive: u32) -> bool {
        matches!(self.max_consecutive, Some(max) if consecutive >= max)
    }
}

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use ws_tcp_relay::domain::{Direction, RelayConfig};
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 4223);
/// assert_eq!(cfg.direction, Direction::Forward);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,

    /// The fixed `host:port` every session is relayed to.
    ///
    /// Kept as a string so host names are resolved per dial.
    pub target: String,

    /// Which transport is accepted and which is dialed.
    pub direction: Direction,

    /// Outgoing WebSocket frame encoding.
    pub frame_mode: FrameMode,

    /// TLS termination for the forward-mode WebSocket listener.
    pub server_tls: Option<ServerTlsConfig>,

    /// Dial the reverse-mode target as `wss://` instead of `ws://`.
    pub client_tls: bool,

    /// Certificate trust for `wss://` dials.
    pub trust: TrustPolicy,

    /// Subprotocol label the relay expects (forward) or offers (reverse).
    ///
    /// `None` disables the check in forward mode and omits the header in
    /// reverse mode.
    pub subprotocol: Option<String>,

    /// Accept-loop failure handling.
    pub accept_errors: AcceptErrorPolicy,
}

impl RelayConfig {
    /// Normalises a raw subprotocol option: blank strings mean "none".
    pub fn normalize_subprotocol(raw: Option<String>) -> Option<String> {
        raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
    }
}

impl Default for RelayConfig {
    /// | Field         | Default            |
    /// |---------------|--------------------|
    /// | listen_addr   | `0.0.0.0:4223`     |
    /// | target        | `127.0.0.1:9000`   |
    /// | direction     | forward            |
    /// | frame_mode    | text               |
    /// | server_tls    | none               |
    /// | client_tls    | false              |
    /// | trust         | accept any         |
    /// | subprotocol   | none               |
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4223)),
            target: "127.0.0.1:9000".to_string(),
            direction: Direction::default(),
            frame_mode: FrameMode::default(),
            server_tls: None,
            client_tls: false,
            trust: TrustPolicy::default(),
            subprotocol: None,
            accept_errors: AcceptErrorPolicy::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
