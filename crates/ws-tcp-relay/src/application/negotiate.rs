//! Subprotocol negotiation for forward-mode WebSocket clients.
//!
//! Only the first token of the client's `Sec-WebSocket-Protocol` offer is
//! considered.  There is no fallback to later tokens.

use super::error::RelayError;

/// Extracts the first comma-separated token from a `Sec-WebSocket-Protocol`
/// header value.  Blank offers yield `None`.
///
/// ```rust
/// use ws_tcp_relay::application::first_offered_subprotocol;
///
/// assert_eq!(first_offered_subprotocol("chat, superchat"), Some("chat"));
/// assert_eq!(first_offered_subprotocol("  "), None);
/// ```
pub fn first_offered_subprotocol(header_value: &str) -> Option<&str> {
    header_value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Checks a client's offer against the expected label.
///
/// Returns the subprotocol to echo back in the handshake response:
///
/// - no expectation: the offer (if any) is accepted as-is;
/// - with an expectation: the offer must be present and equal.
///
/// # Errors
///
/// [`RelayError::ProtocolMismatch`] when a label is expected and the offer is
/// missing or different.
pub fn negotiate_subprotocol(
    expected: Option<&str>,
    offered: Option<&str>,
) -> Result<Option<String>, RelayError> {
    match (expected, offered) {
        (None, offered) => Ok(offered.map(str::to_string)),
        (Some(expected), Some(offered)) if expected == offered => Ok(Some(offered.to_string())),
        (Some(expected), offered) => Err(RelayError::mismatch(expected, offered)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
