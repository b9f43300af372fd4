//! ws-tcp-relay: entry point.
//!
//! Bridges WebSocket connections and raw TCP connections.
//!
//! - **Forward** (default): listen for WebSocket clients, relay each to the
//!   TCP target.
//! - **Reverse** (`-r`): listen for TCP clients, relay each to the WebSocket
//!   target at `ws://TARGET` (or `wss://TARGET` with `--tls`).
//!
//! # Usage
//!
//! ```text
//! ws-tcp-relay [OPTIONS] <TARGET>
//!
//! Arguments:
//!   <TARGET>                 host:port to relay every session to
//!
//! Options:
//!   -p, --port <PORT>        Port to listen on [default: 4223]
//!       --bind <IP>          Address to bind [default: 0.0.0.0]
//!   -r, --reverse            Accept TCP, dial WebSocket
//!   -b, --binary             Send binary frames instead of text frames
//!       --tlscert <FILE>     TLS certificate (forward mode, wss://)
//!       --tlskey <FILE>      TLS private key (forward mode, wss://)
//!       --tls                Dial wss:// (reverse mode)
//!       --tls-verify         Verify the wss:// target's certificate
//!       --attach <LABEL>     Subprotocol to expect (forward) or offer (reverse)
//!       --max-accept-errors <N>  Stop after N consecutive accept failures [default: 0 = never]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                     | Flag          |
//! |------------------------------|---------------|
//! | `WS_TCP_RELAY_TARGET`        | `<TARGET>`    |
//! | `WS_TCP_RELAY_PORT`          | `--port`      |
//! | `WS_TCP_RELAY_BIND`          | `--bind`      |
//! | `WS_TCP_RELAY_SUBPROTOCOL`   | `--attach`    |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ws_tcp_relay::domain::{
    AcceptErrorPolicy, Direction, FrameMode, RelayConfig, ServerTlsConfig, TrustPolicy,
};
use ws_tcp_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relay WebSocket connections to TCP, or TCP connections to WebSocket.
#[derive(Debug, Parser)]
#[command(
    name = "ws-tcp-relay",
    about = "Relay byte streams between WebSocket and TCP connections",
    version
)]
struct Cli {
    /// Address every session is relayed to (`host:port`).
    #[arg(value_name = "TARGET", env = "WS_TCP_RELAY_TARGET")]
    target: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 4223, env = "WS_TCP_RELAY_PORT")]
    port: u16,

    /// IP address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0", env = "WS_TCP_RELAY_BIND")]
    bind: String,

    /// Reverse the relay: accept TCP clients and dial the WebSocket target.
    #[arg(short, long)]
    reverse: bool,

    /// Send binary frames instead of text frames.
    #[arg(short, long)]
    binary: bool,

    /// PEM certificate chain; with `--tlskey`, the listener serves `wss://`.
    #[arg(long, value_name = "FILE")]
    tlscert: Option<PathBuf>,

    /// PEM private key matching `--tlscert`.
    #[arg(long, value_name = "FILE")]
    tlskey: Option<PathBuf>,

    /// Dial the reverse-mode target over `wss://`.
    #[arg(long)]
    tls: bool,

    /// Verify the `wss://` target's certificate against the Mozilla root set.
    ///
    /// Without this flag any certificate is accepted, so self-signed
    /// endpoints work out of the box.
    #[arg(long)]
    tls_verify: bool,

    /// Subprotocol the client must offer (forward) or that is offered to the
    /// target (reverse).  Empty disables the check.
    #[arg(
        long,
        visible_alias = "subprotocol",
        value_name = "LABEL",
        default_value = "",
        env = "WS_TCP_RELAY_SUBPROTOCOL"
    )]
    attach: String,

    /// Give up after this many consecutive accept failures (0 = never).
    #[arg(long, default_value_t = 0)]
    max_accept_errors: u32,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the target is blank, `--bind` is not an IP
    /// address, or the TLS flags are inconsistent.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let target = self.target.trim().to_string();
        if target.is_empty() {
            bail!("no target address specified");
        }

        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;
        let listen_addr = SocketAddr::new(ip, self.port);

        let direction = if self.reverse {
            Direction::Reverse
        } else {
            Direction::Forward
        };

        let server_tls = match (self.tlscert, self.tlskey) {
            (Some(cert_path), Some(key_path)) => Some(ServerTlsConfig {
                cert_path,
                key_path,
            }),
            (None, None) => None,
            _ => bail!("--tlscert and --tlskey must be given together"),
        };
        if server_tls.is_some() && direction == Direction::Reverse {
            bail!("--tlscert/--tlskey apply to forward mode only; use --tls in reverse mode");
        }

        Ok(RelayConfig {
            listen_addr,
            target,
            direction,
            frame_mode: if self.binary {
                FrameMode::Binary
            } else {
                FrameMode::Text
            },
            server_tls,
            client_tls: self.tls,
            trust: if self.tls_verify {
                TrustPolicy::WebPkiRoots
            } else {
                TrustPolicy::AcceptAny
            },
            subprotocol: RelayConfig::normalize_subprotocol(Some(self.attach)),
            accept_errors: AcceptErrorPolicy {
                max_consecutive: (self.max_accept_errors > 0).then_some(self.max_accept_errors),
            },
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls verbosity; `info` when unset or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Exits with usage text if TARGET is missing.
    let cli = Cli::parse();
    let config = cli.into_relay_config()?;

    info!(
        "ws-tcp-relay starting: {} mode, listen={}, target={}, frames={}",
        config.direction, config.listen_addr, config.target, config.frame_mode
    );

    // Cleared by Ctrl+C; the accept loop checks it every 200 ms.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("ws-tcp-relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ws-tcp-relay"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_missing_target_is_a_usage_error() {
        let result = Cli::try_parse_from(["ws-tcp-relay"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        // Arrange / Act
        let cli = parse(&["127.0.0.1:9000"]);

        // Assert
        assert_eq!(cli.port, 4223);
        assert_eq!(cli.bind, "0.0.0.0");
        assert!(!cli.reverse);
        assert!(!cli.binary);
        assert!(!cli.tls);
        assert_eq!(cli.attach, "");
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&["-p", "9001", "-r", "-b", "host:9000"]);
        assert_eq!(cli.port, 9001);
        assert!(cli.reverse);
        assert!(cli.binary);
        assert_eq!(cli.target, "host:9000");
    }

    #[test]
    fn test_subprotocol_alias() {
        let cli = parse(&["--subprotocol", "echo-v1", "host:9000"]);
        assert_eq!(cli.attach, "echo-v1");
    }

    #[test]
    fn test_into_relay_config_forward_binary() {
        // Arrange: port 9001 forwarding to 127.0.0.1:9000 in binary mode
        let cli = parse(&["-p", "9001", "-b", "127.0.0.1:9000"]);

        // Act
        let config = cli.into_relay_config().unwrap();

        // Assert
        assert_eq!(config.listen_addr.port(), 9001);
        assert_eq!(config.target, "127.0.0.1:9000");
        assert_eq!(config.direction, Direction::Forward);
        assert_eq!(config.frame_mode, FrameMode::Binary);
        assert!(config.subprotocol.is_none());
    }

    #[test]
    fn test_into_relay_config_reverse_tls() {
        let cli = parse(&["-r", "--tls", "--attach", "echo-v1", "host:9000"]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config.direction, Direction::Reverse);
        assert!(config.client_tls);
        assert_eq!(config.trust, TrustPolicy::AcceptAny);
        assert_eq!(config.subprotocol.as_deref(), Some("echo-v1"));
    }

    #[test]
    fn test_tls_verify_selects_webpki_roots() {
        let cli = parse(&["-r", "--tls", "--tls-verify", "host:9000"]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config.trust, TrustPolicy::WebPkiRoots);
    }

    #[test]
    fn test_server_tls_needs_both_files() {
        let cli = parse(&["--tlscert", "cert.pem", "host:9000"]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_server_tls_with_both_files() {
        let cli = parse(&["--tlscert", "cert.pem", "--tlskey", "key.pem", "host:9000"]);
        let config = cli.into_relay_config().unwrap();
        let tls = config.server_tls.unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("cert.pem"));
        assert_eq!(tls.key_path, PathBuf::from("key.pem"));
    }

    #[test]
    fn test_server_tls_rejected_in_reverse_mode() {
        let cli = parse(&["-r", "--tlscert", "c.pem", "--tlskey", "k.pem", "host:9000"]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_invalid_bind_address_returns_error() {
        let cli = parse(&["--bind", "not.an.ip", "host:9000"]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_blank_target_returns_error() {
        let cli = parse(&["  "]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_max_accept_errors_zero_means_never_fatal() {
        let config = parse(&["host:9000"]).into_relay_config().unwrap();
        assert_eq!(config.accept_errors.max_consecutive, None);

        let config = parse(&["--max-accept-errors", "5", "host:9000"])
            .into_relay_config()
            .unwrap();
        assert_eq!(config.accept_errors.max_consecutive, Some(5));
    }
}
