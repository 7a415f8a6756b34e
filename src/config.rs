//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with sensible defaults for every key.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::frame::DEFAULT_MAX_PAYLOAD;

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`]; tests construct
/// it directly and override what they need.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the listener to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Maximum payload length a frame header may declare.
    pub max_frame_payload: u64,

    /// Size of the per-connection read buffer. Inbound frames are decoded
    /// one per read, so a frame larger than this cannot be received.
    pub read_buffer_size: usize,

    /// Capacity of each connection's bounded outbound queue. A full queue
    /// marks the peer destroyed rather than stalling the broadcaster.
    pub outbound_queue_depth: usize,

    /// Deadline for a single socket write before the peer counts as dead.
    pub write_timeout: Duration,

    /// Interval between registry sweeps.
    pub sweep_interval: Duration,

    /// Capacity of the relay event bus.
    pub event_bus_capacity: usize,

    /// Whether a connection asserting an already-registered client id is
    /// closed. When false the connection stays open but unregistered.
    pub close_on_duplicate_id: bool,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()?;

        let max_frame_payload = parse_env("MAX_FRAME_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD);
        let read_buffer_size = parse_env("READ_BUFFER_BYTES", 64 * 1024);
        let outbound_queue_depth = parse_env("OUTBOUND_QUEUE_DEPTH", 64);
        let write_timeout = Duration::from_secs(parse_env("WRITE_TIMEOUT_SECS", 10));
        let sweep_interval = Duration::from_secs(parse_env("SWEEP_INTERVAL_SECS", 30));
        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 1024);
        let close_on_duplicate_id = parse_env_bool("CLOSE_ON_DUPLICATE_ID", true);

        Ok(Self {
            listen_addr,
            max_frame_payload,
            read_buffer_size,
            outbound_queue_depth,
            write_timeout,
            sweep_interval,
            event_bus_capacity,
            close_on_duplicate_id,
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            max_frame_payload: DEFAULT_MAX_PAYLOAD,
            read_buffer_size: 64 * 1024,
            outbound_queue_depth: 64,
            write_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30),
            event_bus_capacity: 1024,
            close_on_duplicate_id: true,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
