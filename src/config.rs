//! Transport configuration (spec §3 "Configuration (enumerated)").
//!
//! Mirrors the teacher's own `#[derive(Serialize, Deserialize)]` +
//! `Default` convention for connector configuration
//! (`linkerd-tcp`'s `src/connector.rs::ConnectorConfig`). This crate does
//! not parse YAML/JSON itself — configuration parsing is an out-of-scope
//! external collaborator (spec §1) — the struct is just shaped so a host
//! can deserialize it directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default interval between health probes of a parked socket.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on bytes captured from a parked socket before attachment.
pub const DEFAULT_MAX_INITIAL_SOCKET_BYTES: usize = 16_384;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct TransportConfig {
    /// Optional deadline enveloping a single `TryConnect` call as a whole.
    /// `None` means unbounded.
    #[serde(default)]
    pub connect_timeout: Option<Duration>,

    /// Time between health probes on a parked socket.
    #[serde(default = "default_probe_interval")]
    pub probe_interval: Duration,

    /// Bound on the total bytes the health prober will buffer from a
    /// parked socket before the connection is treated as unusable.
    #[serde(default = "default_max_initial_socket_bytes")]
    pub max_initial_socket_bytes: usize,
}

fn default_probe_interval() -> Duration {
    DEFAULT_PROBE_INTERVAL
}

fn default_max_initial_socket_bytes() -> usize {
    DEFAULT_MAX_INITIAL_SOCKET_BYTES
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            max_initial_socket_bytes: DEFAULT_MAX_INITIAL_SOCKET_BYTES,
        }
    }
}
