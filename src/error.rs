//! Error kinds for the subchannel transport (spec §7).
//!
//! Per-address connect failures and probe failures are not bubbled up to
//! callers as `Result` errors — they are absorbed into the connectivity
//! state machine and published through [`crate::subchannel::SubchannelHandle`].
//! `TransportError` exists for the handful of places that *do* need a
//! structured, caller-visible error: the cause attached to a
//! `TransientFailure`/`Idle(Unavailable)` transition, and the error
//! returned by `GetStream`'s fresh-connect path.

use std::io;

/// Structured transport error, carrying enough detail to explain a
/// connectivity-state transition or a `GetStream` failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A single address's connect attempt failed. Recorded as the `first
    /// error` of a `TryConnect` loop; surfaced only if every address fails.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailure { addr: String, #[source] source: io::Error },

    /// Every candidate address failed during `TryConnect`.
    #[error("all addresses failed; first error: {0}")]
    AllAddressesFailed(#[source] Box<TransportError>),

    /// `TryConnect`'s configured `connect_timeout` elapsed before any
    /// address succeeded.
    #[error("connect timed out; first error: {0}")]
    ConnectTimeout(#[source] Box<TransportError>),

    /// The health prober detected that the parked socket is no longer
    /// usable (peer closed, read error, or the initial-data buffer bound
    /// was exceeded).
    #[error("lost connection to socket: {0}")]
    ProbeFailure(#[source] Box<TransportError>),

    /// The peer sent more bytes before attachment than
    /// `max_initial_socket_bytes` allows.
    #[error("server sent {sent} bytes before connection was established; maximum {max} exceeded")]
    InitialBufferExceeded { sent: usize, max: usize },

    /// A bare I/O failure with no more specific classification.
    #[error(transparent)]
    Io(#[from] io::Error),
}
