//! Contracts consumed from the parent subchannel (spec §1, §6).
//!
//! The subchannel itself — its address list, identifier, and
//! connectivity-state publication sink — is an external collaborator and
//! out of scope for this crate (spec §1). This module only defines the
//! boundary the transport calls across.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::TransportError;

/// One candidate endpoint for a subchannel. Wraps a plain socket address;
/// kept as a named type so a future revision can attach weight or metadata
/// without breaking `SubchannelHandle::addresses`' signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    pub endpoint: SocketAddr,
}

impl Address {
    pub const fn new(endpoint: SocketAddr) -> Self {
        Self { endpoint }
    }
}

impl From<SocketAddr> for Address {
    fn from(endpoint: SocketAddr) -> Self {
        Self { endpoint }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.endpoint, f)
    }
}

/// Connectivity state, per the glossary: one of
/// `{Idle, Connecting, Ready, TransientFailure, Shutdown}`. The transport
/// drives the first four; `Shutdown` is reserved for the subchannel's own
/// terminal bookkeeping and is never published by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

/// Status carried alongside a `TransientFailure`/`Idle` transition.
/// The spec only ever needs `Unavailable`; kept as an enum so a host
/// stack can extend it without touching the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Unavailable,
}

/// A single connectivity-state transition, published in order by the
/// transport. `reason` is a short human-readable string ("Disconnected",
/// "Lost connection to socket"); `cause` carries the underlying error
/// when one exists.
#[derive(Clone, Debug)]
pub struct StateTransition {
    pub state: ConnectivityState,
    pub status: Option<Status>,
    pub reason: &'static str,
    pub cause: Option<Arc<TransportError>>,
}

impl StateTransition {
    pub fn new(state: ConnectivityState, reason: &'static str) -> Self {
        Self {
            state,
            status: None,
            reason,
            cause: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: Arc<TransportError>) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// The transport's view of its parent subchannel.
///
/// # Contract
/// - `addresses` returns a snapshot; the transport pins it for the
///   duration of one `TryConnect` attempt (spec §4.1 step 1).
/// - `update_connectivity_state` **must not block** and **must not call
///   back into the [`crate::transport::SubchannelTransport`] that invoked
///   it** — the transport may call it while holding its own internal
///   lock, to guarantee that a `Ready` transition and the observability
///   of the parked socket are a single atomic step (spec §9 design
///   notes, "Shared lock with parent").
/// - `id` is opaque and used only for log correlation.
pub trait SubchannelHandle: Send + Sync {
    fn id(&self) -> &str;
    fn addresses(&self) -> Vec<Address>;
    fn update_connectivity_state(&self, transition: StateTransition);
}
