//! Connectivity-state TCP transport for a single subchannel of a
//! client-side load-balanced RPC stack.
//!
//! This crate owns the raw socket for one backend endpoint: it connects
//! across a ranked address list with failover, probes an idle connection
//! without disturbing bytes the peer may have pre-sent, hands the socket
//! off to an upper protocol layer exactly once, and publishes the
//! connectivity-state transitions a load balancer's policy depends on.
//!
//! The RPC codec, the load-balancing policy itself, and the address list
//! behind a subchannel are external collaborators — see
//! [`subchannel::SubchannelHandle`] for the boundary this crate calls
//! across. The four operations a load balancer drives are exposed on
//! [`transport::SubchannelTransport`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use subchannel_transport::{
//!     Address, ConnectivityState, StateTransition, SubchannelHandle,
//!     SubchannelTransport, TransportConfig,
//! };
//!
//! struct Handle {
//!     addresses: Vec<Address>,
//! }
//!
//! impl SubchannelHandle for Handle {
//!     fn id(&self) -> &str { "example" }
//!     fn addresses(&self) -> Vec<Address> { self.addresses.clone() }
//!     fn update_connectivity_state(&self, transition: StateTransition) {
//!         let _ = transition.state == ConnectivityState::Ready;
//!     }
//! }
//!
//! # async fn run(addresses: Vec<Address>) {
//! let handle = Arc::new(Handle { addresses });
//! let transport = SubchannelTransport::new(handle, TransportConfig::default());
//! let _ = transport.try_connect(Default::default()).await;
//! # }
//! ```

mod buffer;
mod config;
mod connector;
mod error;
mod prober;
mod registry;
mod stream;
mod subchannel;
mod transport;

pub use config::TransportConfig;
pub use connector::{Connect, ConnectAttempt, TokioConnector};
pub use error::TransportError;
pub use stream::SubchannelStream;
pub use subchannel::{Address, ConnectivityState, StateTransition, Status, SubchannelHandle};
pub use transport::{ConnectOutcome, SubchannelTransport};

pub use tokio_util::sync::CancellationToken;
