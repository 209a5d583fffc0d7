//! Socket connector: creates a TCP socket (NoDelay) and performs a
//! cancellable connect to one endpoint (spec §4.1 "Socket connector").
//!
//! The connect function is injectable — "a configuration point, not
//! polymorphism over a connection abstraction" (spec §9) — its sole
//! purpose is test substitution, mirroring `linkerd-tcp`'s
//! `Connector`/`ConnectorFactory` split in `src/connector.rs`, generalized
//! from a config-driven TLS-capable connector to a trait object a test can
//! swap in directly.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use tokio::net::TcpStream;

/// Establishes a plain TCP connection to one address.
///
/// Implementations must not block the calling task; connect attempts are
/// raced against cancellation by the caller (see [`connect_attempt`]).
pub trait Connect: Send + Sync {
    fn connect<'a>(
        &'a self,
        addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send + 'a>>;
}

/// The default connector: a real `tokio::net::TcpStream::connect` with
/// `TCP_NODELAY` set before any application data crosses the wire.
#[derive(Clone, Copy, Default)]
pub struct TokioConnector;

impl Connect for TokioConnector {
    fn connect<'a>(
        &'a self,
        addr: SocketAddr,
    ) -> Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send + 'a>> {
        Box::pin(async move {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

/// Outcome of a single cancellable, optionally deadlined connect attempt.
pub enum ConnectAttempt {
    Connected(TcpStream),
    Failed(io::Error),
    Cancelled,
    /// The caller-supplied deadline elapsed before connect finished.
    /// Only ever produced when `connect_attempt` is called with a deadline
    /// (`TryConnect`'s address loop, spec §4.1 step 3/4); `GetStream` never
    /// passes one, so it never observes this variant.
    TimedOut,
}

/// Races one connect attempt against cancellation and an optional deadline.
/// Used by both `TryConnect`'s address loop (`deadline = Some(..)` when
/// `connectTimeout` is configured) and `GetStream`'s fresh-connect path
/// (`deadline = None` — spec §4.1 step 3: "not envelope-timed by
/// connectTimeout").
pub async fn connect_attempt(
    connector: &(dyn Connect),
    addr: SocketAddr,
    cancellation: &tokio_util::sync::CancellationToken,
    deadline: Option<tokio::time::Instant>,
) -> ConnectAttempt {
    match deadline {
        Some(deadline) => {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => ConnectAttempt::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ConnectAttempt::TimedOut,
                res = connector.connect(addr) => match res {
                    Ok(stream) => ConnectAttempt::Connected(stream),
                    Err(err) => ConnectAttempt::Failed(err),
                },
            }
        }
        None => {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => ConnectAttempt::Cancelled,
                res = connector.connect(addr) => match res {
                    Ok(stream) => ConnectAttempt::Connected(stream),
                    Err(err) => ConnectAttempt::Failed(err),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread")]
    async fn tokio_connector_sets_nodelay() {
        crate::test_support::init_logging();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector = TokioConnector;
        let stream = connector.connect(addr).await.unwrap();
        assert!(stream.nodelay().unwrap());
        let _ = accept.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_attempt_observes_prior_cancellation() {
        crate::test_support::init_logging();
        let connector: Arc<dyn Connect> = Arc::new(TokioConnector);
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        // Port 0 would hang resolving a real connect; cancellation must win
        // the race immediately regardless of the connector's behavior.
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        match connect_attempt(connector.as_ref(), addr, &token, None).await {
            ConnectAttempt::Cancelled => {}
            _ => panic!("expected cancellation to win the race"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_attempt_reports_elapsed_deadline() {
        crate::test_support::init_logging();
        let connector: Arc<dyn Connect> = Arc::new(TokioConnector);
        let token = tokio_util::sync::CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let deadline = tokio::time::Instant::now();
        match connect_attempt(connector.as_ref(), addr, &token, Some(deadline)).await {
            ConnectAttempt::TimedOut => {}
            _ => panic!("expected the already-elapsed deadline to win the race"),
        }
    }
}
