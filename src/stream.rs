//! The byte-stream handle returned by `GetStream` (spec §4.1 step 4-5,
//! §9 design note "Stream wrapper prefix-buffer").
//!
//! Not a generic concatenation stream: it replays exactly the ordered
//! chunks captured by the health prober, then delegates to the live
//! socket, then releases the socket on dispose. Writes never touch the
//! prefix buffer.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Invoked exactly once when a [`SubchannelStream`] is dropped, so the
/// active-stream registry (spec §4.4) can remove the matching entry and
/// trigger `Disconnect` if it was the last one.
pub(crate) type DisposeHook = Arc<dyn Fn(u64) + Send + Sync>;

/// A readable/writable byte stream over one TCP socket, with any bytes the
/// peer sent before attachment replayed ahead of live socket reads.
pub struct SubchannelStream {
    id: u64,
    prefix: VecDeque<Bytes>,
    socket: TcpStream,
    on_dispose: Option<DisposeHook>,
    disposed: bool,
}

impl SubchannelStream {
    pub(crate) fn new(
        id: u64,
        prefix_chunks: Vec<Bytes>,
        socket: TcpStream,
        on_dispose: DisposeHook,
    ) -> Self {
        Self {
            id,
            prefix: prefix_chunks.into_iter().filter(|b| !b.is_empty()).collect(),
            socket,
            on_dispose: Some(on_dispose),
            disposed: false,
        }
    }

    /// Unique identity assigned at creation time (spec §9 open question:
    /// "stream-dispose identity" — matched by an integer id rather than
    /// reference equality).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Explicitly disposes the stream, running the same hook `Drop` would.
    /// Idempotent; safe to call even if the caller also lets the value
    /// drop normally afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(hook) = self.on_dispose.take() {
            hook(self.id);
        }
    }
}

impl Drop for SubchannelStream {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl AsyncRead for SubchannelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while let Some(front) = this.prefix.front_mut() {
            if front.is_empty() {
                this.prefix.pop_front();
                continue;
            }
            let take = front.len().min(buf.remaining());
            if take == 0 {
                // Caller's buffer is full; satisfied from the prefix alone.
                return Poll::Ready(Ok(()));
            }
            buf.put_slice(&front[..take]);
            front.advance(take);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.socket).poll_read(cx, buf)
    }
}

impl AsyncWrite for SubchannelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().socket).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_shutdown(cx)
    }
}
