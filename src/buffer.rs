//! Bounded capture of bytes read from a parked socket before the upper
//! layer attaches (spec §3 `initialSocketData`, §4.2 health prober).

use bytes::Bytes;

/// An ordered sequence of byte chunks captured from a parked socket.
/// Total length is bounded by `max_bytes` (spec invariant 3:
/// `|initialSocketData| <= MaxInitialSocketBytes`).
#[derive(Debug, Default, Clone)]
pub struct InitialSocketData {
    chunks: Vec<Bytes>,
    len: usize,
}

impl InitialSocketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total buffered byte count across all chunks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a chunk, enforcing `max_bytes`. Returns the chunk's size
    /// that would push the buffer over the bound as `Err` without mutating
    /// the buffer, so the caller can raise `TransportError::InitialBufferExceeded`
    /// with accurate accounting.
    pub fn try_append(&mut self, chunk: Bytes, max_bytes: usize) -> Result<(), usize> {
        let new_total = self.len + chunk.len();
        if new_total > max_bytes {
            return Err(new_total);
        }
        self.len = new_total;
        self.chunks.push(chunk);
        Ok(())
    }

    /// Consumes the buffer, yielding the ordered chunks for replay ahead of
    /// live socket reads.
    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }
}
