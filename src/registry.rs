//! Active-stream registry (spec §4.4): tracks outstanding streams handed
//! out by `GetStream` and reports when the last one closes, so the
//! transport façade knows when to trigger `Disconnect`.

use crate::subchannel::Address;

struct Entry {
    address: Address,
    stream_id: u64,
}

/// Tracks `(address, streamHandle)` pairs. Streams are identified by an
/// integer id assigned at creation (spec §9 open question: "stream-dispose
/// identity"), not by reference equality.
#[derive(Default)]
pub struct ActiveStreamRegistry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl ActiveStreamRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocates a fresh, process-unique stream id.
    pub fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, address: Address, stream_id: u64) {
        self.entries.push(Entry { address, stream_id });
    }

    /// Removes the entry matching `stream_id`. Scans from the tail, since
    /// streams tend to close in roughly the reverse order they were
    /// opened (the common LIFO case per spec §4.4 step 1). Returns true if
    /// an entry was removed, and whether the registry is now empty.
    pub fn remove(&mut self, stream_id: u64) -> Option<bool> {
        let pos = self.entries.iter().rposition(|e| e.stream_id == stream_id)?;
        self.entries.remove(pos);
        Some(self.entries.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
