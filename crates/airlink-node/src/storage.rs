//! Persistent peer identity.
//!
//! The pairing invariant leans on the commit boundary: after any finalize or
//! revert, the committed peer is either the mutually confirmed address or
//! all-zero — never a partial write.

use std::sync::Mutex;

use airlink_core::PeerAddr;

use crate::error::StorageError;

/// Store for the paired peer address. `stage` records a value, `commit`
/// makes it durable atomically.
pub trait PeerStore: Send + Sync {
    fn stage(&self, peer: PeerAddr) -> Result<(), StorageError>;
    fn commit(&self) -> Result<(), StorageError>;
    /// The last committed peer (all-zero when unpaired).
    fn peer(&self) -> PeerAddr;
}

/// In-memory store for tests and single-process deployments.
pub struct MemoryPeerStore {
    inner: Mutex<Slots>,
}

struct Slots {
    staged: PeerAddr,
    committed: PeerAddr,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        MemoryPeerStore {
            inner: Mutex::new(Slots {
                staged: PeerAddr::ZERO,
                committed: PeerAddr::ZERO,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.inner.lock().expect("peer store lock poisoned")
    }
}

impl Default for MemoryPeerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerStore for MemoryPeerStore {
    fn stage(&self, peer: PeerAddr) -> Result<(), StorageError> {
        self.lock().staged = peer;
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let mut slots = self.lock();
        slots.committed = slots.staged;
        Ok(())
    }

    fn peer(&self) -> PeerAddr {
        self.lock().committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_is_invisible_until_commit() {
        let store = MemoryPeerStore::new();
        let peer = PeerAddr::new([1, 2, 3, 4, 5, 6]);
        store.stage(peer).unwrap();
        assert_eq!(store.peer(), PeerAddr::ZERO);
        store.commit().unwrap();
        assert_eq!(store.peer(), peer);
    }

    #[test]
    fn staging_zero_clears_on_commit() {
        let store = MemoryPeerStore::new();
        store.stage(PeerAddr::new([9; 6])).unwrap();
        store.commit().unwrap();
        store.stage(PeerAddr::ZERO).unwrap();
        store.commit().unwrap();
        assert!(store.peer().is_zero());
    }
}
