//! Fixed-capacity frame → snapshot ring buffer used for rollback.
//!
//! Snapshots are opaque to the core (game-layer serialized bytes plus the
//! frame and hash they were taken at); the ring just needs to keep enough
//! history to roll back `max_prediction_frames` ticks.

/// A snapshot of opaque world state captured at a given frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub frame: u32,
    pub state_hash: u32,
    pub data: Vec<u8>,
}

/// Ring buffer keyed by `frame % capacity`. A slot may hold a stale
/// snapshot from a previous wrap; `save`/`load` check the stored frame
/// number to detect that and treat it as absent.
#[derive(Debug)]
pub struct SnapshotRing {
    capacity: usize,
    slots: Vec<Option<Snapshot>>,
}

impl SnapshotRing {
    /// `capacity` must be at least `max_prediction_frames + 1` so that any
    /// frame in `[confirmed_frame, local_frame]` stays resident.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "snapshot ring capacity must be > 0");
        Self { capacity, slots: vec![None; capacity] }
    }

    pub fn save(&mut self, snapshot: Snapshot) {
        let idx = snapshot.frame as usize % self.capacity;
        self.slots[idx] = Some(snapshot);
    }

    pub fn load(&self, frame: u32) -> Option<&Snapshot> {
        let idx = frame as usize % self.capacity;
        self.slots[idx].as_ref().filter(|s| s.frame == frame)
    }

    /// Evict any slot holding a snapshot older than `frame`.
    pub fn evict_before(&mut self, frame: u32) {
        for slot in &mut self.slots {
            if let Some(s) = slot {
                if s.frame < frame {
                    *slot = None;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
