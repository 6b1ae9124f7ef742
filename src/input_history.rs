//! Per-frame input bookkeeping: confirmed vs. predicted game inputs, and
//! the separate lifecycle-event queue that rollback must replay.

use crate::peer::PeerId;
use rustc_hash::FxHashMap;

/// The three lifecycle kinds the core itself understands; everything else
/// is an opaque game input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Join,
    Leave,
    ResyncRequest,
}

/// A lifecycle input, ordered by the producer's monotonic `seq` within a
/// frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub seq: u32,
    pub client: PeerId,
    pub kind: LifecycleKind,
}

/// One peer's game input at a frame: opaque payload bytes plus whether
/// this is authoritative (`confirmed`) or a local placeholder prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEntry {
    pub data: Vec<u8>,
    pub confirmed: bool,
}

/// `PeerId → InputEntry` for a single frame. A frame-input set never
/// contains two records for the same peer — inserting overwrites.
pub type FrameInputSet = FxHashMap<PeerId, InputEntry>;

/// Bounded-window store of frame-input sets and lifecycle events.
#[derive(Debug, Default)]
pub struct InputHistory {
    frames: FxHashMap<u32, FrameInputSet>,
    lifecycle: FxHashMap<u32, Vec<LifecycleEvent>>,
    /// Most recent confirmed game-input payload per peer, used to predict
    /// via "repeat last" when no confirmed input exists yet for a frame.
    last_confirmed: FxHashMap<PeerId, Vec<u8>>,
}

impl InputHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the entry for `peer` at `frame`.
    pub fn set(&mut self, frame: u32, peer: PeerId, data: Vec<u8>, confirmed: bool) {
        if confirmed {
            self.last_confirmed.insert(peer.clone(), data.clone());
        }
        self.frames
            .entry(frame)
            .or_default()
            .insert(peer, InputEntry { data, confirmed });
    }

    /// Queue a lifecycle event for `frame`. Events within a frame are
    /// retrieved ordered by `seq`.
    pub fn queue_lifecycle(&mut self, frame: u32, event: LifecycleEvent) {
        self.lifecycle.entry(frame).or_default().push(event);
    }

    pub fn frame_set(&self, frame: u32) -> Option<&FrameInputSet> {
        self.frames.get(&frame)
    }

    /// Lifecycle events queued for `frame`, ordered by producer sequence.
    pub fn lifecycle_events(&self, frame: u32) -> Vec<LifecycleEvent> {
        let mut events = self.lifecycle.get(&frame).cloned().unwrap_or_default();
        events.sort_by_key(|e| e.seq);
        events
    }

    /// Sorted peer ids with any entry (confirmed or predicted) at `frame`.
    pub fn active_peers(&self, frame: u32) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self
            .frames
            .get(&frame)
            .map(|set| set.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Predict `peer`'s input at a frame where no confirmed entry exists
    /// yet: repeat the most recent confirmed payload, or an empty payload
    /// if this peer has never confirmed one.
    pub fn predict(&self, peer: &PeerId) -> Vec<u8> {
        self.last_confirmed.get(peer).cloned().unwrap_or_default()
    }

    /// Drop all frame and lifecycle state strictly before `frame`.
    pub fn evict_before(&mut self, frame: u32) {
        self.frames.retain(|&f, _| f >= frame);
        self.lifecycle.retain(|&f, _| f >= frame);
    }

    /// Discard all history; used by `reset()`.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.lifecycle.clear();
        self.last_confirmed.clear();
    }
}
