//! Client-side prediction, rollback, and resimulation.
//!
//! `PredictionManager` owns the two leaf stores it orchestrates
//! (`InputHistory`, `SnapshotRing`) and drives the local `World` forward,
//! rewinding and resimulating whenever authoritative input disagrees with
//! what was predicted.

use crate::input_history::{FrameInputSet, InputHistory, LifecycleEvent, LifecycleKind};
use crate::peer::PeerId;
use crate::snapshot_ring::{Snapshot, SnapshotRing};
use crate::world::{TickInput, World};

/// Outcome of `execute_rollback`: whether resimulation actually ran, or was
/// abandoned because the target snapshot had already been evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    Aborted,
}

/// Outcome of `receive_server_tick`, distinguishing "no rollback needed"
/// from the two ways a rollback attempt can conclude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NoRollback,
    RolledBack,
    RollbackAborted,
}

/// Rollback/resimulation counters, reported externally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PredictionStats {
    pub rollback_count: u32,
    pub frames_resimulated: u32,
    pub max_rollback_depth: u32,
}

/// Callback slots the prediction manager invokes at well-defined points.
/// Each slot holds at most one subscriber — re-registering replaces the
/// previous one rather than chaining, per §9's note against silent
/// multi-subscriber fan-out.
#[derive(Default)]
pub struct Callbacks {
    pub on_rollback: Option<Box<dyn FnMut(u32, u32)>>,
    pub on_lifecycle_event: Option<Box<dyn FnMut(&LifecycleEvent)>>,
    pub on_undo_lifecycle_event: Option<Box<dyn FnMut(&LifecycleEvent)>>,
    pub inputs_callback: Option<Box<dyn FnMut(u32, &mut Vec<TickInput>)>>,
}

pub struct PredictionManager {
    pub max_prediction_frames: u32,
    pub input_delay_frames: u32,
    pub snapshot_interval: u32,

    local_frame: u32,
    confirmed_frame: u32,
    enabled: bool,

    history: InputHistory,
    ring: SnapshotRing,
    stats: PredictionStats,

    pub callbacks: Callbacks,
}

impl PredictionManager {
    pub fn new(max_prediction_frames: u32, input_delay_frames: u32, snapshot_interval: u32) -> Self {
        let ring_capacity = (max_prediction_frames as usize + 1).max(1);
        Self {
            max_prediction_frames,
            input_delay_frames,
            snapshot_interval,
            local_frame: 0,
            confirmed_frame: 0,
            enabled: true,
            history: InputHistory::new(),
            ring: SnapshotRing::new(ring_capacity),
            stats: PredictionStats::default(),
            callbacks: Callbacks::default(),
        }
    }

    pub fn local_frame(&self) -> u32 {
        self.local_frame
    }

    pub fn confirmed_frame(&self) -> u32 {
        self.confirmed_frame
    }

    pub fn prediction_depth(&self) -> u32 {
        self.local_frame - self.confirmed_frame
    }

    pub fn stats(&self) -> PredictionStats {
        self.stats
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Force `local_frame` and `confirmed_frame` to `frame`, used after a
    /// resync snapshot load. Caller must have already reset ring/history.
    pub fn jump_to(&mut self, frame: u32) {
        self.local_frame = frame;
        self.confirmed_frame = frame;
    }

    pub fn history(&self) -> &InputHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut InputHistory {
        &mut self.history
    }

    pub fn ring(&self) -> &SnapshotRing {
        &self.ring
    }

    /// Queue a local input at `local_frame + input_delay_frames`,
    /// pre-confirmed for `self_peer`, so it can never be mispredicted
    /// against itself once the local frame catches up to it.
    pub fn queue_local_input(&mut self, self_peer: PeerId, data: Vec<u8>) {
        let target = self.local_frame + self.input_delay_frames;
        self.history.set(target, self_peer, data, true);
    }

    /// Queue a lifecycle event generated *locally* (e.g. a resync request
    /// the local peer itself originates) for the next frame to be ticked.
    /// Goes through the same `InputHistory` queue Join/Leave replay from,
    /// rather than a side channel, so it is ordered with other inputs and
    /// is undone/replayed like any other lifecycle event across a rollback.
    /// Returns the frame it was queued for.
    pub fn queue_local_lifecycle_event(&mut self, self_peer: PeerId, kind: LifecycleKind) -> u32 {
        let frame = self.local_frame + 1;
        self.history.queue_lifecycle(frame, LifecycleEvent { seq: 0, client: self_peer, kind });
        frame
    }

    /// Lifecycle events first (they fire before game-input ticks per the
    /// ordering guarantee), then one game input per active peer.
    fn assemble_inputs(&self, frame: u32, active_peers: &[PeerId]) -> Vec<TickInput> {
        let confirmed = self.history.frame_set(frame);
        let mut inputs: Vec<TickInput> = self
            .history
            .lifecycle_events(frame)
            .into_iter()
            .map(|e| TickInput::Lifecycle { client: e.client, kind: e.kind })
            .collect();
        inputs.extend(active_peers.iter().map(|peer| {
            let data = confirmed
                .and_then(|set| set.get(peer))
                .map(|entry| entry.data.clone())
                .unwrap_or_else(|| self.history.predict(peer));
            TickInput::Game { client: peer.clone(), data }
        }));
        inputs
    }

    fn emit_lifecycle(&mut self, frame: u32) {
        for event in self.history.lifecycle_events(frame) {
            if let Some(cb) = self.callbacks.on_lifecycle_event.as_mut() {
                cb(&event);
            }
        }
    }

    /// Advance the local simulation by one frame, if the prediction budget
    /// allows it. Returns `true` if a tick was executed.
    pub fn advance(&mut self, world: &mut impl World, active_peers: &[PeerId]) -> bool {
        if !self.enabled || self.prediction_depth() >= self.max_prediction_frames {
            return false;
        }

        self.save_snapshot(world);
        self.local_frame += 1;

        let mut inputs = self.assemble_inputs(self.local_frame, active_peers);
        if let Some(cb) = self.callbacks.inputs_callback.as_mut() {
            cb(self.local_frame, &mut inputs);
        }

        self.emit_lifecycle(self.local_frame);
        world.tick(self.local_frame, &inputs);
        true
    }

    fn save_snapshot(&mut self, world: &impl World) {
        let (data, state_hash) = world.snapshot();
        self.ring.save(Snapshot { frame: self.local_frame, state_hash, data });
    }

    /// Apply an authoritative tick for `frame` carrying confirmed game
    /// inputs `inputs` and any lifecycle events observed at that frame.
    pub fn receive_server_tick(
        &mut self,
        frame: u32,
        inputs: &[(PeerId, Vec<u8>)],
        lifecycle: &[LifecycleEvent],
        world: &mut impl World,
        active_peers: &[PeerId],
    ) -> TickOutcome {
        if frame > self.local_frame {
            for event in lifecycle {
                if let Some(cb) = self.callbacks.on_lifecycle_event.as_mut() {
                    cb(event);
                }
                self.history.queue_lifecycle(frame, event.clone());
            }
            for (peer, data) in inputs {
                self.history.set(frame, peer.clone(), data.clone(), true);
            }
            return TickOutcome::NoRollback;
        }

        let mut mispredicted = !lifecycle.is_empty();
        if !mispredicted {
            let existing = self.history.frame_set(frame);
            mispredicted = inputs.iter().any(|(peer, data)| match existing.and_then(|s| s.get(peer)) {
                Some(entry) => !entry.confirmed || &entry.data != data,
                None => true,
            });
        }

        for event in lifecycle {
            self.history.queue_lifecycle(frame, event.clone());
        }
        for (peer, data) in inputs {
            self.history.set(frame, peer.clone(), data.clone(), true);
        }
        self.confirmed_frame = self.confirmed_frame.max(frame);

        if mispredicted {
            match self.execute_rollback(frame, world, active_peers) {
                RollbackOutcome::RolledBack => TickOutcome::RolledBack,
                RollbackOutcome::Aborted => TickOutcome::RollbackAborted,
            }
        } else {
            TickOutcome::NoRollback
        }
    }

    /// Roll back to frame `f`: restore the snapshot at `f - 1` and
    /// resimulate forward to the frame the local simulation was at. Returns
    /// `RollbackOutcome::Aborted` without mutating anything if the target
    /// snapshot has already been evicted from the ring (§7 MissingSnapshot);
    /// the caller is expected to report that distinctly from a completed
    /// rollback.
    pub fn execute_rollback(&mut self, f: u32, world: &mut impl World, active_peers: &[PeerId]) -> RollbackOutcome {
        let local_frame_before = self.local_frame;

        let restore_frame = f.saturating_sub(1);
        let snapshot_data = match self.ring.load(restore_frame) {
            Some(snapshot) => snapshot.data.clone(),
            None => return RollbackOutcome::Aborted,
        };

        // Undo lifecycle events in descending frame order.
        let mut frame = local_frame_before;
        while frame >= f {
            for event in self.history.lifecycle_events(frame).into_iter().rev() {
                if let Some(cb) = self.callbacks.on_undo_lifecycle_event.as_mut() {
                    cb(&event);
                }
            }
            if frame == 0 {
                break;
            }
            frame -= 1;
        }

        world.load_snapshot(&snapshot_data);

        for frame in f..=local_frame_before {
            let mut inputs = self.assemble_inputs(frame, active_peers);
            if let Some(cb) = self.callbacks.inputs_callback.as_mut() {
                cb(frame, &mut inputs);
            }
            self.emit_lifecycle(frame);
            world.tick(frame, &inputs);
            let (data, state_hash) = world.snapshot();
            self.ring.save(Snapshot { frame, state_hash, data });
        }

        let frames_resimulated = local_frame_before - f + 1;
        self.stats.rollback_count += 1;
        self.stats.frames_resimulated += frames_resimulated;
        self.stats.max_rollback_depth = self.stats.max_rollback_depth.max(frames_resimulated);

        if let Some(cb) = self.callbacks.on_rollback.as_mut() {
            cb(local_frame_before, f);
        }

        RollbackOutcome::RolledBack
    }

    /// Confirmed frame set at `frame`, if any inputs have been recorded.
    pub fn frame_set(&self, frame: u32) -> Option<&FrameInputSet> {
        self.history.frame_set(frame)
    }

    /// Discard all state: ring, history, stats, and rewind to frame 0.
    pub fn reset(&mut self) {
        self.local_frame = 0;
        self.confirmed_frame = 0;
        self.enabled = true;
        self.history.clear();
        self.ring.clear();
        self.stats = PredictionStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_u32;

    /// Minimal deterministic world for tests: state is a running
    /// xxHash32-style fold of every input byte it has ever seen, plus a
    /// fixed entity count.
    #[derive(Clone)]
    struct FakeWorld {
        state: u32,
        history: Vec<u32>,
    }

    impl FakeWorld {
        fn new() -> Self {
            Self { state: 0, history: vec![0] }
        }
    }

    impl World for FakeWorld {
        fn tick(&mut self, frame: u32, inputs: &[TickInput]) {
            let mut h = hash_u32(self.state, frame);
            for input in inputs {
                if let TickInput::Game { data, .. } = input {
                    for byte in data {
                        h = hash_u32(h, *byte as u32);
                    }
                }
            }
            self.state = h;
            self.history.push(h);
        }

        fn snapshot(&self) -> (Vec<u8>, u32) {
            (self.state.to_le_bytes().to_vec(), self.state)
        }

        fn load_snapshot(&mut self, data: &[u8]) {
            let bytes: [u8; 4] = data.try_into().unwrap();
            self.state = u32::from_le_bytes(bytes);
        }

        fn state_hash(&self) -> u32 {
            self.state
        }

        fn entity_count(&self) -> u32 {
            0
        }

        fn entity_ids(&self) -> Vec<u64> {
            Vec::new()
        }

        fn serialize_entities(&self, _ids: &[u64]) -> Vec<u8> {
            Vec::new()
        }

        fn merge_entities(&mut self, _partition_id: u32, _data: &[u8]) {}
    }

    #[test]
    fn advance_stops_at_prediction_budget() {
        let mut pm = PredictionManager::new(3, 0, 1);
        let mut world = FakeWorld::new();
        let peers = vec![];
        for _ in 0..3 {
            assert!(pm.advance(&mut world, &peers));
        }
        assert!(!pm.advance(&mut world, &peers));
        assert_eq!(pm.local_frame(), 3);
    }

    #[test]
    fn future_server_tick_never_rolls_back() {
        let mut pm = PredictionManager::new(10, 0, 1);
        let mut world = FakeWorld::new();
        let peers = vec![PeerId::new("a")];
        pm.advance(&mut world, &peers);
        let outcome = pm.receive_server_tick(5, &[], &[], &mut world, &peers);
        assert_eq!(outcome, TickOutcome::NoRollback);
        assert_eq!(pm.confirmed_frame(), 0);
    }

    #[test]
    fn misprediction_triggers_rollback_and_updates_stats() {
        let mut pm = PredictionManager::new(10, 0, 1);
        let mut world = FakeWorld::new();
        let peer_b = PeerId::new("b");
        let peers = vec![peer_b.clone()];

        for _ in 0..5 {
            pm.advance(&mut world, &peers);
        }
        assert_eq!(pm.local_frame(), 5);

        let outcome = pm.receive_server_tick(
            5,
            &[(peer_b.clone(), vec![99, 99])],
            &[],
            &mut world,
            &peers,
        );
        assert_eq!(outcome, TickOutcome::RolledBack);
        let stats = pm.stats();
        assert_eq!(stats.rollback_count, 1);
        assert_eq!(stats.frames_resimulated, 1);
    }

    #[test]
    fn reassigning_same_confirmed_inputs_does_not_rollback() {
        let mut pm = PredictionManager::new(10, 0, 1);
        let mut world = FakeWorld::new();
        let peer_a = PeerId::new("a");
        let peers = vec![peer_a.clone()];
        pm.advance(&mut world, &peers);
        let data = vec![1, 2, 3];
        let outcome1 = pm.receive_server_tick(1, &[(peer_a.clone(), data.clone())], &[], &mut world, &peers);
        assert_eq!(outcome1, TickOutcome::RolledBack);
        let outcome2 = pm.receive_server_tick(1, &[(peer_a.clone(), data)], &[], &mut world, &peers);
        assert_eq!(outcome2, TickOutcome::NoRollback);
    }

    #[test]
    fn reset_clears_everything() {
        let mut pm = PredictionManager::new(10, 0, 1);
        let mut world = FakeWorld::new();
        let peers = vec![PeerId::new("a")];
        pm.advance(&mut world, &peers);
        pm.reset();
        assert_eq!(pm.local_frame(), 0);
        assert_eq!(pm.confirmed_frame(), 0);
        assert_eq!(pm.stats(), PredictionStats::default());
    }
}
