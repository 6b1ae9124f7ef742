//! Top-level orchestrator: owns the active peer set and wires the eight
//! subsystems together behind a small public surface (`advance`,
//! `enqueue`, `stats`).
//!
//! Inbound transport traffic is queued on a `crossbeam-channel` and
//! drained at the start of each `advance` call, never mid-tick, per the
//! §5 concurrency model — a separate transport task may push into the
//! channel concurrently, but all simulation-affecting state is only ever
//! touched from the thread calling `advance`.

use crate::config::SyncConfig;
use crate::delta::{AcceptOutcome, DeltaDistributor, DeltaMessage, RELIABILITY_BONUS_ON_DELIVERY, RELIABILITY_PENALTY_ON_TIMEOUT};
use crate::error::{Error, Result};
use crate::input_history::{LifecycleEvent, LifecycleKind};
use crate::observability::{Event, ObservabilitySink};
use crate::peer::{ActivePeerSet, PeerId};
use crate::prediction::{PredictionManager, TickOutcome};
use crate::resync::{ResyncAuthority, ResyncRequester};
use crate::state_hash_arbiter::{Outcome as HashOutcome, StateHashArbiter, SyncStats};
use crate::world::{Message, World};
use crossbeam_channel::{Receiver, Sender};
use rustc_hash::FxHashMap;

/// An inbound message tagged with the peer that sent it (needed for
/// message kinds whose payload doesn't itself carry a sender, e.g. `Hash`
/// and `Delta`).
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub from: PeerId,
    pub message: Message,
}

/// Externally reported engine statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub local_frame: u32,
    pub confirmed_frame: u32,
    pub prediction: crate::prediction::PredictionStats,
    pub sync: SyncStats,
    pub active_peer_count: usize,
    pub tick_rate_multiplier_fp: i64,
}

pub struct SyncEngine {
    config: SyncConfig,
    self_peer: PeerId,
    active_peers: ActivePeerSet,
    prediction: PredictionManager,
    arbiter: StateHashArbiter,
    resync_requester: ResyncRequester,
    resync_authority: ResyncAuthority,
    delta: DeltaDistributor,
    time_sync: crate::time_sync::TimeSyncManager,
    observability: Box<dyn ObservabilitySink>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    suspended: bool,
    next_arbitration_frame: u32,
    local_hashes: FxHashMap<u32, u32>,
    pending_deadline: Option<(u32, crate::partition::PartitionAssignment)>,
    resync_request_frame: Option<u32>,
    fatal: Option<String>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, self_peer: PeerId, observability: Box<dyn ObservabilitySink>) -> Result<Self> {
        config.validate()?;
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let mut active_peers = ActivePeerSet::new();
        active_peers.join(self_peer.clone(), 0);
        Ok(Self {
            prediction: PredictionManager::new(
                config.max_prediction_frames,
                config.input_delay_frames,
                config.snapshot_interval,
            ),
            arbiter: StateHashArbiter::new(config.hash_window, config.ack_window),
            resync_requester: ResyncRequester::new(),
            resync_authority: ResyncAuthority::new(),
            delta: DeltaDistributor::new(),
            time_sync: crate::time_sync::TimeSyncManager::new(),
            config,
            self_peer,
            active_peers,
            observability,
            inbound_tx,
            inbound_rx,
            suspended: false,
            next_arbitration_frame: 0,
            local_hashes: FxHashMap::default(),
            pending_deadline: None,
            resync_request_frame: None,
            fatal: None,
        })
    }

    /// A cloneable handle a transport task can use to push inbound
    /// messages without holding a reference to the engine itself.
    pub fn inbound_sender(&self) -> Sender<Inbound> {
        self.inbound_tx.clone()
    }

    pub fn enqueue(&self, from: PeerId, message: Message) {
        let _ = self.inbound_tx.send(Inbound { from, message });
    }

    pub fn queue_local_input(&mut self, data: Vec<u8>) {
        let peer = self.self_peer.clone();
        self.prediction.queue_local_input(peer, data);
    }

    /// Register a peer as already known (e.g. from a handshake that
    /// happened before the engine was constructed), without going through
    /// the inbound `Join` message path.
    pub fn add_known_peer(&mut self, peer: PeerId, frame: u32) {
        self.active_peers.join(peer, frame);
    }

    pub fn peer_reliability(&self, peer: &PeerId) -> Option<u8> {
        self.active_peers.get(peer).map(|r| r.reliability)
    }

    pub fn self_peer(&self) -> &PeerId {
        &self.self_peer
    }

    fn active_sorted(&self) -> Vec<PeerId> {
        self.active_peers.active_sorted().into_iter().map(|r| r.peer.clone()).collect()
    }

    fn reliability_of(&self, peer: &PeerId) -> u8 {
        self.active_peers.get(peer).map(|r| r.reliability).unwrap_or(50)
    }

    fn drain_inbound(&mut self, world: &mut impl World, now: i64) {
        let pending: Vec<Inbound> = self.inbound_rx.try_iter().collect();
        for Inbound { from, message } in pending {
            self.handle_one(from, message, world, now);
        }
    }

    /// Route a join/leave lifecycle event through the same path a
    /// confirmed game input takes: `PredictionManager::receive_server_tick`
    /// already queues it for a future frame or forces a rollback for a
    /// past one.
    fn apply_lifecycle_event(&mut self, frame: u32, event: LifecycleEvent, world: &mut impl World) {
        let active = self.active_sorted();
        let outcome = self.prediction.receive_server_tick(frame, &[], std::slice::from_ref(&event), world, &active);
        self.report_tick_outcome(outcome, frame);
    }

    /// Report the outcome of a `receive_server_tick` call: a genuine
    /// rollback, a rollback abandoned for a missing snapshot, or nothing.
    fn report_tick_outcome(&mut self, outcome: TickOutcome, frame: u32) {
        match outcome {
            TickOutcome::NoRollback => {}
            TickOutcome::RolledBack => {
                self.observability.emit(Event::Rollback {
                    from: self.prediction.local_frame(),
                    to: frame,
                    frames_resimulated: self.prediction.stats().frames_resimulated,
                });
            }
            TickOutcome::RollbackAborted => {
                self.observability.emit(Event::MissingSnapshot { frame });
            }
        }
    }

    fn handle_one(&mut self, from: PeerId, message: Message, world: &mut impl World, now: i64) {
        let current_frame = self.prediction.local_frame();
        match message {
            Message::Join { peer, frame } => {
                self.active_peers.join(peer.clone(), current_frame);
                let event = LifecycleEvent { seq: 0, client: peer.clone(), kind: LifecycleKind::Join };
                self.apply_lifecycle_event(frame, event, world);
                self.observability.emit(Event::PeerJoined { peer, frame });
            }
            Message::Leave { peer, frame } => {
                self.active_peers.leave(&peer, current_frame);
                let event = LifecycleEvent { seq: 0, client: peer.clone(), kind: LifecycleKind::Leave };
                self.apply_lifecycle_event(frame, event, world);
                self.observability.emit(Event::PeerLeft { peer, frame });
            }
            Message::Hash { frame, hash } => {
                self.arbiter.record_hash(frame, from, hash);
            }
            Message::Delta { frame, partition_id, entities } => {
                let active = self.active_sorted();
                let assignment = self.delta.compute_assignment(
                    world.entity_count(),
                    &active,
                    frame,
                    |p| self.reliability_of(p),
                    self.config.senders_per_partition,
                );
                let outcome = self.delta.receive(
                    DeltaMessage { frame, partition: partition_id as u32, sender: from.clone(), entities },
                    &assignment,
                );
                if outcome == AcceptOutcome::Accepted {
                    if let Some(record) = self.active_peers.get_mut(&from) {
                        record.bump_reliability(RELIABILITY_BONUS_ON_DELIVERY);
                    }
                }
            }
            Message::Snapshot { frame, hash: _, data } => {
                if self.resync_requester.is_pending() {
                    world.load_snapshot(&data);
                    self.prediction.reset();
                    self.prediction.jump_to(frame);
                    self.resync_requester.complete();
                    self.resync_request_frame = None;
                    self.arbiter.clear_desync();
                    self.next_arbitration_frame = frame;
                    self.local_hashes.clear();
                    self.observability.emit(Event::ResyncCompleted { frame });
                }
            }
            Message::Ping { t_send: _ } => {
                // Ping replies are produced by the transport layer, which
                // knows its own wall clock; nothing to do on receipt.
            }
            Message::Pong { t_send, t_server } => {
                self.time_sync.on_pong(t_send, t_server, now);
            }
            Message::RequestResync { peer } => {
                self.resync_authority.observe_request(peer);
            }
            Message::Tick { frame: tick_frame, inputs, majority_hash: _ } => {
                let lifecycle = self.prediction.history().lifecycle_events(tick_frame);
                let active = self.active_sorted();
                let outcome = self.prediction.receive_server_tick(tick_frame, &inputs, &lifecycle, world, &active);
                self.report_tick_outcome(outcome, tick_frame);
            }
        }
    }

    /// Penalize assigned senders who missed delivery for `frame` by its
    /// deadline, report the resulting degradation tier, and — unless that
    /// tier is `Skip` — merge the frame's collected deltas into `world` as
    /// a unit. Per §4.9 step 4, the tier decision gates whether a frame's
    /// deltas are applied at all, so merging cannot happen per-message as
    /// each one arrives.
    fn process_delta_deadline(&mut self, frame: u32, assignment: &crate::partition::PartitionAssignment, world: &mut impl World) {
        let mut partition_ids: Vec<u32> = assignment.senders.keys().copied().collect();
        partition_ids.sort_unstable();
        let received = self.delta.received_count(frame, assignment.num_partitions);

        for partition in partition_ids {
            let delivered = self.delta.collected(frame, assignment.num_partitions).iter().any(|(p, _)| *p == partition);
            if !delivered {
                if let Some(senders) = assignment.senders.get(&partition) {
                    for sender in senders {
                        if let Some(record) = self.active_peers.get_mut(sender) {
                            record.bump_reliability(RELIABILITY_PENALTY_ON_TIMEOUT);
                        }
                    }
                }
            }
        }

        let trusted = self.delta.trusted_senders(frame, assignment.num_partitions).len() as u32;
        let total_senders: u32 = assignment.senders.values().map(|v| v.len() as u32).sum();
        let tier = crate::partition::degradation_tier(assignment.num_partitions, received, trusted, total_senders);
        if tier != crate::partition::DegradationTier::Normal {
            self.observability.emit(Event::DegradedDelta { frame, tier });
        }

        if tier != crate::partition::DegradationTier::Skip {
            for (partition, entities) in self.delta.collected(frame, assignment.num_partitions) {
                world.merge_entities(partition, entities);
            }
        }
    }

    /// Begin a resync request: route a `resync_request` lifecycle event
    /// through the normal `InputHistory`/`PredictionManager` channel (§3,
    /// §4.8), so it's ordered with other inputs rather than a side
    /// channel, in addition to the wire message that actually reaches the
    /// authority.
    fn send_resync_request(&mut self, frame: u32, outbound: &mut Vec<Message>) {
        self.resync_request_frame = Some(frame);
        let self_peer = self.self_peer.clone();
        self.prediction.queue_local_lifecycle_event(self_peer.clone(), LifecycleKind::ResyncRequest);
        outbound.push(Message::RequestResync { peer: self_peer });
        self.observability.emit(Event::ResyncRequested { frame });
    }

    /// Check whether an outstanding resync request has gone unanswered past
    /// `resync_timeout_frames`, and either retry it or surface
    /// `Error::ResyncTimeout` once `MAX_RESYNC_ATTEMPTS` is exhausted.
    fn process_resync_timeout(&mut self, frame: u32, outbound: &mut Vec<Message>) -> Result<()> {
        let Some(requested_at) = self.resync_request_frame else { return Ok(()) };
        if !self.resync_requester.is_pending() {
            self.resync_request_frame = None;
            return Ok(());
        }
        if frame.saturating_sub(requested_at) < self.config.resync_timeout_frames {
            return Ok(());
        }
        if self.resync_requester.on_timeout() {
            self.send_resync_request(frame, outbound);
            Ok(())
        } else {
            let attempts = self.resync_requester.attempts();
            Err(Error::ResyncTimeout { attempts })
        }
    }

    /// Arbitrate every frame whose report window has closed.
    fn arbitrate_ready_frames(&mut self, current_frame: u32) {
        let active_count = self.active_peers.len_active();
        while self.next_arbitration_frame <= current_frame {
            let f = self.next_arbitration_frame;
            if !self.arbiter.is_ready(f, active_count, current_frame) {
                break;
            }
            let Some(local_hash) = self.local_hashes.remove(&f) else { break };
            match self.arbiter.arbitrate(f, local_hash) {
                HashOutcome::NoMajority => {
                    self.observability.emit(Event::NoMajorityHash { frame: f });
                }
                HashOutcome::Majority { hash, matched } => {
                    if !matched {
                        self.observability.emit(Event::Desync { frame: f, local_hash, majority_hash: hash });
                    }
                }
            }
            self.next_arbitration_frame = f + 1;
        }
    }

    /// Run one simulation tick: drain inbound messages, advance
    /// prediction, emit deltas/hash/ping, arbitrate any ready frames, and
    /// dispatch pending resync snapshots. `now` is the caller's monotonic
    /// clock, used only for time-sync bookkeeping.
    pub fn advance(&mut self, world: &mut impl World, now: i64) -> Result<Vec<Message>> {
        if let Some(reason) = &self.fatal {
            return Err(Error::Fatal(reason.clone()));
        }
        if self.suspended {
            return Ok(vec![]);
        }

        self.drain_inbound(world, now);
        self.time_sync.adjust_for_depth(self.prediction.prediction_depth());

        let active = self.active_sorted();
        let advanced = self.prediction.advance(world, &active);
        let mut outbound = Vec::new();
        if !advanced {
            return Ok(outbound);
        }

        let frame = self.prediction.local_frame();

        // One tick of grace after a frame's assignment was computed, per
        // §5's "delta collection waits until the end of the frame + one
        // tick grace": process last tick's assignment deadline now.
        if let Some((deadline_frame, prev_assignment)) = self.pending_deadline.take() {
            self.process_delta_deadline(deadline_frame, &prev_assignment, world);
        }

        let assignment = self.delta.compute_assignment(
            world.entity_count(),
            &active,
            frame,
            |p| self.reliability_of(p),
            self.config.senders_per_partition,
        );
        for partition in self.delta.partitions_to_send(&assignment, &self.self_peer) {
            let ids: Vec<u64> = world
                .entity_ids()
                .into_iter()
                .filter(|id| crate::partition::entity_partition(*id, assignment.num_partitions) == partition)
                .collect();
            let entities = world.serialize_entities(&ids);
            outbound.push(Message::Delta { frame, partition_id: partition as u16, entities });
        }
        self.pending_deadline = Some((frame, assignment));

        let local_hash = world.state_hash();
        self.arbiter.record_hash(frame, self.self_peer.clone(), local_hash);
        self.local_hashes.insert(frame, local_hash);
        outbound.push(Message::Hash { frame, hash: local_hash });

        self.arbitrate_ready_frames(frame);

        if self.arbiter.stats().is_desynced && self.resync_requester.begin_request() {
            self.send_resync_request(frame, &mut outbound);
        }
        self.process_resync_timeout(frame, &mut outbound)?;

        for _target in self.resync_authority.take_pending() {
            let (data, hash) = world.snapshot();
            outbound.push(Message::Snapshot { frame, hash, data });
        }

        self.arbiter.evict_before(frame);
        self.delta.evict_before(frame.saturating_sub(self.config.ack_window));
        let hash_floor = frame.saturating_sub(self.config.hash_window);
        self.local_hashes.retain(|&f, _| f >= hash_floor);
        let input_floor = self.prediction.confirmed_frame().saturating_sub(self.config.max_prediction_frames);
        self.prediction.history_mut().evict_before(input_floor);

        Ok(outbound)
    }

    /// Mark the world as having panicked/failed irrecoverably; the engine
    /// refuses further `advance` calls until `reset`.
    pub fn mark_fatal(&mut self, reason: impl Into<String>) {
        self.fatal = Some(reason.into());
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            local_frame: self.prediction.local_frame(),
            confirmed_frame: self.prediction.confirmed_frame(),
            prediction: self.prediction.stats(),
            sync: self.arbiter.stats(),
            active_peer_count: self.active_peers.len_active(),
            tick_rate_multiplier_fp: self.time_sync.tick_rate_multiplier(),
        }
    }

    pub fn reset(&mut self) {
        self.prediction.reset();
        self.arbiter.reset();
        self.resync_requester.reset();
        self.resync_authority.reset();
        self.delta.reset();
        self.time_sync.reset();
        self.suspended = false;
        self.next_arbitration_frame = 0;
        self.local_hashes.clear();
        self.resync_request_frame = None;
        self.fatal = None;
        while self.inbound_rx.try_recv().is_ok() {}
    }
}
