//! Peer-sharded entity-delta dissemination.
//!
//! Each tick, `DeltaDistributor` figures out which partitions the local
//! peer must send (from `PartitionAssignment`), accepts incoming deltas
//! from the first assigned sender that reports for a given
//! `(frame, partition)`, and classifies how complete delivery was once the
//! frame's deadline passes.

use crate::partition::{self, DegradationTier, PartitionAssignment};
use crate::peer::PeerId;
use rustc_hash::FxHashMap;

/// A delta message as received from a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaMessage {
    pub frame: u32,
    pub partition: u32,
    pub sender: PeerId,
    pub entities: Vec<u8>,
}

/// Outcome of accepting an inbound delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// First report for `(frame, partition)` from an assigned sender.
    Accepted,
    /// A later report for an already-satisfied `(frame, partition)`.
    Discarded,
    /// Sender is not one of the computed `senders[partition]`.
    UntrustedSender,
}

#[derive(Debug, Default)]
pub struct DeltaDistributor {
    accepted: FxHashMap<(u32, u32), (PeerId, Vec<u8>)>,
}

impl DeltaDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute this frame's partition assignment. A thin wrapper so
    /// callers don't need to import `partition::assign` directly.
    pub fn compute_assignment(
        &self,
        entity_count: u32,
        peers: &[PeerId],
        frame: u32,
        reliability: impl Fn(&PeerId) -> u8,
        senders_per_partition: usize,
    ) -> PartitionAssignment {
        partition::assign(entity_count, peers, frame, reliability, senders_per_partition)
    }

    /// Partitions the local peer must emit a delta for this frame.
    pub fn partitions_to_send(&self, assignment: &PartitionAssignment, local_peer: &PeerId) -> Vec<u32> {
        let mut ps: Vec<u32> = assignment.partitions_for(local_peer).collect();
        ps.sort_unstable();
        ps
    }

    /// Accept an inbound delta, applying the "first assigned sender wins"
    /// rule. Returns the outcome so the caller can update reliability.
    pub fn receive(&mut self, msg: DeltaMessage, assignment: &PartitionAssignment) -> AcceptOutcome {
        if !assignment.is_assigned(&msg.sender, msg.partition) {
            return AcceptOutcome::UntrustedSender;
        }
        let key = (msg.frame, msg.partition);
        if self.accepted.contains_key(&key) {
            return AcceptOutcome::Discarded;
        }
        self.accepted.insert(key, (msg.sender, msg.entities));
        AcceptOutcome::Accepted
    }

    /// Number of distinct partitions with an accepted delta for `frame`.
    pub fn received_count(&self, frame: u32, total_partitions: u32) -> u32 {
        (0..total_partitions).filter(|p| self.accepted.contains_key(&(frame, *p))).count() as u32
    }

    /// Distinct senders with at least one accepted delta for `frame`.
    pub fn trusted_senders(&self, frame: u32, total_partitions: u32) -> Vec<PeerId> {
        let mut senders: Vec<PeerId> = (0..total_partitions)
            .filter_map(|p| self.accepted.get(&(frame, p)).map(|(sender, _)| sender.clone()))
            .collect();
        senders.sort();
        senders.dedup();
        senders
    }

    /// All accepted `(partition, entities)` pairs for `frame`, sorted by
    /// partition id for deterministic merge order.
    pub fn collected(&self, frame: u32, total_partitions: u32) -> Vec<(u32, &[u8])> {
        let mut out: Vec<(u32, &[u8])> = (0..total_partitions)
            .filter_map(|p| self.accepted.get(&(frame, p)).map(|(_, data)| (p, data.as_slice())))
            .collect();
        out.sort_by_key(|(p, _)| *p);
        out
    }

    /// Classify completeness of `frame`'s delivery.
    pub fn degradation_tier(
        &self,
        frame: u32,
        total_partitions: u32,
        trusted_senders: u32,
        total_senders: u32,
    ) -> DegradationTier {
        let received = self.received_count(frame, total_partitions);
        partition::degradation_tier(total_partitions, received, trusted_senders, total_senders)
    }

    /// Drop buffered deltas for frames strictly before `frame`.
    pub fn evict_before(&mut self, frame: u32) {
        self.accepted.retain(|(f, _), _| *f >= frame);
    }

    pub fn reset(&mut self) {
        self.accepted.clear();
    }
}

/// Reliability adjustment applied by the engine: `+1` (capped at 100) on
/// timely delivery, `-5` (floored at 0) on a missing delivery at the
/// delta deadline.
pub const RELIABILITY_BONUS_ON_DELIVERY: i16 = 1;
pub const RELIABILITY_PENALTY_ON_TIMEOUT: i16 = -5;

#[cfg(test)]
mod tests {
    use super::*;

    fn single_sender_assignment(partition: u32, sender: &PeerId) -> PartitionAssignment {
        let mut a = PartitionAssignment { num_partitions: partition + 1, senders: FxHashMap::default() };
        a.senders.insert(partition, vec![sender.clone()]);
        a
    }

    #[test]
    fn first_assigned_sender_wins_others_discarded() {
        let mut dist = DeltaDistributor::new();
        let a = PeerId::new("a");
        let b = PeerId::new("b");
        let mut assignment = single_sender_assignment(0, &a);
        assignment.senders.insert(0, vec![a.clone(), b.clone()]);

        let first = dist.receive(
            DeltaMessage { frame: 1, partition: 0, sender: a.clone(), entities: vec![1] },
            &assignment,
        );
        let second = dist.receive(
            DeltaMessage { frame: 1, partition: 0, sender: b.clone(), entities: vec![2] },
            &assignment,
        );
        assert_eq!(first, AcceptOutcome::Accepted);
        assert_eq!(second, AcceptOutcome::Discarded);
        assert_eq!(dist.collected(1, 1), vec![(0, [1].as_slice())]);
    }

    #[test]
    fn untrusted_sender_rejected() {
        let mut dist = DeltaDistributor::new();
        let trusted = PeerId::new("trusted");
        let stranger = PeerId::new("stranger");
        let assignment = single_sender_assignment(0, &trusted);
        let outcome = dist.receive(
            DeltaMessage { frame: 1, partition: 0, sender: stranger, entities: vec![] },
            &assignment,
        );
        assert_eq!(outcome, AcceptOutcome::UntrustedSender);
    }

    #[test]
    fn degradation_tier_reflects_received_count() {
        let mut dist = DeltaDistributor::new();
        let sender = PeerId::new("a");
        for p in 0..8u32 {
            let assignment = single_sender_assignment(p, &sender);
            dist.receive(
                DeltaMessage { frame: 1, partition: p, sender: sender.clone(), entities: vec![] },
                &assignment,
            );
        }
        let tier = dist.degradation_tier(1, 10, 8, 20);
        assert_eq!(tier, DegradationTier::Degraded);
    }

    #[test]
    fn evict_before_drops_only_older_frames() {
        let mut dist = DeltaDistributor::new();
        let sender = PeerId::new("a");
        let assignment = single_sender_assignment(0, &sender);
        dist.receive(DeltaMessage { frame: 1, partition: 0, sender: sender.clone(), entities: vec![] }, &assignment);
        dist.receive(DeltaMessage { frame: 10, partition: 0, sender: sender.clone(), entities: vec![] }, &assignment);
        dist.evict_before(5);
        assert_eq!(dist.received_count(1, 1), 0);
        assert_eq!(dist.received_count(10, 1), 1);
    }
}
