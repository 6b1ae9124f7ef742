//! Deterministic entity-partition assignment and delivery-degradation
//! classification.
//!
//! `assign` is a pure function: given the same `(entity_count, peers,
//! frame, reliability)` every honest peer computes the identical
//! `senders` mapping, which is what lets peers share delta-sending load
//! without a coordinator. All arithmetic is integer-only per the
//! fixed-point contract — no floating point anywhere in weighting,
//! ordering, or the RNG.

use crate::hash::hash_u32;
use crate::peer::PeerId;
use rustc_hash::FxHashMap;
use std::cmp::min;

/// Seed constant mixed into every partition's sampling seed so it's
/// distinguishable from other uses of `hash_u32` in the crate.
const PARTITION_SEED: u32 = 0x1234_5678;

/// `num_partitions = clamp(ceil(entity_count / 30), 1, max(1, 2 * peer_count))`.
/// Zero entities or zero peers collapses to a single partition.
pub fn num_partitions(entity_count: u32, peer_count: usize) -> u32 {
    if entity_count == 0 || peer_count == 0 {
        return 1;
    }
    let raw = entity_count.div_ceil(30);
    let upper = (2 * peer_count as u64).max(1);
    raw.clamp(1, upper as u32)
}

/// `eid mod n`.
pub fn entity_partition(eid: u64, n: u32) -> u32 {
    (eid % n as u64) as u32
}

/// A small xorshift32 PRNG, seeded per partition from the hash chain so
/// results are reproducible across peers without sharing any mutable
/// state.
struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    fn new(seed: u32) -> Self {
        // xorshift32 is undefined at state 0; fold in a fixed odd constant
        // so a zero seed still produces a valid stream.
        Self { state: if seed == 0 { 0x9E37_79B9 } else { seed } }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

/// `partition_id → ordered list of senders`, at most `senders_per_partition`
/// long, chosen by weighted sampling without replacement.
#[derive(Debug, Clone, Default)]
pub struct PartitionAssignment {
    pub num_partitions: u32,
    pub senders: FxHashMap<u32, Vec<PeerId>>,
}

impl PartitionAssignment {
    pub fn is_assigned(&self, peer: &PeerId, partition: u32) -> bool {
        self.senders
            .get(&partition)
            .is_some_and(|v| v.iter().any(|p| p == peer))
    }

    pub fn partitions_for<'a>(&'a self, peer: &'a PeerId) -> impl Iterator<Item = u32> + 'a {
        self.senders
            .iter()
            .filter(move |(_, v)| v.iter().any(|p| p == peer))
            .map(|(p, _)| *p)
    }
}

/// Compute the deterministic partition assignment for `frame`.
///
/// `peers` need not be pre-sorted; this function sorts its own working
/// copy, so callers in any order produce the identical result (the
/// reorder-invariance property in §8).
pub fn assign(
    entity_count: u32,
    peers: &[PeerId],
    frame: u32,
    reliability: impl Fn(&PeerId) -> u8,
    senders_per_partition: usize,
) -> PartitionAssignment {
    let mut sorted_peers: Vec<&PeerId> = peers.iter().collect();
    sorted_peers.sort();

    let n = num_partitions(entity_count, sorted_peers.len());
    let mut senders = FxHashMap::default();

    if sorted_peers.is_empty() {
        return PartitionAssignment { num_partitions: n, senders };
    }

    for p in 0..n {
        let seed = hash_u32(hash_u32(PARTITION_SEED, frame), p);
        let chosen = weighted_sample_without_replacement(
            &sorted_peers,
            &reliability,
            seed,
            min(senders_per_partition, sorted_peers.len()),
        );
        senders.insert(p, chosen);
    }

    PartitionAssignment { num_partitions: n, senders }
}

/// Weight of a peer: `(reliability.clamp(0,100) + 1) << 16` (16.16 fixed
/// point).
fn weight_fp(reliability: u8) -> u64 {
    ((reliability.min(100) as u64) + 1) << 16
}

fn weighted_sample_without_replacement(
    peers: &[&PeerId],
    reliability: &impl Fn(&PeerId) -> u8,
    seed: u32,
    count: usize,
) -> Vec<PeerId> {
    let mut remaining: Vec<(&PeerId, u64)> =
        peers.iter().map(|p| (*p, weight_fp(reliability(p)))).collect();
    let mut rng = Xorshift32::new(seed);
    let mut chosen = Vec::with_capacity(count);

    for _ in 0..count {
        if remaining.is_empty() {
            break;
        }
        let total_weight: u64 = remaining.iter().map(|(_, w)| *w).sum();
        let draw = (rng.next_u32() % (1u32 << 16)) as u64;
        // 64-bit intermediate: draw (16.16 fixed point in [0,1)) * total_weight.
        let target = (draw * total_weight) >> 16;

        let mut cumulative = 0u64;
        let mut pick = remaining.len() - 1;
        for (i, (_, w)) in remaining.iter().enumerate() {
            cumulative += w;
            if target < cumulative {
                pick = i;
                break;
            }
        }
        let (peer, _) = remaining.remove(pick);
        chosen.push(peer.clone());
    }

    chosen
}

/// Classifies how complete a frame's delta delivery was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationTier {
    Normal,
    Degraded,
    Minimal,
    Skip,
}

pub fn degradation_tier(
    total_partitions: u32,
    received_partitions: u32,
    trusted_senders: u32,
    total_senders: u32,
) -> DegradationTier {
    if total_partitions == 0 {
        return DegradationTier::Normal;
    }
    if received_partitions == total_partitions && trusted_senders == total_senders {
        return DegradationTier::Normal;
    }
    // Compare received*4 against total*3 to avoid floating-point 0.75.
    if received_partitions as u64 * 4 > total_partitions as u64 * 3 {
        return DegradationTier::Degraded;
    }
    if received_partitions as u64 * 4 > total_partitions as u64 {
        return DegradationTier::Minimal;
    }
    DegradationTier::Skip
}
