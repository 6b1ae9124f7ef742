//! Distributed state-hash consensus.
//!
//! Peers broadcast a per-frame state fingerprint; once enough have
//! reported (or the `ack_window` deadline passes) the arbiter picks the
//! hash held by a strict majority and flags any peer whose local hash
//! disagrees as desynced.

use crate::peer::PeerId;
use rustc_hash::FxHashMap;

/// Outcome of arbitrating one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A strict majority agreed on `hash`; `matched` says whether the
    /// local hash was among them.
    Majority { hash: u32, matched: bool },
    /// No hash cleared the strict-majority bar — diagnostic only, per the
    /// §9 open-question resolution this never proactively triggers resync.
    NoMajority,
}

/// Externally reported sync tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStats {
    pub sync_percent: f64,
    pub passed: u32,
    pub failed: u32,
    pub is_desynced: bool,
    pub resync_pending: bool,
}

#[derive(Debug)]
pub struct StateHashArbiter {
    hash_window: u32,
    ack_window: u32,
    reports: FxHashMap<u32, FxHashMap<PeerId, u32>>,
    passed: u32,
    failed: u32,
    desynced: bool,
    resync_pending: bool,
    desync_frame: Option<u32>,
    local_hash: Option<u32>,
    majority_hash: Option<u32>,
}

impl StateHashArbiter {
    pub fn new(hash_window: u32, ack_window: u32) -> Self {
        Self {
            hash_window,
            ack_window,
            reports: FxHashMap::default(),
            passed: 0,
            failed: 0,
            desynced: false,
            resync_pending: false,
            desync_frame: None,
            local_hash: None,
            majority_hash: None,
        }
    }

    /// Record a peer's reported hash for `frame`.
    pub fn record_hash(&mut self, frame: u32, peer: PeerId, hash: u32) {
        self.reports.entry(frame).or_default().insert(peer, hash);
    }

    /// Whether `frame` is ready to arbitrate: every active peer has
    /// reported, or the `ack_window` deadline has elapsed relative to
    /// `current_frame`.
    pub fn is_ready(&self, frame: u32, active_peer_count: usize, current_frame: u32) -> bool {
        let reported = self.reports.get(&frame).map_or(0, |m| m.len());
        reported >= active_peer_count || current_frame >= frame + self.ack_window
    }

    /// Arbitrate `frame` given the local peer's own hash for that frame.
    /// Consumes the frame's collected reports.
    pub fn arbitrate(&mut self, frame: u32, local_hash: u32) -> Outcome {
        let reports = self.reports.remove(&frame).unwrap_or_default();
        let total = reports.len();

        let mut counts: FxHashMap<u32, u32> = FxHashMap::default();
        for hash in reports.values() {
            *counts.entry(*hash).or_insert(0) += 1;
        }

        let best = counts
            .iter()
            .max_by(|(hash_a, count_a), (hash_b, count_b)| {
                count_a.cmp(count_b).then(hash_b.cmp(hash_a))
            })
            .map(|(hash, count)| (*hash, *count));

        let majority = best.filter(|(_, count)| (*count as usize) * 2 > total);

        self.local_hash = Some(local_hash);

        match majority {
            Some((hash, _)) => {
                self.majority_hash = Some(hash);
                let matched = hash == local_hash;
                if matched {
                    self.passed += 1;
                    self.desynced = false;
                } else {
                    self.failed += 1;
                    self.desynced = true;
                    self.resync_pending = true;
                    self.desync_frame = Some(frame);
                }
                Outcome::Majority { hash, matched }
            }
            None => Outcome::NoMajority,
        }
    }

    pub fn stats(&self) -> SyncStats {
        let denom = self.passed + self.failed;
        let sync_percent = if denom == 0 { 0.0 } else { (self.passed as f64 / denom as f64) * 100.0 };
        SyncStats {
            sync_percent,
            passed: self.passed,
            failed: self.failed,
            is_desynced: self.desynced,
            resync_pending: self.resync_pending,
        }
    }

    pub fn desync_frame(&self) -> Option<u32> {
        self.desync_frame
    }

    /// Called once a resync snapshot has been applied.
    pub fn clear_desync(&mut self) {
        self.desynced = false;
        self.resync_pending = false;
        self.desync_frame = None;
    }

    /// Drop report state older than `frame - hash_window`.
    pub fn evict_before(&mut self, frame: u32) {
        let floor = frame.saturating_sub(self.hash_window);
        self.reports.retain(|&f, _| f >= floor);
    }

    pub fn reset(&mut self) {
        self.reports.clear();
        self.passed = 0;
        self.failed = 0;
        self.desynced = false;
        self.resync_pending = false;
        self.desync_frame = None;
        self.local_hash = None;
        self.majority_hash = None;
    }
}
