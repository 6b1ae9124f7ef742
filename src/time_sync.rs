//! Ping-sample clock estimation and tick-rate adaptation.
//!
//! Per §9's fixed-point contract, the tick-rate multiplier is tracked as a
//! 16.16 fixed-point integer (`FP_ONE` = 1.0) rather than a float, so its
//! evolution is bit-exact across peers and platforms.

use std::collections::VecDeque;

/// 16.16 fixed-point scale: `FP_ONE` represents a multiplier of 1.0.
pub const FP_ONE: i64 = 1 << 16;

const MAX_SAMPLES: usize = 16;
const MIN_SAMPLES_FOR_SYNC: usize = 4;
const TARGET_PREDICTION_DEPTH: u32 = 4;
const MULTIPLIER_STEP: i64 = FP_ONE * 5 / 1000; // 0.005
const MULTIPLIER_MIN: i64 = FP_ONE * 90 / 100; // 0.90
const MULTIPLIER_MAX: i64 = FP_ONE * 110 / 100; // 1.10

/// One ping round-trip observation.
#[derive(Debug, Clone, Copy)]
struct Sample {
    clock_delta: i64,
    latency: i64,
}

/// Estimates clock offset and round-trip latency from ping/pong timestamps,
/// and derives a tick-rate multiplier that keeps prediction depth bounded.
#[derive(Debug)]
pub struct TimeSyncManager {
    samples: VecDeque<Sample>,
    tick_rate_multiplier_fp: i64,
}

impl Default for TimeSyncManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSyncManager {
    pub fn new() -> Self {
        Self { samples: VecDeque::with_capacity(MAX_SAMPLES), tick_rate_multiplier_fp: FP_ONE }
    }

    /// Record a ping round-trip. All timestamps share the same monotonic
    /// clock unit (e.g. milliseconds); `t_server` is the remote's clock at
    /// receipt.
    pub fn on_pong(&mut self, t_send: i64, t_server: i64, t_recv: i64) {
        let rtt = t_recv - t_send;
        let one_way = rtt / 2;
        let clock_delta = t_server - (t_send + one_way);
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { clock_delta, latency: one_way });
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_synced(&self) -> bool {
        self.samples.len() >= MIN_SAMPLES_FOR_SYNC
    }

    pub fn clock_delta(&self) -> i64 {
        median(self.samples.iter().map(|s| s.clock_delta))
    }

    pub fn estimated_latency(&self) -> i64 {
        median(self.samples.iter().map(|s| s.latency))
    }

    pub fn tick_rate_multiplier(&self) -> i64 {
        self.tick_rate_multiplier_fp
    }

    /// Nudge the multiplier toward keeping `observed_depth` near
    /// `TARGET_PREDICTION_DEPTH`: speed up (multiplier > 1.0) when running
    /// too far ahead, slow down when running behind, by at most
    /// `MULTIPLIER_STEP` per call, clamped to `[0.90, 1.10]`.
    pub fn adjust_for_depth(&mut self, observed_depth: u32) {
        let next = if observed_depth > TARGET_PREDICTION_DEPTH {
            self.tick_rate_multiplier_fp + MULTIPLIER_STEP
        } else if observed_depth < TARGET_PREDICTION_DEPTH {
            self.tick_rate_multiplier_fp - MULTIPLIER_STEP
        } else {
            self.tick_rate_multiplier_fp
        };
        self.tick_rate_multiplier_fp = next.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.tick_rate_multiplier_fp = FP_ONE;
    }
}

/// Integer median of an iterator; even-length inputs average the two
/// middle elements via truncating integer division.
fn median(values: impl Iterator<Item = i64>) -> i64 {
    let mut v: Vec<i64> = values.collect();
    if v.is_empty() {
        return 0;
    }
    v.sort_unstable();
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2
    }
}
