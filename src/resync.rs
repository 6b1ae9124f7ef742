//! Resync coordination: the requester half (a desynced peer pulling a
//! fresh snapshot) and the authority half (producing that snapshot).
//!
//! This module only tracks the state machine; it has no access to the
//! `World` or snapshot ring, since both the requester's "apply the
//! snapshot" step and the authority's "produce a fresh snapshot after the
//! next tick" step need collaborators owned by `SyncEngine`. Keeping the
//! latch here (rather than inline in the engine) mirrors the teacher's
//! pattern of a small dedicated bookkeeping type for a pending,
//! single-target operation.

use crate::peer::PeerId;

const MAX_RESYNC_ATTEMPTS: u32 = 3;

/// Requester-side resync state for the local peer.
#[derive(Debug, Default)]
pub struct ResyncRequester {
    pending: bool,
    attempts: u32,
}

impl ResyncRequester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when `StateHashArbiter` flags a local desync. Returns `true`
    /// if a new `resync_request` lifecycle input should be sent (i.e. one
    /// isn't already in flight).
    pub fn begin_request(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        self.attempts += 1;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The request has gone unanswered past its timeout. Returns `true` if
    /// another attempt should be sent, `false` once `MAX_RESYNC_ATTEMPTS`
    /// is exhausted (caller should surface `Error::ResyncTimeout`).
    pub fn on_timeout(&mut self) -> bool {
        if self.attempts >= MAX_RESYNC_ATTEMPTS {
            return false;
        }
        self.pending = false;
        self.begin_request()
    }

    /// A snapshot was received and applied; clear all pending state.
    pub fn complete(&mut self) {
        self.pending = false;
        self.attempts = 0;
    }

    pub fn reset(&mut self) {
        self.pending = false;
        self.attempts = 0;
    }
}

/// Authority-side latch: tracks at most one pending snapshot upload per
/// requesting peer. A second `resync_request` from the same peer before
/// the first is served simply refreshes the target (no queueing — the
/// next post-tick snapshot satisfies any outstanding requester).
#[derive(Debug, Default)]
pub struct ResyncAuthority {
    pending_targets: Vec<PeerId>,
}

impl ResyncAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed a `resync_request` input from `peer`.
    pub fn observe_request(&mut self, peer: PeerId) {
        if !self.pending_targets.contains(&peer) {
            self.pending_targets.push(peer);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_targets.is_empty()
    }

    /// Drain all pending targets. Called by the engine right after a
    /// `world.tick` completes, so the snapshot it produces next is fresh.
    pub fn take_pending(&mut self) -> Vec<PeerId> {
        std::mem::take(&mut self.pending_targets)
    }

    pub fn reset(&mut self) {
        self.pending_targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_request_is_idempotent_while_pending() {
        let mut r = ResyncRequester::new();
        assert!(r.begin_request());
        assert!(!r.begin_request());
        assert_eq!(r.attempts(), 1);
    }

    #[test]
    fn complete_clears_state() {
        let mut r = ResyncRequester::new();
        r.begin_request();
        r.complete();
        assert!(!r.is_pending());
        assert_eq!(r.attempts(), 0);
    }

    #[test]
    fn on_timeout_stops_after_max_attempts() {
        let mut r = ResyncRequester::new();
        assert!(r.begin_request());
        assert!(r.on_timeout());
        assert!(r.on_timeout());
        assert!(!r.on_timeout());
    }

    #[test]
    fn authority_latch_dedupes_and_drains() {
        let mut a = ResyncAuthority::new();
        let p = PeerId::new("p");
        a.observe_request(p.clone());
        a.observe_request(p.clone());
        assert!(a.has_pending());
        let drained = a.take_pending();
        assert_eq!(drained, vec![p]);
        assert!(!a.has_pending());
    }
}
