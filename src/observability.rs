//! Observability collaborator.
//!
//! The core never logs to stdout in production paths (§7): structured
//! events are handed to an explicit `ObservabilitySink` rather than a
//! process-global logger, so a host can route them to its own telemetry
//! stack, and tests can assert on them without scraping captured output.

use crate::peer::PeerId;

/// A structured event the engine reports to its observability collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A rollback was executed, reverting from `from` down to `to`.
    Rollback { from: u32, to: u32, frames_resimulated: u32 },
    /// `StateHashArbiter` could not find a strict-majority hash for `frame`.
    NoMajorityHash { frame: u32 },
    /// Local hash diverged from the majority hash at `frame`.
    Desync { frame: u32, local_hash: u32, majority_hash: u32 },
    /// A resync snapshot was requested from the authority.
    ResyncRequested { frame: u32 },
    /// A resync snapshot was received and applied.
    ResyncCompleted { frame: u32 },
    /// Rollback could not proceed because the target snapshot was evicted.
    MissingSnapshot { frame: u32 },
    /// Delta delivery for `frame` fell below `NORMAL` completeness.
    DegradedDelta { frame: u32, tier: crate::partition::DegradationTier },
    /// A peer was observed joining the active set.
    PeerJoined { peer: PeerId, frame: u32 },
    /// A peer was observed leaving the active set.
    PeerLeft { peer: PeerId, frame: u32 },
}

/// Explicit collaborator for structured events. The default implementation
/// forwards to `tracing`; a host may swap in its own sink (metrics
/// exporter, debug overlay, test recorder) by implementing this trait and
/// handing it to `SyncEngine::new`.
pub trait ObservabilitySink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Default sink: forwards every event to `tracing` at a severity matching
/// how alarming the event is.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn emit(&self, event: Event) {
        match event {
            Event::Rollback { from, to, frames_resimulated } => {
                tracing::debug!(from, to, frames_resimulated, "rollback");
            }
            Event::NoMajorityHash { frame } => {
                tracing::warn!(frame, "no majority hash reached");
            }
            Event::Desync { frame, local_hash, majority_hash } => {
                tracing::warn!(frame, local_hash, majority_hash, "desync detected");
            }
            Event::ResyncRequested { frame } => {
                tracing::info!(frame, "resync requested");
            }
            Event::ResyncCompleted { frame } => {
                tracing::info!(frame, "resync completed");
            }
            Event::MissingSnapshot { frame } => {
                tracing::error!(frame, "rollback target snapshot missing, rollback aborted");
            }
            Event::DegradedDelta { frame, tier } => {
                tracing::debug!(frame, ?tier, "delta degradation tier");
            }
            Event::PeerJoined { peer, frame } => {
                tracing::info!(peer = %peer, frame, "peer joined");
            }
            Event::PeerLeft { peer, frame } => {
                tracing::info!(peer = %peer, frame, "peer left");
            }
        }
    }
}

/// A sink that drops every event. Useful for benches and unit tests that
/// don't care about observability traffic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn emit(&self, _event: Event) {}
}
