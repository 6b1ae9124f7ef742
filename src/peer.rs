//! Peer identity and the active peer set.
//!
//! `PeerId` is string-backed so its `Ord` is the canonical sort order used
//! by partition assignment and reliability tables. A separate
//! `ClientHandle` interns peers to small integers for the `InputHistory`
//! hot path, where hashing a `String` on every lookup would be wasteful —
//! interning is purely a performance mapping and never changes sort order
//! or cross-peer comparisons, which always go through `PeerId` directly.

use rustc_hash::FxHashMap;
use std::fmt;

/// A peer's stable, canonical identity. Ordered lexicographically by its
/// string form, which is what partition assignment and any other
/// cross-peer-visible ordering must agree on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A small interned handle for a `PeerId`, used only on hot paths
/// (`InputHistory`'s per-tick per-peer maps) where the overhead of hashing
/// a `String` on every access would matter. Never used for anything
/// order-sensitive — always compare peers by `PeerId`, never by the
/// numeric value of a `ClientHandle`, since interning order is
/// per-process and not guaranteed to agree across peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(u32);

/// Maps `PeerId`s to `ClientHandle`s for the local process. Interning is
/// monotonic and never reused, even if a peer leaves and rejoins.
#[derive(Debug, Default)]
pub struct PeerInterner {
    forward: FxHashMap<PeerId, ClientHandle>,
    backward: Vec<PeerId>,
}

impl PeerInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing handle for `peer`, interning a new one if this
    /// is the first time it's been seen.
    pub fn intern(&mut self, peer: &PeerId) -> ClientHandle {
        if let Some(handle) = self.forward.get(peer) {
            return *handle;
        }
        let handle = ClientHandle(self.backward.len() as u32);
        self.backward.push(peer.clone());
        self.forward.insert(peer.clone(), handle);
        handle
    }

    pub fn resolve(&self, handle: ClientHandle) -> Option<&PeerId> {
        self.backward.get(handle.0 as usize)
    }

    pub fn get(&self, peer: &PeerId) -> Option<ClientHandle> {
        self.forward.get(peer).copied()
    }
}

/// Per-peer bookkeeping tracked by the active set: reliability score used
/// by partition weighting, and the last frame this peer was heard from.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    pub peer: PeerId,
    /// Reliability score in `[0, 100]`, adjusted by `DeltaDistributor` on
    /// ack/timeout (+1 on ack, -5 on timeout, clamped). Starts at 50.
    pub reliability: u8,
    pub last_seen_frame: u32,
    pub active: bool,
}

impl PeerRecord {
    pub fn new(peer: PeerId, joined_frame: u32) -> Self {
        Self {
            peer,
            reliability: 50,
            last_seen_frame: joined_frame,
            active: true,
        }
    }

    pub fn bump_reliability(&mut self, delta: i16) {
        let next = (self.reliability as i16 + delta).clamp(0, 100);
        self.reliability = next as u8;
    }
}

/// The set of peers currently participating in the simulation, ordered by
/// `PeerId` wherever iteration order matters (partition assignment,
/// deterministic hashing inputs).
#[derive(Debug, Default)]
pub struct ActivePeerSet {
    records: FxHashMap<PeerId, PeerRecord>,
}

impl ActivePeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, peer: PeerId, frame: u32) {
        self.records
            .entry(peer.clone())
            .and_modify(|r| {
                r.active = true;
                r.last_seen_frame = frame;
            })
            .or_insert_with(|| PeerRecord::new(peer, frame));
    }

    pub fn leave(&mut self, peer: &PeerId, frame: u32) {
        if let Some(r) = self.records.get_mut(peer) {
            r.active = false;
            r.last_seen_frame = frame;
        }
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerRecord> {
        self.records.get(peer)
    }

    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut PeerRecord> {
        self.records.get_mut(peer)
    }

    /// Active peers in canonical (`PeerId`) order.
    pub fn active_sorted(&self) -> Vec<&PeerRecord> {
        let mut v: Vec<&PeerRecord> = self.records.values().filter(|r| r.active).collect();
        v.sort_by(|a, b| a.peer.cmp(&b.peer));
        v
    }

    pub fn len_active(&self) -> usize {
        self.records.values().filter(|r| r.active).count()
    }
}
