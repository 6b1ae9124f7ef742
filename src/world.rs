//! The `World` collaborator contract and the wire-message shapes the core
//! exchanges with its transport collaborator. Both are out-of-scope to
//! implement here (game logic and wire encoding are external per the
//! purpose statement) — this module only pins down the interface.

use crate::input_history::LifecycleKind;
use crate::peer::PeerId;

/// One input delivered to `World::tick`: either an opaque game payload or
/// a lifecycle event the world must also react to (e.g. spawning an
/// entity for a joining peer).
#[derive(Debug, Clone, PartialEq)]
pub enum TickInput {
    Game { client: PeerId, data: Vec<u8> },
    Lifecycle { client: PeerId, kind: LifecycleKind },
}

/// The opaque game-logic layer the synchronization core advances. Must be
/// deterministic: identical `(frame, inputs)` sequences from an identical
/// starting snapshot must produce an identical `state_hash()`.
pub trait World {
    /// Advance the world exactly one step. Called more than once for the
    /// same frame number during rollback resimulation — implementers must
    /// not assume monotonically increasing distinct frame numbers.
    fn tick(&mut self, frame: u32, inputs: &[TickInput]);

    /// Bit-exact serialization of current state plus its hash.
    fn snapshot(&self) -> (Vec<u8>, u32);

    /// Restore state from a previously produced snapshot.
    fn load_snapshot(&mut self, data: &[u8]);

    /// xxHash32 over the canonical entity ordering; must equal the hash
    /// returned by `snapshot()` at the same point in time.
    fn state_hash(&self) -> u32;

    fn entity_count(&self) -> u32;

    /// Entity ids currently live, in the canonical (sorted) ordering.
    /// `DeltaDistributor` needs this to carve the entity space into the
    /// `eid mod num_partitions` shards §4.9 assigns to senders; not part
    /// of the minimal five-method contract §6 names, but required for
    /// delta emission to be implementable at all.
    fn entity_ids(&self) -> Vec<u64>;

    /// Serialize the given entities (already sorted by id) into an opaque
    /// delta payload.
    fn serialize_entities(&self, ids: &[u64]) -> Vec<u8>;

    /// Merge a remote peer's delta for `partition_id` into this world's
    /// view of remote-authoritative state.
    fn merge_entities(&mut self, partition_id: u32, data: &[u8]);
}

/// Wire message kinds exchanged with the transport collaborator. Wire
/// encoding itself is transport-defined; the core only requires that
/// `frame: u32`, `hash: u32`, and `partition_id: u16` round-trip exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `server -> peer`: confirmed inputs for `frame`, plus an optional
    /// already-computed majority hash.
    Tick { frame: u32, inputs: Vec<(PeerId, Vec<u8>)>, majority_hash: Option<u32> },
    /// `peer <-> peer`: a state fingerprint for `frame`.
    Hash { frame: u32, hash: u32 },
    /// `peer <-> peer`: this sender's partition-assigned entity subset for
    /// `frame`.
    Delta { frame: u32, partition_id: u16, entities: Vec<u8> },
    /// `peer -> requester`: a fresh snapshot produced for a resync.
    Snapshot { frame: u32, hash: u32, data: Vec<u8> },
    Ping { t_send: i64 },
    Pong { t_send: i64, t_server: i64 },
    /// `frame` is the frame this lifecycle event takes effect at, same as
    /// any other input record's producer-assigned frame.
    Join { peer: PeerId, frame: u32 },
    Leave { peer: PeerId, frame: u32 },
    RequestResync { peer: PeerId },
}
