//! SyncTick — a deterministic, peer-assisted networked simulation
//! runtime for real-time multiplayer games.
//!
//! Given identical inputs in identical order, every participating peer
//! computes bit-exact identical world state at every tick. The crate is
//! a library only: the game-logic layer, input plugin, rendering, and
//! wire transport are external collaborators (see [`world`]).

pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod hash;
pub mod input_history;
pub mod observability;
pub mod partition;
pub mod peer;
pub mod prediction;
pub mod resync;
pub mod snapshot_ring;
pub mod state_hash_arbiter;
pub mod time_sync;
pub mod world;

pub use config::SyncConfig;
pub use engine::{EngineStats, Inbound, SyncEngine};
pub use error::{Error, Result};
pub use observability::{Event, ObservabilitySink, TracingSink};
pub use peer::PeerId;
pub use world::{Message, TickInput, World};
