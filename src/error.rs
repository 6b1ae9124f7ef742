//! Error types for the synchronization engine.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds the core can produce.
///
/// Per the error handling design: `TransientNetwork`, `StaleInput`,
/// `MissingSnapshot`, and `Desync` are recoverable and never surface past
/// `SyncEngine` — they are logged via `ObservabilitySink` and handled
/// internally. Only `ResyncTimeout` and `Fatal` are returned to callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transient network issue: {0}")]
    TransientNetwork(String),

    #[error("stale input for frame {frame} (confirmed up to {confirmed_frame})")]
    StaleInput { frame: u32, confirmed_frame: u32 },

    #[error("missing snapshot for rollback target frame {0}")]
    MissingSnapshot(u32),

    #[error("local state desynced at frame {frame}: local={local_hash:08x} majority={majority_hash:08x}")]
    Desync {
        frame: u32,
        local_hash: u32,
        majority_hash: u32,
    },

    #[error("resync request timed out after {attempts} attempt(s)")]
    ResyncTimeout { attempts: u32 },

    #[error("fatal world error: {0}")]
    Fatal(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid peer id: {0}")]
    InvalidPeer(String),
}
