//! Error types shared across the crate.

use std::io;

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, LofError>;

/// Errors surfaced by the LOF tables and engines.
#[derive(Debug, Error)]
pub enum LofError {
    /// An external collaborator failed with an I/O fault.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The database holds fewer objects than the insertion requires.
    #[error("insufficient data: {have} other objects present, {need} required")]
    InsufficientData {
        /// Number of other objects present at insertion time.
        have: usize,
        /// Number of other objects required (`min_pts`).
        need: usize,
    },
    /// A distance or neighborhood query against an external collaborator
    /// failed. Table state is undefined afterwards; rebuild via the batch
    /// engine.
    #[error("distance query failed: {0}")]
    DistanceQuery(String),
    /// A record expected to exist was not found. Always indicates a
    /// bookkeeping bug in the cascade, never a recoverable condition.
    #[error("record {0} not found")]
    MissingKey(u64),
    /// A configuration value was rejected before any data was processed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
