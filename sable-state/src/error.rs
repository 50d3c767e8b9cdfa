use thiserror::Error;

use sable_chain::{block, SerializationError};

/// An error from the persistent state.
///
/// Store errors abort the current batch and leave the previously committed
/// state intact; they are escalated to the process-level handler rather
/// than retried.
#[derive(Error, Debug)]
pub enum StateError {
    /// An error from the underlying key/value store.
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    /// A record failed to serialize.
    #[error("io error while serializing: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record failed to parse.
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// The database was created by an incompatible version of this crate.
    #[error("database schema version {found} does not match supported version {expected}")]
    SchemaVersion { found: u32, expected: u32 },

    /// A record that must exist is missing.
    #[error("corrupt chain state: {0}")]
    Corrupt(&'static str),

    /// A block body was requested but has been pruned (or was never
    /// stored).
    #[error("block {0:?} is not in the store")]
    MissingBlock(block::Hash),
}
