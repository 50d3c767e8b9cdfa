//! Persistent chain state for the sable Bitcoin node.
//!
//! This crate owns the on-disk block index: chain entries (headers with
//! height and accumulated work), raw blocks, the per-transaction UTXO
//! ("coins") records, per-block undo data, and the main-chain pointers that
//! make exactly one branch the canonical one. The block-connection state
//! machine itself lives in `sable-consensus`; this crate only stores,
//! caches, and atomically mutates.

mod chain_db;
mod config;
mod entry;
mod error;

pub mod util;

pub use chain_db::{ChainDb, DATABASE_VERSION};
pub use config::Config;
pub use entry::ChainEntry;
pub use error::StateError;

use sable_chain::block;

/// A request to the state: identify a block by hash or by main-chain
/// height.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashOrHeight {
    Hash(block::Hash),
    Height(block::Height),
}

impl From<block::Hash> for HashOrHeight {
    fn from(hash: block::Hash) -> Self {
        HashOrHeight::Hash(hash)
    }
}

impl From<block::Height> for HashOrHeight {
    fn from(height: block::Height) -> Self {
        HashOrHeight::Height(height)
    }
}
