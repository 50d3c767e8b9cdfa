//! Consensus-critical data structures for the sable Bitcoin node.
//!
//! This crate contains the primitives shared by the chain database, the
//! block-connection state machine, and the mempool: blocks, transactions,
//! transparent inputs and outputs, the compressed UTXO ("coins")
//! representation, proof-of-work arithmetic, and the per-network consensus
//! parameter registry.

#[macro_use]
extern crate serde;

pub mod amount;
pub mod block;
pub mod cached;
pub mod coins;
pub mod compactint;
pub mod fmt;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use compactint::CompactInt;
pub use serialization::{
    BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError,
};
