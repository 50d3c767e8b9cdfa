//! Consensus verification for the sable Bitcoin node.
//!
//! This crate owns the block-connection state machine (`Chain`): contextual
//! header checks, full transaction verification against the UTXO view,
//! difficulty retargeting, BIP9 deployment tracking, and the
//! connect/disconnect/reorganize transitions over the persistent state in
//! `sable-state`. Script execution itself is consumed as a black-box
//! predicate behind the `script::Verifier` trait.

pub mod block;
pub mod chain;
pub mod deployments;
pub mod difficulty;
pub mod error;
pub mod script;
pub mod transaction;

pub use chain::{BlockAdded, Chain, ChainEvent};
pub use error::{BlockError, TransactionError};
pub use script::{VerifyFlags, Verifier};
