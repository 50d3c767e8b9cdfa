//! Consensus check functions

use chrono::{DateTime, Utc};

use sable_chain::{
    block::{Block, Hash, Header, Height, MAX_BLOCK_WEIGHT},
    parameters::Network,
    transaction,
    work::difficulty::ExpandedDifficulty,
};

use crate::error::*;

/// Returns `Ok(())` if there is at least one transaction, exactly the first
/// transaction is a coinbase, and no later transaction has a coinbase input.
///
/// "The first (and only the first) transaction in a block is a coinbase
/// transaction, which collects and spends any miner subsidy and transaction
/// fees paid by transactions included in this block."
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition.into());
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound.into());
    }

    Ok(())
}

/// Returns `Ok(())` if `hash` passes:
///   - the target difficulty limit for `network` (PoWLimit), and
///   - the difficulty filter,
/// based on the fields in `header`.
///
/// Note: the comparisons in this function are u256 integer comparisons;
/// greater values represent *less* work.
pub fn difficulty_is_valid(header: &Header, network: Network, hash: &Hash) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*hash))?;

    // The PoWLimit check doesn't depend on any previous blocks: no encoded
    // target may exceed it.
    if difficulty_threshold > ExpandedDifficulty::target_difficulty_limit(network) {
        return Err(BlockError::TargetDifficultyLimit(*hash));
    }

    // The difficulty filter is also context-free.
    if hash > &difficulty_threshold {
        return Err(BlockError::DifficultyFilter(*hash));
    }

    Ok(())
}

/// Returns `Ok(())` if `header.time` is less than or equal to 2 hours in
/// the future, according to the node's local clock (`now`).
///
/// This is a non-deterministic rule, as clocks vary over time, and between
/// different nodes. A block that is rejected by this rule at a given point
/// in time may later be accepted.
pub fn time_is_valid_at(
    header: &Header,
    now: DateTime<Utc>,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    Ok(header.time_is_valid_at(now, height, hash)?)
}

/// Check Merkle root validity.
///
/// `transaction_hashes` is a precomputed list of transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // The transaction Merkle tree is malleable: blocks with duplicate
    // transactions can have the same root as blocks without them
    // (CVE-2012-2459). Duplicate transactions imply a double-spend, so as
    // defense-in-depth we reject blocks with duplicate transaction hashes.
    use std::collections::HashSet;
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

/// Returns `Ok(())` if the block's BIP141 weight is within the limit.
pub fn weight_is_valid(block: &Block) -> Result<(), BlockError> {
    if block.weight() > MAX_BLOCK_WEIGHT {
        return Err(BlockError::ExcessiveWeight);
    }
    Ok(())
}
