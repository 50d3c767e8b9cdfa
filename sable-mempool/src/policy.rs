//! Mempool policy constants.

use sable_chain::amount::COIN;

/// Default upper bound on the pool's estimated memory usage, in bytes.
pub const MAX_MEMPOOL_SIZE: u64 = 100 * 1_000_000;

/// Entries older than this (in seconds) are the first eviction victims.
pub const MEMPOOL_EXPIRY: i64 = 72 * 60 * 60;

/// Cap on parked orphan transactions.
pub const MAX_ORPHAN_TX: usize = 100;

/// The minimum relay fee rate, in satoshis per 1000 virtual bytes.
pub const MIN_RELAY_FEE: i64 = 1_000;

/// Half-life of the rolling minimum fee rate, in seconds.
pub const FEE_HALFLIFE: i64 = 60 * 60 * 12;

/// The priority at which a low-fee transaction is still considered free:
/// one coin, one day old, in a 250-byte transaction.
pub const FREE_THRESHOLD: f64 = COIN as f64 * 144.0 / 250.0;

/// Maximum chain of in-pool ancestors.
pub const ANCESTOR_LIMIT: usize = 25;

/// Maximum witness-scaled signature-operation cost for one pool
/// transaction (one fifth of a block's budget).
pub const MAX_TX_SIGOPS_COST: u64 = 16_000;

/// Maximum weight of a standard transaction.
pub const MAX_STANDARD_TX_WEIGHT: u64 = 400_000;

/// A fee this many times the minimum relay fee is assumed to be a mistake.
pub const ABSURD_FEE_MULTIPLIER: i64 = 10_000;

/// Free-transaction rate limit, in kilobytes.
pub const LIMIT_FREE_RELAY: f64 = 15.0;

/// Outputs below this value (in satoshis) are dust under standard policy.
pub const DUST_THRESHOLD: i64 = 546;

/// Maximum serialized size of a standard input script.
pub const MAX_STANDARD_SCRIPTSIG_SIZE: usize = 1_650;
