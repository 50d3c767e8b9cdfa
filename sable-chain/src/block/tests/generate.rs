//! Deterministic block constructions for tests.

use std::convert::TryInto;
use std::iter::FromIterator;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::transaction::{LockTime, Transaction};
use crate::transparent::{self, CoinbaseData, Script, Witness};
use crate::work::difficulty::CompactDifficulty;

use super::super::{merkle, Block, Hash, Header, Height};

/// A trivially-gradeable difficulty for generated chains (the regtest PoW
/// limit).
pub const EASY_BITS: CompactDifficulty = CompactDifficulty(0x207fffff);

/// Build a coinbase transaction paying `value` satoshis to an anyone-can-
/// spend output.
pub fn coinbase_transaction(height: Height, value: i64) -> Transaction {
    Transaction::new(
        1,
        vec![transparent::Input::Coinbase {
            height: Some(height),
            data: CoinbaseData::new(transparent::coinbase_height_data(height)),
            sequence: transparent::SEQUENCE_FINAL,
            witness: Witness::default(),
        }],
        vec![transparent::Output {
            value: value.try_into().expect("test value is in range"),
            // OP_TRUE
            lock_script: Script(vec![0x51]),
        }],
        LockTime::unlocked(),
    )
}

/// Build a block on `previous_block_hash` and grind its nonce until the
/// hash meets `EASY_BITS`.
pub fn mine_block(
    previous_block_hash: Hash,
    height: Height,
    time: DateTime<Utc>,
    mut transactions: Vec<Arc<Transaction>>,
) -> Block {
    transactions.insert(0, Arc::new(coinbase_transaction(height, 50_0000_0000)));
    let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
    let target = EASY_BITS.to_expanded().expect("easy bits expand");

    let mut nonce = 0u32;
    loop {
        let header = Header::new(1, previous_block_hash, merkle_root, time, EASY_BITS, nonce);
        if header.hash() <= target {
            return Block {
                header,
                transactions,
            };
        }
        nonce += 1;
    }
}

/// Generate a deterministic header for serialization tests.
pub fn block_header() -> Header {
    Header::new(
        1,
        Hash([0x42; 32]),
        merkle::Root([0x99; 32]),
        Utc.timestamp(1_296_688_602, 0),
        EASY_BITS,
        7,
    )
}
