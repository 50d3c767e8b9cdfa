//! A deterministic regtest chain builder shared by the integration tests.

use std::convert::TryInto;
use std::iter::FromIterator;
use std::sync::Arc;

use chrono::Duration;

use sable_chain::{
    amount::COIN,
    block::{self, merkle, Block, Header},
    parameters::Network,
    transaction::{LockTime, Transaction},
    transparent::{
        self, CoinbaseData, OutPoint, Output, Script, Witness, SEQUENCE_FINAL,
    },
    work::difficulty::CompactDifficulty,
};
use sable_consensus::{script::AcceptAll, Chain};
use sable_state::{ChainDb, ChainEntry, Config};

/// The regtest proof-of-work limit: half of all hashes qualify, so
/// grinding takes a couple of nonces.
pub const REGTEST_BITS: CompactDifficulty = CompactDifficulty(0x207fffff);

/// An ephemeral regtest chain accepting all scripts.
pub fn regtest_chain() -> Chain {
    let db = Arc::new(ChainDb::open(&Config::ephemeral(), Network::Regtest).expect("open state"));
    Chain::new(db, Arc::new(AcceptAll))
}

/// A coinbase paying the full subsidy to an anyone-can-spend output.
///
/// `tag` lands in the coinbase data, so sibling chains mining the same
/// heights produce distinct transactions (and distinct blocks).
pub fn coinbase(height: block::Height, tag: u8) -> Transaction {
    let mut data = transparent::coinbase_height_data(height);
    data.push(tag);
    Transaction::new(
        1,
        vec![transparent::Input::Coinbase {
            height: Some(height),
            data: CoinbaseData::new(data),
            sequence: SEQUENCE_FINAL,
            witness: Witness::default(),
        }],
        vec![anyone_can_spend(50 * COIN)],
        LockTime::unlocked(),
    )
}

/// An `OP_TRUE` output.
pub fn anyone_can_spend(value: i64) -> Output {
    Output {
        value: value.try_into().expect("test value is in range"),
        lock_script: Script(vec![0x51]),
    }
}

/// A transaction spending `prevout` into one anyone-can-spend output.
///
/// Spending less than the input value leaves the difference as a fee.
pub fn spend(prevout: OutPoint, value: i64) -> Transaction {
    Transaction::new(
        1,
        vec![transparent::Input::PrevOut {
            outpoint: prevout,
            unlock_script: Script(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness::default(),
        }],
        vec![anyone_can_spend(value)],
        LockTime::unlocked(),
    )
}

/// The outpoint of a block's coinbase output.
pub fn coinbase_outpoint(block: &Block) -> OutPoint {
    OutPoint {
        hash: block.transactions[0].hash(),
        index: 0,
    }
}

/// Build (and grind) a block on `parent`, returning it with its entry.
///
/// The entry is computed locally so callers can extend chains the database
/// has never seen.
pub fn make_block(
    parent: &ChainEntry,
    transactions: Vec<Transaction>,
    tag: u8,
) -> (Arc<Block>, ChainEntry) {
    let height = block::Height(parent.height.0 + 1);
    let time = parent.header.time + Duration::seconds(10 * 60);

    let mut all: Vec<Arc<Transaction>> = Vec::with_capacity(transactions.len() + 1);
    all.push(Arc::new(coinbase(height, tag)));
    all.extend(transactions.into_iter().map(Arc::new));
    let merkle_root = merkle::Root::from_iter(all.iter().map(|tx| tx.hash()));

    let target = REGTEST_BITS.to_expanded().expect("regtest bits expand");
    let mut nonce = 0u32;
    loop {
        let header = Header::new(
            4,
            parent.hash,
            merkle_root,
            time,
            REGTEST_BITS,
            nonce,
        );
        if header.hash() <= target {
            let block = Arc::new(Block {
                header,
                transactions: all,
            });
            let entry = ChainEntry::from_header(&header, Some(parent))
                .expect("regtest difficulty is valid");
            return (block, entry);
        }
        nonce = nonce.checked_add(1).expect("a qualifying nonce exists");
    }
}

/// Mine and return `count` blocks on `parent` without adding them to any
/// chain.
pub fn make_chain(
    parent: &ChainEntry,
    count: usize,
    tag: u8,
) -> (Vec<Arc<Block>>, Vec<ChainEntry>) {
    let mut blocks = Vec::with_capacity(count);
    let mut entries = Vec::with_capacity(count);
    let mut cursor = parent.clone();
    for _ in 0..count {
        let (block, entry) = make_block(&cursor, Vec::new(), tag);
        blocks.push(block);
        cursor = entry.clone();
        entries.push(entry);
    }
    (blocks, entries)
}
