//! Mempool scenarios against a mined regtest chain.

mod common;

use std::sync::Arc;

use common::*;

use sable_chain::{amount::COIN, block::Block, transaction::Transaction, transparent::OutPoint};
use sable_consensus::{script::AcceptAll, Chain};
use sable_mempool::{Mempool, MempoolConfig, MempoolError, MempoolEvent, TxAdded};

/// A fixed receive time for deterministic admission.
const NOW: i64 = 1_300_000_000;

/// A chain with five spendable coinbases, and a pool attached to its
/// state.
fn setup() -> (Chain, Mempool, Vec<Arc<Block>>) {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();
    let (blocks, _) = make_chain(&genesis, 5, 0);
    for block in blocks.iter() {
        chain.add(block.clone()).unwrap();
    }
    let mempool = Mempool::new(chain.db().clone(), Arc::new(AcceptAll));
    (chain, mempool, blocks)
}

/// Spend the coinbase of `block`, leaving `fee` satoshis on the table.
fn coinbase_spend(block: &Block, fee: i64) -> Arc<Transaction> {
    Arc::new(spend(coinbase_outpoint(block), 50 * COIN - fee))
}

#[test]
fn admits_a_spend_of_a_confirmed_coinbase() {
    let (_chain, mut mempool, blocks) = setup();

    let tx = coinbase_spend(&blocks[0], 5_000);
    let hash = tx.hash();
    assert_eq!(mempool.add_tx(tx, NOW).unwrap(), TxAdded::Added(hash));

    assert!(mempool.has(&hash));
    assert_eq!(
        mempool.spender(&coinbase_outpoint(&blocks[0])),
        Some(&hash)
    );
    let entry = mempool.get(&hash).unwrap();
    assert_eq!(entry.fee, 5_000);
    assert!(!entry.dependencies);

    // Submitting the same transaction again is already known.
    let tx = coinbase_spend(&blocks[0], 5_000);
    assert!(matches!(
        mempool.add_tx(tx, NOW).unwrap_err(),
        MempoolError::AlreadyKnown
    ));
}

#[test]
fn rejects_a_double_spend() {
    let (_chain, mut mempool, blocks) = setup();

    let first = coinbase_spend(&blocks[0], 5_000);
    let second = coinbase_spend(&blocks[0], 6_000);
    assert_ne!(first.hash(), second.hash());

    mempool.add_tx(first.clone(), NOW).unwrap();
    assert!(matches!(
        mempool.add_tx(second.clone(), NOW).unwrap_err(),
        MempoolError::Duplicate
    ));

    assert!(mempool.has(&first.hash()));
    assert!(!mempool.has(&second.hash()));
}

#[test]
fn parks_an_orphan_until_its_parent_arrives() {
    let (_chain, mut mempool, blocks) = setup();

    // `parent` is not submitted yet; `child` spends its first output.
    let parent = coinbase_spend(&blocks[1], 5_000);
    let child = Arc::new(spend(
        OutPoint {
            hash: parent.hash(),
            index: 0,
        },
        50 * COIN - 5_000 - 2_000,
    ));

    assert_eq!(
        mempool.add_tx(child.clone(), NOW).unwrap(),
        TxAdded::Orphan(child.hash())
    );
    assert!(mempool.has_orphan(&child.hash()));
    assert!(!mempool.has(&child.hash()));

    // The parent arrives: both end up resident.
    assert_eq!(
        mempool.add_tx(parent.clone(), NOW).unwrap(),
        TxAdded::Added(parent.hash())
    );
    assert!(mempool.has(&parent.hash()));
    assert!(mempool.has(&child.hash()));
    assert!(!mempool.has_orphan(&child.hash()));

    // The child rides on an unconfirmed parent.
    assert!(mempool.get(&child.hash()).unwrap().dependencies);
    assert_eq!(mempool.get(&parent.hash()).unwrap().desc_count, 2);
}

#[test]
fn no_coinbase_admission() {
    let (_chain, mut mempool, _blocks) = setup();

    let tx = Arc::new(coinbase(sable_chain::block::Height(99), 0));
    assert!(matches!(
        mempool.add_tx(tx, NOW).unwrap_err(),
        MempoolError::Coinbase
    ));
}

#[test]
fn confirmation_removes_pool_entries() {
    let (mut chain, mut mempool, blocks) = setup();

    let tx = coinbase_spend(&blocks[0], 5_000);
    mempool.add_tx(tx.clone(), NOW).unwrap();

    let mut events = mempool.subscribe();

    let tip = chain.tip().unwrap();
    let (block, _) = make_block(&tip, vec![(*tx).clone()], 7);
    chain.add(block.clone()).unwrap();
    mempool.add_block(&block, NOW);

    assert!(!mempool.has(&tx.hash()));
    assert!(mempool.is_empty());

    // `Confirmed` precedes the matching `RemoveTx`.
    match events.try_recv().unwrap() {
        MempoolEvent::Confirmed { tx: confirmed, .. } => {
            assert_eq!(confirmed.hash(), tx.hash())
        }
        other => panic!("expected a confirmation event: {:?}", other),
    }
    assert!(matches!(
        events.try_recv().unwrap(),
        MempoolEvent::RemoveTx(_)
    ));
}

#[test]
fn confirmed_double_spends_evict_conflicts() {
    let (mut chain, mut mempool, blocks) = setup();

    // The pool holds one spend of the coinbase; the block confirms a
    // different one.
    let losing = coinbase_spend(&blocks[0], 5_000);
    let winning = coinbase_spend(&blocks[0], 6_000);
    mempool.add_tx(losing.clone(), NOW).unwrap();

    let mut events = mempool.subscribe();

    let tip = chain.tip().unwrap();
    let (block, _) = make_block(&tip, vec![(*winning).clone()], 9);
    chain.add(block.clone()).unwrap();
    mempool.add_block(&block, NOW);

    assert!(!mempool.has(&losing.hash()));
    assert!(mempool.is_empty());

    match events.try_recv().unwrap() {
        MempoolEvent::Conflict(conflicted) => assert_eq!(conflicted.hash(), losing.hash()),
        other => panic!("expected a conflict event: {:?}", other),
    }
}

#[test]
fn disconnected_transactions_return_to_the_pool() {
    let (mut chain, mut mempool, blocks) = setup();

    let tx = coinbase_spend(&blocks[0], 5_000);
    mempool.add_tx(tx.clone(), NOW).unwrap();

    let tip = chain.tip().unwrap();
    let (block, entry) = make_block(&tip, vec![(*tx).clone()], 11);
    chain.add(block.clone()).unwrap();
    mempool.add_block(&block, NOW);
    assert!(mempool.is_empty());

    // The chain disconnects the block; its transactions are re-ingested.
    chain.db().disconnect(&entry).unwrap();
    mempool.remove_block(&block, NOW + 1);

    assert!(mempool.has(&tx.hash()));
}

#[test]
fn pool_size_stays_bounded() {
    let (_chain, _, blocks) = setup();

    // A pool that only has room for two small spends.
    let db = _chain.db().clone();
    let mut config = MempoolConfig::for_network(sable_chain::parameters::Network::Regtest);
    config.max_size = 500;
    let mut mempool = Mempool::with_config(db, Arc::new(AcceptAll), config);

    let low = coinbase_spend(&blocks[0], 2_000);
    let mid = coinbase_spend(&blocks[1], 3_000);
    let high = coinbase_spend(&blocks[2], 4_000);

    for tx in [&low, &mid, &high].iter() {
        let _ = mempool.add_tx((*tx).clone(), NOW);
        assert!(mempool.size() <= 500, "size bound after every add");
    }

    // The cheapest entry was the eviction victim.
    assert!(!mempool.has(&low.hash()));
    assert!(mempool.has(&mid.hash()));
    assert!(mempool.has(&high.hash()));
}

#[test]
fn template_ordering_is_by_fee_rate() {
    let (_chain, mut mempool, blocks) = setup();

    let cheap = coinbase_spend(&blocks[0], 1_000);
    let pricey = coinbase_spend(&blocks[1], 9_000);
    mempool.add_tx(cheap.clone(), NOW).unwrap();
    mempool.add_tx(pricey.clone(), NOW).unwrap();

    let ordered = mempool.sorted_for_template();
    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered[0].hash(), pricey.hash());
    assert_eq!(ordered[1].hash(), cheap.hash());
}

#[test]
fn no_overlapping_spends_across_entries() {
    let (_chain, mut mempool, blocks) = setup();

    // Build a small pool, then check the double-spend invariant directly:
    // every entry's inputs appear in `spents` exactly once.
    let a = coinbase_spend(&blocks[0], 5_000);
    let b = coinbase_spend(&blocks[1], 5_000);
    let c = Arc::new(spend(
        OutPoint {
            hash: a.hash(),
            index: 0,
        },
        50 * COIN - 5_000 - 2_000,
    ));
    for tx in [&a, &b, &c].iter() {
        mempool.add_tx((*tx).clone(), NOW).unwrap();
    }

    let mut seen = std::collections::HashSet::new();
    for tx in [&a, &b, &c].iter() {
        for input in tx.inputs.iter() {
            let outpoint = input.outpoint().unwrap();
            assert!(seen.insert(outpoint), "outpoint spent twice: {:?}", outpoint);
            assert_eq!(mempool.spender(&outpoint), Some(&tx.hash()));
        }
    }
}
