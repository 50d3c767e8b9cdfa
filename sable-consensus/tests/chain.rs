//! End-to-end chain scenarios on an ephemeral regtest state.

mod common;

use common::*;

use sable_chain::work::difficulty::CompactDifficulty;
use sable_consensus::{BlockAdded, BlockError, ChainEvent, TransactionError};

#[test]
fn mine_and_extend() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();
    assert_eq!(genesis.height.0, 0);

    let (block, entry) = make_block(&genesis, Vec::new(), 0);
    match chain.add(block.clone()).unwrap() {
        BlockAdded::Connected(connected) => assert_eq!(connected.hash, block.hash()),
        other => panic!("expected a connected block: {:?}", other),
    }

    let tip = chain.tip().unwrap();
    assert_eq!(tip.hash, block.hash());
    assert_eq!(tip.height.0, 1);
    assert_eq!(tip.chainwork, genesis.chainwork + entry.proof());

    // Re-adding the same block is ignored.
    assert!(matches!(
        chain.add(block.clone()).unwrap(),
        BlockAdded::Duplicate(_)
    ));
}

#[test]
fn competing_chains_first_seen_wins_on_tie() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    let (x_blocks, x_entries) = make_chain(&genesis, 10, 0xaa);
    let (y_blocks, y_entries) = make_chain(&genesis, 10, 0xbb);

    for block in x_blocks.iter() {
        assert!(matches!(
            chain.add(block.clone()).unwrap(),
            BlockAdded::Connected(_)
        ));
    }
    for block in y_blocks.iter() {
        assert!(matches!(
            chain.add(block.clone()).unwrap(),
            BlockAdded::SideChain(_)
        ));
    }

    // Equal work: the first-seen branch keeps the tip.
    let tip = chain.tip().unwrap();
    assert_eq!(tip.hash, x_entries[9].hash);
    assert_eq!(x_entries[9].chainwork, y_entries[9].chainwork);

    // Both tips remain retrievable, but only one is the main chain.
    let db = chain.db();
    assert!(db.entry(x_entries[9].hash.into()).unwrap().is_some());
    assert!(db.entry(y_entries[9].hash.into()).unwrap().is_some());
    assert!(db.is_main_chain(x_entries[9].hash).unwrap());
    assert!(!db.is_main_chain(y_entries[9].hash).unwrap());
}

#[test]
fn reorg_on_greater_work() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    let (x_blocks, x_entries) = make_chain(&genesis, 10, 0xaa);
    let (y_blocks, y_entries) = make_chain(&genesis, 10, 0xbb);
    for block in x_blocks.iter().chain(y_blocks.iter()) {
        chain.add(block.clone()).unwrap();
    }
    let old_tip = chain.tip().unwrap();

    let mut events = chain.subscribe();

    // One more block on the losing branch tips the scales.
    let (y10, _) = make_block(&y_entries[9], Vec::new(), 0xbb);
    match chain.add(y10.clone()).unwrap() {
        BlockAdded::Reorganized { old_tip: from, new_tip } => {
            assert_eq!(from.hash, old_tip.hash);
            assert_eq!(new_tip.hash, y10.hash());
        }
        other => panic!("expected a reorganization: {:?}", other),
    }

    let tip = chain.tip().unwrap();
    assert_eq!(tip.hash, y10.hash());
    assert_eq!(tip.height.0, 11);
    assert!(tip.chainwork > old_tip.chainwork);
    assert!(!chain.db().is_main_chain(old_tip.hash).unwrap());
    assert!(chain.db().is_main_chain(y_entries[0].hash).unwrap());

    // The next-hash pointers and the height index agree along the whole
    // new main chain.
    let db = chain.db();
    let genesis = db.entry(sable_chain::block::Height(0).into()).unwrap().unwrap();
    let mut cursor = genesis.hash;
    let mut height = 0u32;
    while let Some(next) = db.next_hash(cursor).unwrap() {
        height += 1;
        let by_height = db.entry(sable_chain::block::Height(height).into()).unwrap().unwrap();
        assert_eq!(by_height.hash, next);
        cursor = next;
    }
    assert_eq!(cursor, tip.hash);
    assert_eq!(height, 11);

    // Events arrive in disconnect → connect → reorganize order.
    let mut saw_disconnects = 0;
    let mut saw_connects = 0;
    let mut saw_reorg = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ChainEvent::Disconnect { .. } => {
                assert!(!saw_reorg);
                assert_eq!(saw_connects, 0, "disconnects precede connects");
                saw_disconnects += 1;
            }
            ChainEvent::Connect { .. } => {
                assert!(!saw_reorg);
                saw_connects += 1;
            }
            ChainEvent::Reorganize { old_tip: from, new_tip } => {
                assert_eq!(from.hash, old_tip.hash);
                assert_eq!(new_tip.hash, y10.hash());
                saw_reorg = true;
            }
            ChainEvent::Block { .. } => {}
        }
    }
    assert_eq!(saw_disconnects, 10);
    assert_eq!(saw_connects, 11);
    assert!(saw_reorg);
}

#[test]
fn block_spending_side_chain_coins_is_rejected() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    let (x_blocks, _) = make_chain(&genesis, 10, 0xaa);
    let (y_blocks, y_entries) = make_chain(&genesis, 10, 0xbb);
    for block in x_blocks.iter().chain(y_blocks.iter()) {
        chain.add(block.clone()).unwrap();
    }
    let (y10, y10_entry) = make_block(&y_entries[9], Vec::new(), 0xbb);
    chain.add(y10.clone()).unwrap();

    // X is now a side chain; its coinbases never entered the UTXO set.
    let stolen = spend(coinbase_outpoint(&x_blocks[0]), 10);
    let (bad_block, _) = make_block(&y10_entry, vec![stolen], 0xcc);
    let tip_before = chain.tip().unwrap();

    match chain.add(bad_block).unwrap_err() {
        BlockError::Transaction(TransactionError::InputsMissingOrSpent(_)) => {}
        other => panic!("expected a missing-input rejection: {:?}", other),
    }

    // No mutation of the tip or the stores.
    let tip_after = chain.tip().unwrap();
    assert_eq!(tip_before.hash, tip_after.hash);
}

#[test]
fn connect_then_disconnect_restores_the_utxo_set() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    // Three blocks; the third spends the first block's coinbase
    // (regtest coinbase maturity is zero).
    let (b1, e1) = make_block(&genesis, Vec::new(), 0);
    let (b2, e2) = make_block(&e1, Vec::new(), 0);
    let payment = spend(coinbase_outpoint(&b1), 49 * 100_000_000);
    let (b3, e3) = make_block(&e2, vec![payment.clone()], 0);

    for block in [&b1, &b2, &b3].iter() {
        chain.add((*block).clone()).unwrap();
    }

    let db = chain.db().clone();
    // The spend took effect.
    assert!(db.coins(&b1.transactions[0].hash()).unwrap().is_none());
    assert!(db.coins(&payment.hash()).unwrap().is_some());

    // Disconnect everything back to genesis.
    for entry in [&e3, &e2, &e1].iter() {
        db.disconnect(entry).unwrap();
    }

    assert_eq!(db.tip_hash(), genesis.hash);
    // The UTXO set is byte-identical to the post-genesis state: empty.
    for tx in b1
        .transactions
        .iter()
        .chain(b2.transactions.iter())
        .chain(b3.transactions.iter())
    {
        assert!(db.coins(&tx.hash()).unwrap().is_none(), "{:?}", tx.hash());
    }
}

#[test]
fn repeated_reorgs_are_idempotent() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    // Branch A carries a real payment; branch B is empty.
    let (a1, ae1) = make_block(&genesis, Vec::new(), 0xaa);
    let payment = spend(coinbase_outpoint(&a1), 20 * 100_000_000);
    let (a2, ae2) = make_block(&ae1, vec![payment.clone()], 0xaa);

    chain.add(a1.clone()).unwrap();
    chain.add(a2.clone()).unwrap();
    assert!(chain.db().coins(&payment.hash()).unwrap().is_some());

    // Reorganize away to B…
    let (b_blocks, _) = make_chain(&genesis, 3, 0xbb);
    for block in b_blocks.iter() {
        chain.add(block.clone()).unwrap();
    }
    assert_eq!(chain.tip().unwrap().height.0, 3);
    // …the payment's coins are gone…
    assert!(chain.db().coins(&payment.hash()).unwrap().is_none());
    assert!(chain
        .db()
        .coins(&a1.transactions[0].hash())
        .unwrap()
        .is_none());

    // …and reorganize back by extending A past B.
    let (a3, ae3) = make_block(&ae2, Vec::new(), 0xaa);
    let (a4, _) = make_block(&ae3, Vec::new(), 0xaa);
    chain.add(a3).unwrap();
    match chain.add(a4.clone()).unwrap() {
        BlockAdded::Reorganized { new_tip, .. } => assert_eq!(new_tip.hash, a4.hash()),
        other => panic!("expected a reorganization: {:?}", other),
    }

    // The A-branch state is exactly restored: same tip, same coins.
    assert_eq!(chain.tip().unwrap().hash, a4.hash());
    assert!(chain.db().coins(&payment.hash()).unwrap().is_some());
    assert!(chain
        .db()
        .coins(&a1.transactions[0].hash())
        .unwrap()
        .is_none());
    assert!(chain.db().is_main_chain(ae1.hash).unwrap());
}

#[test]
fn orphan_blocks_resolve_when_the_parent_arrives() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    let (b1, e1) = make_block(&genesis, Vec::new(), 0);
    let (b2, _) = make_block(&e1, Vec::new(), 0);

    // The child arrives first and parks.
    assert!(matches!(
        chain.add(b2.clone()).unwrap(),
        BlockAdded::Orphaned(waiting_on) if waiting_on == b1.hash()
    ));
    assert!(chain.has_orphan(b2.hash()));

    // The parent arrives; both connect.
    assert!(matches!(
        chain.add(b1.clone()).unwrap(),
        BlockAdded::Connected(_)
    ));
    assert!(!chain.has_orphan(b2.hash()));
    assert_eq!(chain.tip().unwrap().hash, b2.hash());
    assert_eq!(chain.tip().unwrap().height.0, 2);
}

#[test]
fn stale_timestamps_are_rejected() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    let (block, _) = make_block(&genesis, Vec::new(), 0);
    // Rewind the time to the parent's: no longer later than the
    // median-time-past.
    let mut stale = (*block).clone();
    stale.header = sable_chain::block::Header::new(
        stale.header.version,
        stale.header.previous_block_hash,
        stale.header.merkle_root,
        genesis.header.time,
        stale.header.difficulty_threshold,
        stale.header.nonce,
    );
    // Re-grind for the new header bytes.
    let target = REGTEST_BITS.to_expanded().unwrap();
    let mut nonce = 0u32;
    while stale.header.hash() > target {
        nonce += 1;
        stale.header = sable_chain::block::Header::new(
            stale.header.version,
            stale.header.previous_block_hash,
            stale.header.merkle_root,
            genesis.header.time,
            stale.header.difficulty_threshold,
            nonce,
        );
    }

    match chain.add(std::sync::Arc::new(stale)).unwrap_err() {
        BlockError::TimeTooOld => {}
        other => panic!("expected a time rejection: {:?}", other),
    }
}

#[test]
fn wrong_difficulty_bits_are_rejected() {
    sable_test::init();

    let mut chain = regtest_chain();
    let genesis = chain.tip().unwrap();

    // A hair below the regtest limit: still trivially grindable, but not
    // the required value.
    let wrong_bits = CompactDifficulty(0x207ffffe);
    let (block, _) = make_block(&genesis, Vec::new(), 0);
    let mut tampered = (*block).clone();
    let target = wrong_bits.to_expanded().unwrap();
    let mut nonce = 0u32;
    loop {
        tampered.header = sable_chain::block::Header::new(
            4,
            genesis.hash,
            tampered.header.merkle_root,
            tampered.header.time,
            wrong_bits,
            nonce,
        );
        if tampered.header.hash() <= target {
            break;
        }
        nonce += 1;
    }

    match chain.add(std::sync::Arc::new(tampered)).unwrap_err() {
        BlockError::IncorrectBits { .. } => {}
        other => panic!("expected a difficulty rejection: {:?}", other),
    }
}
