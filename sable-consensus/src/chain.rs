//! The block-connection state machine.
//!
//! `Chain` drives blocks through receive → contextual checks → branch
//! choice → connect / side-chain store / reorganize, over the persistent
//! state in `sable-state`. It is designed to be owned by a single worker:
//! every consensus-mutating method takes `&mut self`, and the chain is
//! never observably half-applied because events fire only after each
//! database commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use sable_chain::{
    amount::{Amount, NonNegative},
    block::{self, Block},
    coins::CoinView,
    transaction::Transaction,
    transparent::{
        SEQUENCE_DISABLE_FLAG, SEQUENCE_GRANULARITY, SEQUENCE_MASK, SEQUENCE_TYPE_FLAG,
    },
};
use sable_state::{ChainDb, ChainEntry, StateError};

use crate::block::{check, subsidy};
use crate::deployments::{self, Deployments};
use crate::difficulty;
use crate::error::{BlockError, TransactionError};
use crate::script::{Verifier, VerifyFlags};
use crate::transaction::check as tx_check;

/// How many events may queue per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Cap on blocks parked while waiting for their parents.
const MAX_ORPHAN_BLOCKS: usize = 64;

/// Events emitted by the chain, in commit order.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A block was accepted and stored, on any branch.
    Block {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A block was connected to the main chain.
    Connect {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// A block was disconnected from the main chain.
    Disconnect {
        entry: Arc<ChainEntry>,
        block: Arc<Block>,
    },
    /// The main chain switched branches. Fired once, after the matching
    /// `Disconnect` and `Connect` sequence.
    Reorganize {
        old_tip: Arc<ChainEntry>,
        new_tip: Arc<ChainEntry>,
    },
}

/// The outcome of [`Chain::add`].
#[derive(Clone, Debug)]
pub enum BlockAdded {
    /// The block extended the main chain and is the new tip.
    Connected(Arc<ChainEntry>),
    /// The block was stored on a side chain.
    SideChain(Arc<ChainEntry>),
    /// The block won a reorganization and is the new tip.
    Reorganized {
        old_tip: Arc<ChainEntry>,
        new_tip: Arc<ChainEntry>,
    },
    /// The block's parent is unknown; it was parked until the parent
    /// arrives.
    Orphaned(block::Hash),
    /// The block is already stored.
    Duplicate(block::Hash),
}

/// The block-connection state machine.
pub struct Chain {
    db: Arc<ChainDb>,
    verifier: Arc<dyn Verifier>,
    deployments: Deployments,
    /// Blocks that arrived before their parents, keyed by parent hash.
    orphans: HashMap<block::Hash, Arc<Block>>,
    /// Hashes rejected with a nonzero-score consensus error; retries are
    /// refused without re-validation.
    invalid: HashSet<block::Hash>,
    use_checkpoints: bool,
    events: broadcast::Sender<ChainEvent>,
}

impl Chain {
    pub fn new(db: Arc<ChainDb>, verifier: Arc<dyn Verifier>) -> Chain {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Chain {
            db,
            verifier,
            deployments: Deployments::new(),
            orphans: HashMap::new(),
            invalid: HashSet::new(),
            use_checkpoints: true,
            events,
        }
    }

    /// Stop requiring checkpoint hashes. Used by tests that rebuild
    /// historical forks.
    pub fn disable_checkpoints(&mut self) {
        self.use_checkpoints = false;
    }

    /// Subscribe to chain events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    pub fn db(&self) -> &Arc<ChainDb> {
        &self.db
    }

    /// The entry of the current best tip.
    pub fn tip(&self) -> Result<Arc<ChainEntry>, BlockError> {
        Ok(self.db.tip_entry()?)
    }

    /// Whether `hash` is parked waiting for its parent.
    pub fn has_orphan(&self, hash: block::Hash) -> bool {
        self.orphans.values().any(|block| block.hash() == hash)
    }

    /// Add a block to the chain.
    ///
    /// The block may connect, get stored as a side chain, trigger a
    /// reorganization, or be parked as an orphan; duplicates are ignored.
    /// Failures with a nonzero ban score also mark the hash invalid so
    /// replays are refused cheaply.
    pub fn add(&mut self, block: Arc<Block>) -> Result<BlockAdded, BlockError> {
        let hash = block.hash();
        if self.invalid.contains(&hash) {
            return Err(BlockError::KnownInvalid(hash));
        }
        if self.db.entry(hash.into())?.is_some() {
            return Ok(BlockAdded::Duplicate(hash));
        }

        let result = self.receive(block);
        if let Err(error) = &result {
            if error.score() > 0 {
                self.invalid.insert(hash);
            }
        }
        result
    }

    fn receive(&mut self, block: Arc<Block>) -> Result<BlockAdded, BlockError> {
        let hash = block.hash();
        let network = self.db.network().network;

        // Context-free checks: structure and proof of work.
        check::coinbase_is_first(&block)?;
        check::difficulty_is_valid(&block.header, network, &hash)?;
        check::merkle_root_validity(&block, &block.transaction_hashes())?;
        check::weight_is_valid(&block)?;

        let prev_hash = block.header.previous_block_hash;
        let prev = match self.db.entry(prev_hash.into())? {
            Some(prev) => prev,
            None => {
                self.park_orphan(prev_hash, block);
                return Ok(BlockAdded::Orphaned(prev_hash));
            }
        };

        let added = self.accept(prev, block)?;
        self.resolve_orphans(hash);
        Ok(added)
    }

    fn park_orphan(&mut self, prev_hash: block::Hash, block: Arc<Block>) {
        if self.orphans.len() >= MAX_ORPHAN_BLOCKS && !self.orphans.contains_key(&prev_hash) {
            if let Some(victim) = self.orphans.keys().next().copied() {
                self.orphans.remove(&victim);
            }
        }
        debug!(hash = %block.hash(), waiting_on = %prev_hash, "parked orphan block");
        self.orphans.insert(prev_hash, block);
        metrics::gauge!("chain.orphan.count", self.orphans.len() as _);
    }

    /// After a block becomes known, retry any blocks parked on it, chaining
    /// through descendants.
    fn resolve_orphans(&mut self, parent: block::Hash) {
        let mut parent = parent;
        while let Some(orphan) = self.orphans.remove(&parent) {
            let hash = orphan.hash();
            let prev = match self.db.entry(parent.into()) {
                Ok(Some(prev)) => prev,
                _ => break,
            };
            match self.accept(prev, orphan) {
                Ok(_) => {
                    parent = hash;
                }
                Err(error) => {
                    warn!(%hash, %error, "parked orphan block failed validation");
                    if error.score() > 0 {
                        self.invalid.insert(hash);
                    }
                    break;
                }
            }
        }
        metrics::gauge!("chain.orphan.count", self.orphans.len() as _);
    }

    /// Contextual checks against the resolved parent, then branch choice.
    fn accept(
        &mut self,
        prev: Arc<ChainEntry>,
        block: Arc<Block>,
    ) -> Result<BlockAdded, BlockError> {
        let hash = block.hash();
        let params = self.db.network();

        let mtp = self.db.median_time_past(&prev)?;
        if block.header.time <= mtp {
            return Err(BlockError::TimeTooOld);
        }

        // The entry computes the height and accumulated work; a `None` here
        // means the difficulty encoding (already filtered) or height
        // overflowed.
        let entry =
            ChainEntry::from_header(&block.header, Some(&prev)).ok_or(BlockError::InvalidDifficulty(hash))?;

        check::time_is_valid_at(&block.header, Utc::now(), &entry.height, &hash)?;

        let expected = difficulty::required_bits(&self.db, &prev, block.header.time)?;
        if block.header.difficulty_threshold != expected {
            return Err(BlockError::IncorrectBits {
                found: block.header.difficulty_threshold,
                expected,
            });
        }

        // Super-majority version gates: once enough of the window has
        // upgraded, outdated versions are rejected outright.
        let ancestors = self
            .db
            .ancestors(&prev, params.majority_window as usize)?;
        for required_version in 2..=4u32 {
            if block.header.version < required_version
                && deployments::is_super_majority(
                    required_version,
                    params.majority_reject_outdated,
                    &ancestors,
                )
            {
                return Err(BlockError::OutdatedVersion(block.header.version));
            }
        }

        if self.use_checkpoints {
            if let Some((last_height, _)) = params.last_checkpoint() {
                if entry.height <= last_height {
                    if let Some(expected_hash) = params.checkpoint(entry.height) {
                        if expected_hash != hash {
                            return Err(BlockError::CheckpointMismatch(entry.height));
                        }
                    }
                }
            }
        }

        let tip = self.db.tip_entry()?;
        let added = if entry.chainwork > tip.chainwork {
            let entry = Arc::new(entry);
            if prev.hash == tip.hash {
                self.connect(&entry, &block, &prev)?;
                BlockAdded::Connected(entry)
            } else {
                self.reorganize(tip.clone(), entry.clone(), &block)?;
                BlockAdded::Reorganized {
                    old_tip: tip,
                    new_tip: entry,
                }
            }
        } else {
            // A tie in chainwork keeps the first-seen branch: only strictly
            // greater work moves the tip.
            self.db.save(&entry, &block, None, false)?;
            debug!(hash = %entry.hash, height = entry.height.0, "stored side-chain block");
            BlockAdded::SideChain(Arc::new(entry))
        };

        let entry = match &added {
            BlockAdded::Connected(entry) | BlockAdded::SideChain(entry) => entry.clone(),
            BlockAdded::Reorganized { new_tip, .. } => new_tip.clone(),
            BlockAdded::Orphaned(_) | BlockAdded::Duplicate(_) => {
                unreachable!("accept only produces stored outcomes")
            }
        };
        let _ = self.events.send(ChainEvent::Block { entry, block });
        Ok(added)
    }

    /// Connect a block on top of the current tip.
    fn connect(
        &mut self,
        entry: &Arc<ChainEntry>,
        block: &Arc<Block>,
        prev: &ChainEntry,
    ) -> Result<(), BlockError> {
        let mut view = self.db.coin_view(block)?;
        self.verify_and_apply(entry, prev, block, &mut view)?;
        self.db.save(entry, block, Some(&mut view), true)?;
        info!(height = entry.height.0, hash = %entry.hash, "new chain tip");
        let _ = self.events.send(ChainEvent::Connect {
            entry: entry.clone(),
            block: block.clone(),
        });
        Ok(())
    }

    /// Full semantic verification of a block against `view`, applying
    /// spends and new outputs as it goes.
    ///
    /// On any error the view is discarded by the caller and the database is
    /// untouched, so failures have no persistent side effects.
    fn verify_and_apply(
        &mut self,
        entry: &ChainEntry,
        prev: &ChainEntry,
        block: &Block,
        view: &mut CoinView,
    ) -> Result<(), BlockError> {
        let params = self.db.network();
        let ancestors = self
            .db
            .ancestors(prev, params.majority_window as usize)?;
        let flags = deployments::active_flags(&self.db, &mut self.deployments, prev, &ancestors)?;
        let csv_active = flags.contains(VerifyFlags::CHECKSEQUENCEVERIFY);

        // Blocks at or below the last checkpoint skip script execution;
        // their structure and proof of work are still fully verified.
        let skip_scripts = self.use_checkpoints
            && params
                .last_checkpoint()
                .map(|(height, _)| entry.height <= height)
                .unwrap_or(false);

        let mtp = self.db.median_time_past(prev)?;

        let mut sigop_cost = 0u64;
        let mut fees: Amount<NonNegative> = Amount::zero();

        for tx in block.transactions.iter() {
            tx_check::has_inputs_and_outputs(tx)?;
            tx_check::no_duplicate_inputs(tx)?;
            if tx.is_coinbase() {
                tx_check::coinbase_script_size(tx)?;
            }
            if !tx.is_final(entry.height, mtp) {
                return Err(TransactionError::NotFinal.into());
            }

            sigop_cost += tx.sigop_cost(|outpoint| view.get(outpoint).map(|coin| coin.output));
            if sigop_cost > block::MAX_BLOCK_SIGOPS_COST {
                return Err(BlockError::ExcessiveSigops);
            }

            if !tx.is_coinbase() {
                tx_check::inputs_are_available(tx, view)?;
                if csv_active && tx.version >= 2 {
                    self.check_sequence_locks(tx, view, prev, entry.height)?;
                }

                let mut value_in: Amount<NonNegative> = Amount::zero();
                for (input_index, input) in tx.inputs.iter().enumerate() {
                    let outpoint = input
                        .outpoint()
                        .expect("coinbase inputs outside the coinbase were rejected");
                    let coin = view
                        .get(&outpoint)
                        .expect("input availability was checked above");
                    if !coin.is_mature(entry.height, params.coinbase_maturity) {
                        return Err(TransactionError::ImmatureCoinbaseSpend(outpoint).into());
                    }
                    if !skip_scripts {
                        self.verifier
                            .verify_input(tx, input_index, &coin.output, flags)
                            .map_err(TransactionError::from)?;
                    }
                    value_in = (value_in + coin.output.value).map_err(TransactionError::from)?;
                }

                let value_out = tx.value_out().map_err(TransactionError::from)?;
                if value_in < value_out {
                    return Err(TransactionError::InputsBelowOutputs.into());
                }
                let fee = (value_in - value_out).map_err(TransactionError::from)?;
                fees = (fees + fee).map_err(TransactionError::from)?;

                for input in tx.inputs.iter() {
                    let outpoint = input
                        .outpoint()
                        .expect("coinbase inputs outside the coinbase were rejected");
                    view.spend(&outpoint)
                        .expect("input availability was checked above");
                }
            }

            view.add_tx(tx, Some(entry.height));
        }

        let coinbase_out = block.transactions[0]
            .value_out()
            .map_err(TransactionError::from)?;
        let allowed =
            (subsidy::block_subsidy(entry.height, params) + fees).map_err(TransactionError::from)?;
        if coinbase_out > allowed {
            return Err(BlockError::BadCoinbaseAmount);
        }
        Ok(())
    }

    /// BIP68 relative lock evaluation for one transaction.
    fn check_sequence_locks(
        &self,
        tx: &Transaction,
        view: &CoinView,
        prev: &ChainEntry,
        height: block::Height,
    ) -> Result<(), BlockError> {
        let mut min_height: i64 = -1;
        let mut min_time: i64 = -1;

        for input in tx.inputs.iter() {
            let outpoint = match input.outpoint() {
                Some(outpoint) => outpoint,
                None => continue,
            };
            let sequence = input.sequence();
            if sequence & SEQUENCE_DISABLE_FLAG != 0 {
                continue;
            }
            let coin = view
                .get(&outpoint)
                .ok_or(TransactionError::InputsMissingOrSpent(outpoint))?;
            // Unconfirmed coins are treated as confirmed by this block.
            let coin_height = coin.height.unwrap_or(height);

            if sequence & SEQUENCE_TYPE_FLAG != 0 {
                // Time locks run from the median time past of the block
                // *before* the coin's block.
                let anchor_height = block::Height(coin_height.0.saturating_sub(1));
                let anchor = self
                    .db
                    .ancestor_at(prev, anchor_height)?
                    .ok_or(StateError::Corrupt("sequence-lock anchor is missing"))?;
                let coin_mtp = self.db.median_time_past(&anchor)?.timestamp();
                let lock =
                    coin_mtp + (((sequence & SEQUENCE_MASK) as i64) << SEQUENCE_GRANULARITY) - 1;
                min_time = min_time.max(lock);
            } else {
                let lock = coin_height.0 as i64 + (sequence & SEQUENCE_MASK) as i64 - 1;
                min_height = min_height.max(lock);
            }
        }

        if min_height >= height.0 as i64 {
            return Err(TransactionError::SequenceLocksNotMet.into());
        }
        let block_mtp = self.db.median_time_past(prev)?.timestamp();
        if min_time >= block_mtp {
            return Err(TransactionError::SequenceLocksNotMet.into());
        }
        Ok(())
    }

    /// Switch the main chain to the branch ending in `new_tip`.
    ///
    /// Walks back to the fork, disconnects the old branch tip-first,
    /// re-verifies and reconnects the new branch, and finally connects the
    /// new tip block itself. If the new branch fails verification part way,
    /// the old branch is restored before the error is returned.
    fn reorganize(
        &mut self,
        old_tip: Arc<ChainEntry>,
        new_tip: Arc<ChainEntry>,
        tip_block: &Arc<Block>,
    ) -> Result<(), BlockError> {
        let fork = self.find_fork(&old_tip, &new_tip)?;
        info!(
            old_tip = %old_tip.hash,
            new_tip = %new_tip.hash,
            fork = %fork.hash,
            depth = old_tip.height.0 - fork.height.0,
            "reorganizing",
        );

        // A reorg that crosses the prune horizon cannot reconstruct the
        // UTXO set; refuse before touching anything.
        let params = self.db.network();
        if self.db.pruning() && old_tip.height.0 - fork.height.0 > params.keep_blocks {
            return Err(BlockError::ReorgDepthExceeded);
        }

        // Disconnect the old branch, tip first.
        let mut disconnected: Vec<(Arc<ChainEntry>, Arc<Block>)> = Vec::new();
        let mut cursor = old_tip.clone();
        while cursor.hash != fork.hash {
            let block = self.db.disconnect(&cursor)?;
            let _ = self.events.send(ChainEvent::Disconnect {
                entry: cursor.clone(),
                block: block.clone(),
            });
            let parent = self
                .db
                .entry(cursor.previous_block_hash().into())?
                .ok_or(StateError::Corrupt("missing parent during reorganization"))?;
            disconnected.push((cursor, block));
            cursor = parent;
        }

        match self.apply_branch(&fork, &new_tip, tip_block) {
            Ok(()) => {
                metrics::counter!("chain.reorg.count", 1);
                let _ = self.events.send(ChainEvent::Reorganize {
                    old_tip,
                    new_tip,
                });
                Ok(())
            }
            Err(error) => {
                warn!(%error, "reorganization failed; restoring the previous chain");
                self.rewind_to(&fork)?;
                for (entry, block) in disconnected.iter().rev() {
                    let prev = self
                        .db
                        .entry(entry.previous_block_hash().into())?
                        .ok_or(StateError::Corrupt("missing parent during restore"))?;
                    let mut view = self.db.coin_view(block)?;
                    self.verify_and_apply(entry, &prev, block, &mut view)?;
                    self.db.reconnect(entry, block, &mut view)?;
                    let _ = self.events.send(ChainEvent::Connect {
                        entry: entry.clone(),
                        block: block.clone(),
                    });
                }
                Err(error)
            }
        }
    }

    /// Verify and reconnect the stored blocks between `fork` and the new
    /// tip's parent, then connect the tip block itself.
    fn apply_branch(
        &mut self,
        fork: &ChainEntry,
        new_tip: &Arc<ChainEntry>,
        tip_block: &Arc<Block>,
    ) -> Result<(), BlockError> {
        // Collect the stored part of the new branch, walking parent links
        // down to the fork.
        let mut branch: Vec<Arc<ChainEntry>> = Vec::new();
        let mut cursor_hash = new_tip.previous_block_hash();
        while cursor_hash != fork.hash {
            let entry = self
                .db
                .entry(cursor_hash.into())?
                .ok_or(StateError::Corrupt("side chain has a missing entry"))?;
            cursor_hash = entry.previous_block_hash();
            branch.push(entry);
        }
        branch.reverse();

        for entry in branch {
            let block = self
                .db
                .block(entry.hash.into())?
                .ok_or(StateError::MissingBlock(entry.hash))?;
            let prev = self
                .db
                .entry(entry.previous_block_hash().into())?
                .ok_or(StateError::Corrupt("side chain has a missing parent"))?;
            // The undo view gives re-verification the same inputs the
            // original connection would have seen.
            let mut view = self.db.undo_view(&block)?;
            self.verify_and_apply(&entry, &prev, &block, &mut view)?;
            self.db.reconnect(&entry, &block, &mut view)?;
            let _ = self.events.send(ChainEvent::Connect {
                entry: entry.clone(),
                block: block.clone(),
            });
        }

        let prev = self
            .db
            .entry(new_tip.previous_block_hash().into())?
            .ok_or(StateError::Corrupt("new tip has a missing parent"))?;
        let mut view = self.db.coin_view(tip_block)?;
        self.verify_and_apply(new_tip, &prev, tip_block, &mut view)?;
        self.db.save(new_tip, tip_block, Some(&mut view), true)?;
        let _ = self.events.send(ChainEvent::Connect {
            entry: new_tip.clone(),
            block: tip_block.clone(),
        });
        Ok(())
    }

    /// Disconnect until the tip is `target`.
    fn rewind_to(&mut self, target: &ChainEntry) -> Result<(), BlockError> {
        loop {
            let tip = self.db.tip_entry()?;
            if tip.hash == target.hash {
                return Ok(());
            }
            let block = self.db.disconnect(&tip)?;
            let _ = self.events.send(ChainEvent::Disconnect { entry: tip, block });
        }
    }

    /// The highest common ancestor of two entries.
    fn find_fork(
        &self,
        a: &Arc<ChainEntry>,
        b: &Arc<ChainEntry>,
    ) -> Result<Arc<ChainEntry>, BlockError> {
        let mut a = a.clone();
        let mut b = b.clone();
        while a.hash != b.hash {
            while a.height > b.height {
                a = self
                    .db
                    .entry(a.previous_block_hash().into())?
                    .ok_or(StateError::Corrupt("fork walk ran off the chain"))?;
            }
            while b.height > a.height {
                b = self
                    .db
                    .entry(b.previous_block_hash().into())?
                    .ok_or(StateError::Corrupt("fork walk ran off the chain"))?;
            }
            if a.hash != b.hash {
                a = self
                    .db
                    .entry(a.previous_block_hash().into())?
                    .ok_or(StateError::Corrupt("fork walk ran off the chain"))?;
                b = self
                    .db
                    .entry(b.previous_block_hash().into())?
                    .ok_or(StateError::Corrupt("fork walk ran off the chain"))?;
            }
        }
        Ok(a)
    }
}
