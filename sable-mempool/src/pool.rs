//! The transaction pool and its admission pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use sable_chain::{
    block::{self, Block},
    coins::{Coin, CoinView},
    parameters::{Network, NetworkParams},
    transaction,
    transaction::Transaction,
    transparent::{
        Input, OutPoint, ScriptClass, SEQUENCE_DISABLE_FLAG, SEQUENCE_GRANULARITY, SEQUENCE_MASK,
        SEQUENCE_TYPE_FLAG,
    },
};
use sable_consensus::{
    deployments::Deployments, transaction::check as tx_check, TransactionError, Verifier,
    VerifyFlags,
};
use sable_state::{ChainDb, ChainEntry};

use crate::{
    entry::MempoolEntry,
    error::MempoolError,
    fees::RollingFeeRate,
    orphans::OrphanPool,
    policy::*,
};

/// How many events may queue per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Events emitted by the pool.
#[derive(Clone, Debug)]
pub enum MempoolEvent {
    /// A transaction passed verification. Precedes `AddTx`.
    Tx(Arc<Transaction>),
    /// A transaction was inserted into the pool.
    AddTx(Arc<Transaction>),
    /// A transaction left the pool (eviction, expiry, conflict, or
    /// confirmation).
    RemoveTx(Arc<Transaction>),
    /// A pool transaction was included in a connected block. Precedes the
    /// matching `RemoveTx`.
    Confirmed {
        tx: Arc<Transaction>,
        block: block::Hash,
    },
    /// A previously-confirmed transaction returned to the pool after a
    /// disconnect.
    Unconfirmed(Arc<Transaction>),
    /// A pool transaction was removed because the chain (or a confirmed
    /// transaction) spent one of its inputs.
    Conflict(Arc<Transaction>),
    /// A parked orphan was dropped (pool overflow or failed validation).
    BadOrphan(transaction::Hash),
}

/// The outcome of a successful `add_tx`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxAdded {
    /// Admitted to the pool.
    Added(transaction::Hash),
    /// Parked as an orphan until its parents arrive.
    Orphan(transaction::Hash),
}

/// Pool policy knobs.
#[derive(Clone, Debug)]
pub struct MempoolConfig {
    /// Upper bound on the pool's estimated memory usage, in bytes.
    pub max_size: u64,
    /// Enforce standardness rules (on for mainnet).
    pub require_standard: bool,
    /// Let high-priority transactions in below the minimum relay fee.
    pub relay_priority: bool,
    /// Rate-limit those free transactions.
    pub limit_free: bool,
    /// The free-transaction budget, in kilobytes per rate window.
    pub limit_free_relay: f64,
    /// Reject fees so large they are probably a mistake.
    pub reject_absurd_fees: bool,
    /// Entry age (seconds) after which eviction removes it first.
    pub expiry_time: i64,
}

impl MempoolConfig {
    pub fn for_network(network: Network) -> MempoolConfig {
        MempoolConfig {
            max_size: MAX_MEMPOOL_SIZE,
            require_standard: network == Network::Mainnet,
            relay_priority: true,
            limit_free: true,
            limit_free_relay: LIMIT_FREE_RELAY,
            reject_absurd_fees: true,
            expiry_time: MEMPOOL_EXPIRY,
        }
    }
}

/// The transaction memory pool.
///
/// All admission, confirmation, and reorg paths take `&mut self`: the pool
/// is owned by a single worker, and observes chain events strictly in
/// chain order.
pub struct Mempool {
    db: Arc<ChainDb>,
    verifier: Arc<dyn Verifier>,
    deployments: Deployments,
    config: MempoolConfig,

    /// Resident entries by txid.
    entries: HashMap<transaction::Hash, MempoolEntry>,
    /// Every outpoint spent by a resident entry, mapped to its spender.
    /// This is the sole authority for pool-level double-spend detection.
    spents: HashMap<OutPoint, transaction::Hash>,
    orphans: OrphanPool,

    /// Estimated memory usage of the resident entries.
    size: u64,
    rolling_min_fee: RollingFeeRate,
    free_count: f64,
    last_free_time: i64,

    events: broadcast::Sender<MempoolEvent>,
}

impl Mempool {
    pub fn new(db: Arc<ChainDb>, verifier: Arc<dyn Verifier>) -> Mempool {
        let config = MempoolConfig::for_network(db.network().network);
        Mempool::with_config(db, verifier, config)
    }

    pub fn with_config(
        db: Arc<ChainDb>,
        verifier: Arc<dyn Verifier>,
        config: MempoolConfig,
    ) -> Mempool {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Mempool {
            db,
            verifier,
            deployments: Deployments::new(),
            config,
            entries: HashMap::new(),
            spents: HashMap::new(),
            orphans: OrphanPool::new(),
            size: 0,
            rolling_min_fee: RollingFeeRate::new(),
            free_count: 0.0,
            last_free_time: 0,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MempoolEvent> {
        self.events.subscribe()
    }

    pub fn has(&self, hash: &transaction::Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &transaction::Hash) -> Option<&MempoolEntry> {
        self.entries.get(hash)
    }

    pub fn has_orphan(&self, hash: &transaction::Hash) -> bool {
        self.orphans.has(hash)
    }

    /// The resident spender of `outpoint`, if any.
    pub fn spender(&self, outpoint: &OutPoint) -> Option<&transaction::Hash> {
        self.spents.get(outpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The estimated memory usage of the pool.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Pool transactions ordered by descending fee rate, for block
    /// template assembly. Integer cross-multiplication keeps the order
    /// exact and deterministic.
    pub fn sorted_for_template(&self) -> Vec<Arc<Transaction>> {
        let mut entries: Vec<&MempoolEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            let lhs = a.fee as i128 * b.size as i128;
            let rhs = b.fee as i128 * a.size as i128;
            rhs.cmp(&lhs).then_with(|| a.hash.0.cmp(&b.hash.0))
        });
        entries.into_iter().map(|entry| entry.tx.clone()).collect()
    }

    /// Attempt to admit a loose transaction, received at time `now`.
    ///
    /// The pipeline fails fast: each step yields a categorized
    /// `MempoolError` so the peer layer can score the relayer.
    pub fn add_tx(&mut self, tx: Arc<Transaction>, now: i64) -> Result<TxAdded, MempoolError> {
        let hash = tx.hash();

        // 1. Already known, in the pool or confirmed with live outputs.
        if self.entries.contains_key(&hash) || self.db.coins(&hash)?.is_some() {
            return Err(MempoolError::AlreadyKnown);
        }

        // 2. Structural sanity.
        tx_check::has_inputs_and_outputs(&tx)?;
        tx_check::no_duplicate_inputs(&tx)?;

        // 3. Coinbases are only created by blocks.
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }

        let tip = self.db.tip_entry()?;
        let next_height = block::Height(tip.height.0 + 1);

        // 4. Standardness gate.
        if self.config.require_standard {
            self.check_standard(&tx, &tip, next_height)?;
        }

        // 5. Double-spend check against the pool's spent set.
        for outpoint in spent_outpoints(&tx) {
            if self.spents.contains_key(&outpoint) {
                return Err(MempoolError::Duplicate);
            }
        }

        // 6. Resolve coins, from the pool first and then the chain. Any
        // unresolved input parks the transaction as an orphan.
        let (view, missing) = self.resolve_inputs(&tx)?;
        if !missing.is_empty() {
            if let Some(evicted) = self.orphans.add(tx, missing) {
                let _ = self.events.send(MempoolEvent::BadOrphan(evicted));
            }
            metrics::gauge!("mempool.orphan.count", self.orphans.len() as _);
            return Ok(TxAdded::Orphan(hash));
        }

        // 7. Build the entry and run the full verification pipeline.
        let entry = self.build_entry(tx, &view, next_height, now)?;
        self.verify_entry(&entry, &view, &tip, next_height, now)?;

        // 8. Insert, updating every index.
        self.insert_entry(entry);

        // 9. Keep the pool bounded.
        self.limit_size(now);

        // 10. Anything parked on this transaction can be retried.
        self.resolve_orphans(&hash, now);

        Ok(TxAdded::Added(hash))
    }

    /// A block was connected: drop confirmed transactions (the chain owns
    /// their inputs now), evict conflicting spenders, and retry orphans
    /// that were waiting on confirmed parents.
    pub fn add_block(&mut self, block: &Block, now: i64) {
        let block_hash = block.hash();
        for tx in block.transactions.iter().skip(1) {
            let hash = tx.hash();
            if let Some(entry) = self.remove_entry(&hash) {
                let _ = self.events.send(MempoolEvent::Confirmed {
                    tx: entry.tx.clone(),
                    block: block_hash,
                });
                let _ = self.events.send(MempoolEvent::RemoveTx(entry.tx));
            } else {
                self.remove_double_spends(tx);
            }
            self.resolve_orphans(&hash, now);
        }
        metrics::gauge!("mempool.tx.count", self.entries.len() as _);
        debug!(block = %block_hash, remaining = self.entries.len(), "confirmed block transactions");
    }

    /// A block was disconnected: its transactions return to the pool,
    /// bypassing the fee gates the network already passed them through.
    pub fn remove_block(&mut self, block: &Block, now: i64) {
        for tx in block.transactions.iter().skip(1) {
            match self.reinsert_unchecked(tx.clone(), now) {
                Ok(()) => {
                    let _ = self.events.send(MempoolEvent::Unconfirmed(tx.clone()));
                }
                Err(error) => {
                    warn!(hash = %tx.hash(), %error, "disconnected transaction could not re-enter the pool");
                }
            }
        }
        metrics::gauge!("mempool.tx.count", self.entries.len() as _);
    }

    fn check_standard(
        &mut self,
        tx: &Transaction,
        tip: &ChainEntry,
        next_height: block::Height,
    ) -> Result<(), MempoolError> {
        if tx.version < 1 {
            return Err(MempoolError::NonStandard("version"));
        }
        if tx.version >= 2 && !self.deployments.is_active(&self.db, "csv", tip)? {
            return Err(MempoolError::PrematureVersion2);
        }
        if tx.has_witness() && !self.deployments.is_active(&self.db, "segwit", tip)? {
            return Err(MempoolError::NoWitnessYet);
        }
        if tx.weight() > MAX_STANDARD_TX_WEIGHT {
            return Err(MempoolError::NonStandard("tx-size"));
        }

        let median_time = self.db.median_time_past(tip)?;
        if !tx.is_final(next_height, median_time) {
            return Err(MempoolError::NotFinal);
        }

        let mut null_data = 0usize;
        for output in tx.outputs.iter() {
            match output.lock_script.class() {
                ScriptClass::NonStandard => {
                    return Err(MempoolError::NonStandard("scriptpubkey"))
                }
                ScriptClass::NullData => null_data += 1,
                _ => {
                    if i64::from(output.value) < DUST_THRESHOLD {
                        return Err(MempoolError::NonStandard("dust"));
                    }
                }
            }
        }
        if null_data > 1 {
            return Err(MempoolError::NonStandard("multi-op-return"));
        }

        for input in tx.inputs.iter() {
            if let Input::PrevOut { unlock_script, .. } = input {
                if unlock_script.as_bytes().len() > MAX_STANDARD_SCRIPTSIG_SIZE {
                    return Err(MempoolError::NonStandard("scriptsig-size"));
                }
                if !unlock_script.is_push_only() {
                    return Err(MempoolError::NonStandard("scriptsig-not-pushonly"));
                }
            }
        }
        Ok(())
    }

    /// Resolve every input against the pool first, then the chain.
    ///
    /// Outputs of pool transactions resolve as unconfirmed coins; anything
    /// unresolved lands in the returned `missing` list.
    fn resolve_inputs(
        &self,
        tx: &Transaction,
    ) -> Result<(CoinView, Vec<transaction::Hash>), MempoolError> {
        let mut view = CoinView::new();
        let mut missing = Vec::new();
        for outpoint in spent_outpoints(tx) {
            if let Some(parent) = self.entries.get(&outpoint.hash) {
                match parent.tx.outputs.get(outpoint.index as usize) {
                    Some(output) if !output.lock_script.is_unspendable() => {
                        view.restore(
                            outpoint,
                            Coin {
                                version: parent.tx.version,
                                height: None,
                                coinbase: false,
                                output: output.clone(),
                            },
                        );
                    }
                    _ => missing.push(outpoint.hash),
                }
                continue;
            }
            if let Some(coin) = self.db.coin(&outpoint)? {
                view.restore(outpoint, coin);
                continue;
            }
            missing.push(outpoint.hash);
        }
        Ok((view, missing))
    }

    /// Construct the entry: fee, priority, and dependency accounting.
    fn build_entry(
        &self,
        tx: Arc<Transaction>,
        view: &CoinView,
        next_height: block::Height,
        now: i64,
    ) -> Result<MempoolEntry, MempoolError> {
        let hash = tx.hash();
        let size = tx.vsize();
        let mut value_in: i64 = 0;
        let mut weighted_age: f64 = 0.0;
        let mut dependencies = false;

        for outpoint in spent_outpoints(&tx) {
            let coin = view
                .get(&outpoint)
                .ok_or(TransactionError::InputsMissingOrSpent(outpoint))?;
            if !coin.is_mature(next_height, self.db.network().coinbase_maturity) {
                return Err(TransactionError::ImmatureCoinbaseSpend(outpoint).into());
            }
            let value = i64::from(coin.output.value);
            value_in += value;
            match coin.height {
                Some(height) => {
                    let age = next_height.0.saturating_sub(height.0) as f64;
                    weighted_age += value as f64 * age;
                }
                None => dependencies = true,
            }
        }

        let value_out = i64::from(tx.value_out().map_err(TransactionError::from)?);
        if value_in < value_out {
            return Err(TransactionError::InputsBelowOutputs.into());
        }
        let fee = value_in - value_out;
        let priority = if size == 0 {
            0.0
        } else {
            weighted_age / size as f64
        };

        Ok(MempoolEntry {
            tx,
            hash,
            height: next_height,
            size,
            priority,
            fee,
            time: now,
            value: value_in,
            desc_count: 1,
            desc_size: size,
            desc_fee: fee,
            dependencies,
        })
    }

    fn verify_entry(
        &mut self,
        entry: &MempoolEntry,
        view: &CoinView,
        tip: &ChainEntry,
        next_height: block::Height,
        now: i64,
    ) -> Result<(), MempoolError> {
        let tx = &entry.tx;

        // BIP68 relative locks, evaluated as if mined in the next block.
        if tx.version >= 2 {
            self.check_sequence_locks(tx, view, tip, next_height)?;
        }

        // Standard input templates need resolved coins, so they run here
        // rather than in the early standardness gate.
        if self.config.require_standard {
            for outpoint in spent_outpoints(tx) {
                let coin = view
                    .get(&outpoint)
                    .expect("inputs resolved before verification");
                if coin.output.lock_script.class() == ScriptClass::NonStandard {
                    return Err(MempoolError::NonStandard("nonstandard-inputs"));
                }
            }
        }

        let sigops = tx.sigop_cost(|outpoint| view.get(outpoint).map(|coin| coin.output));
        if sigops > MAX_TX_SIGOPS_COST {
            return Err(TransactionError::SigopCost(sigops).into());
        }

        // Fee gates: the rolling minimum, the priority exemption, the
        // free-transaction rate limit, and the absurd-fee guard.
        let min_rate = self
            .rolling_min_fee
            .current(now, self.size, self.config.max_size);
        let reject_fee = min_rate * entry.size as i64 / 1000;
        if reject_fee > 0 && entry.fee < reject_fee {
            return Err(MempoolError::InsufficientFee {
                fee: entry.fee,
                required: reject_fee,
            });
        }

        let min_relay_fee = MIN_RELAY_FEE * entry.size as i64 / 1000;
        if self.config.relay_priority && entry.fee < min_relay_fee {
            if !entry.is_free(next_height) {
                return Err(MempoolError::InsufficientPriority);
            }
            if self.config.limit_free {
                // Multiplicative decay with a ten-minute time constant.
                let elapsed = (now - self.last_free_time).max(0);
                self.free_count *= (1.0 - 1.0 / 600.0f64).powi(elapsed as i32);
                self.last_free_time = now;
                if self.free_count > self.config.limit_free_relay * 10.0 * 1000.0 {
                    return Err(MempoolError::RateLimited);
                }
                self.free_count += entry.size as f64;
            }
        }

        if self.config.reject_absurd_fees {
            let absurd = min_relay_fee.max(MIN_RELAY_FEE) * ABSURD_FEE_MULTIPLIER;
            if entry.fee > absurd {
                return Err(MempoolError::AbsurdFee { fee: entry.fee });
            }
        }

        // Unconfirmed ancestor chains stay mineable-sized.
        let ancestors = self.ancestors_of(tx);
        if ancestors.len() + 1 > ANCESTOR_LIMIT {
            return Err(MempoolError::AncestorLimit(ANCESTOR_LIMIT));
        }

        // Script verification: standard flags first, with a mandatory-only
        // retry to classify the failure.
        let standard_flags = VerifyFlags::standard();
        let mandatory_flags = VerifyFlags::mandatory();
        for (index, input) in tx.inputs.iter().enumerate() {
            let outpoint = match input.outpoint() {
                Some(outpoint) => outpoint,
                None => continue,
            };
            let coin = view
                .get(&outpoint)
                .expect("inputs resolved before verification");
            if self
                .verifier
                .verify_input(tx, index, &coin.output, standard_flags)
                .is_err()
            {
                let script_error = match self
                    .verifier
                    .verify_input(tx, index, &coin.output, mandatory_flags)
                {
                    Ok(()) => crate::error::MempoolError::Verification(
                        sable_consensus::script::ScriptError::NonMandatory(
                            "script failed only under standard flags",
                        )
                        .into(),
                    ),
                    Err(_) => crate::error::MempoolError::Verification(
                        sable_consensus::script::ScriptError::Mandatory(
                            "script failed under mandatory flags",
                        )
                        .into(),
                    ),
                };
                return Err(script_error);
            }
        }

        Ok(())
    }

    /// BIP68 evaluation for the next block.
    fn check_sequence_locks(
        &self,
        tx: &Transaction,
        view: &CoinView,
        tip: &ChainEntry,
        next_height: block::Height,
    ) -> Result<(), MempoolError> {
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
            let coin_height = coin.height.unwrap_or(next_height);

            if sequence & SEQUENCE_TYPE_FLAG != 0 {
                let anchor_height = block::Height(coin_height.0.saturating_sub(1));
                let anchor = match self.db.ancestor_at(tip, anchor_height)? {
                    Some(anchor) => anchor,
                    None => return Err(MempoolError::SequenceLocksNotMet),
                };
                let coin_mtp = self.db.median_time_past(&anchor)?.timestamp();
                let lock =
                    coin_mtp + (((sequence & SEQUENCE_MASK) as i64) << SEQUENCE_GRANULARITY) - 1;
                min_time = min_time.max(lock);
            } else {
                let lock = coin_height.0 as i64 + (sequence & SEQUENCE_MASK) as i64 - 1;
                min_height = min_height.max(lock);
            }
        }

        if min_height >= next_height.0 as i64 {
            return Err(MempoolError::SequenceLocksNotMet);
        }
        let tip_mtp = self.db.median_time_past(tip)?.timestamp();
        if min_time >= tip_mtp {
            return Err(MempoolError::SequenceLocksNotMet);
        }
        Ok(())
    }

    /// Every in-pool ancestor (transitively) of `tx`.
    fn ancestors_of(&self, tx: &Transaction) -> HashSet<transaction::Hash> {
        let mut ancestors = HashSet::new();
        let mut queue: Vec<transaction::Hash> = spent_outpoints(tx)
            .map(|outpoint| outpoint.hash)
            .collect();
        while let Some(hash) = queue.pop() {
            if let Some(parent) = self.entries.get(&hash) {
                if ancestors.insert(hash) {
                    queue.extend(spent_outpoints(&parent.tx).map(|outpoint| outpoint.hash));
                }
            }
        }
        ancestors
    }

    fn insert_entry(&mut self, entry: MempoolEntry) {
        for outpoint in spent_outpoints(&entry.tx) {
            self.spents.insert(outpoint, entry.hash);
        }
        self.size += entry.memory_usage();

        for ancestor in self.ancestors_of(&entry.tx) {
            if let Some(ancestor) = self.entries.get_mut(&ancestor) {
                ancestor.desc_count += 1;
                ancestor.desc_size += entry.size;
                ancestor.desc_fee += entry.fee;
            }
        }

        trace!(hash = %entry.hash, fee = entry.fee, size = entry.size, "admitted transaction");
        let tx = entry.tx.clone();
        self.entries.insert(entry.hash, entry);
        let _ = self.events.send(MempoolEvent::Tx(tx.clone()));
        let _ = self.events.send(MempoolEvent::AddTx(tx));
        metrics::counter!("mempool.admitted.tx.count", 1);
        metrics::gauge!("mempool.tx.count", self.entries.len() as _);
    }

    /// Remove an entry and fix every index. Descendant entries are left in
    /// place; callers that need cascade removal use
    /// `remove_with_descendants`.
    fn remove_entry(&mut self, hash: &transaction::Hash) -> Option<MempoolEntry> {
        let entry = self.entries.remove(hash)?;
        for outpoint in spent_outpoints(&entry.tx) {
            self.spents.remove(&outpoint);
        }
        self.size = self.size.saturating_sub(entry.memory_usage());

        for ancestor in self.ancestors_of(&entry.tx) {
            if let Some(ancestor) = self.entries.get_mut(&ancestor) {
                ancestor.desc_count = ancestor.desc_count.saturating_sub(1);
                ancestor.desc_size = ancestor.desc_size.saturating_sub(entry.size);
                ancestor.desc_fee -= entry.fee;
            }
        }
        Some(entry)
    }

    /// Remove an entry and everything that spends its outputs, descendants
    /// first, so `spents` never points at a removed entry.
    fn remove_with_descendants(&mut self, hash: transaction::Hash) -> Vec<MempoolEntry> {
        let tx = match self.entries.get(&hash) {
            Some(entry) => entry.tx.clone(),
            None => return Vec::new(),
        };

        let mut removed = Vec::new();
        for index in 0..tx.outputs.len() as u32 {
            let outpoint = OutPoint { hash, index };
            if let Some(spender) = self.spents.get(&outpoint).copied() {
                removed.extend(self.remove_with_descendants(spender));
            }
        }
        if let Some(entry) = self.remove_entry(&hash) {
            removed.push(entry);
        }
        removed
    }

    /// Drop every pool transaction that double-spends an input of `tx`
    /// (which the chain has accepted), with its descendants.
    fn remove_double_spends(&mut self, tx: &Transaction) {
        for outpoint in spent_outpoints(tx) {
            if let Some(spender) = self.spents.get(&outpoint).copied() {
                debug!(conflicting = %spender, winner = %tx.hash(), "removing double-spent transaction");
                for entry in self.remove_with_descendants(spender) {
                    let _ = self.events.send(MempoolEvent::Conflict(entry.tx.clone()));
                    let _ = self.events.send(MempoolEvent::RemoveTx(entry.tx));
                }
            }
        }
    }

    /// Evict until the size bound holds: expired entries first (oldest
    /// first), then the lowest fee rates. Each eviction bumps the rolling
    /// minimum fee rate.
    fn limit_size(&mut self, now: i64) {
        while self.size > self.config.max_size {
            let expired = self
                .entries
                .values()
                .filter(|entry| now - entry.time > self.config.expiry_time)
                .min_by_key(|entry| entry.time)
                .map(|entry| entry.hash);
            let victim = expired.or_else(|| {
                self.entries
                    .values()
                    .min_by_key(|entry| (entry.fee_rate(), entry.time, entry.hash.0))
                    .map(|entry| entry.hash)
            });
            let victim = match victim {
                Some(victim) => victim,
                None => break,
            };
            for entry in self.remove_with_descendants(victim) {
                self.rolling_min_fee.bump(entry.fee_rate(), now);
                trace!(hash = %entry.hash, "evicted transaction");
                let _ = self.events.send(MempoolEvent::RemoveTx(entry.tx.clone()));
            }
            metrics::counter!("mempool.evicted.tx.count", 1);
        }
        metrics::gauge!("mempool.size.bytes", self.size as _);
    }

    /// Retry every orphan that was waiting on `parent`.
    fn resolve_orphans(&mut self, parent: &transaction::Hash, now: i64) {
        let resolved = self.orphans.resolve(parent);
        for orphan in resolved {
            let hash = orphan.hash();
            match self.add_tx(orphan, now) {
                Ok(_) => {}
                Err(error) => {
                    debug!(%hash, %error, "resolved orphan failed admission");
                    let _ = self.events.send(MempoolEvent::BadOrphan(hash));
                }
            }
        }
        metrics::gauge!("mempool.orphan.count", self.orphans.len() as _);
    }

    /// Re-insert a disconnected chain transaction without fee gating.
    fn reinsert_unchecked(&mut self, tx: Arc<Transaction>, now: i64) -> Result<(), MempoolError> {
        let hash = tx.hash();
        if self.entries.contains_key(&hash) {
            return Ok(());
        }
        let (view, missing) = self.resolve_inputs(&tx)?;
        if !missing.is_empty() {
            // Its parent was also disconnected but re-inserted later in
            // the block order; the caller feeds transactions in order, so
            // this only happens for inputs confirmed even deeper.
            return Err(MempoolError::Verification(
                TransactionError::InputsMissingOrSpent(OutPoint {
                    hash: missing[0],
                    index: 0,
                }),
            ));
        }
        let entry = self.build_entry(tx, &view, block::Height(self.db.tip_entry()?.height.0 + 1), now)?;
        self.insert_entry(entry);
        Ok(())
    }

    /// The network parameters the pool was opened with.
    pub fn network(&self) -> &'static NetworkParams {
        self.db.network()
    }
}

/// The outpoints spent by `tx`.
fn spent_outpoints(tx: &Transaction) -> impl Iterator<Item = OutPoint> + '_ {
    tx.inputs.iter().filter_map(Input::outpoint)
}
