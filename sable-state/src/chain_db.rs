//! The persistent chain database, built on sled.
//!
//! One tree per index, with big-endian integer keys so height ranges scan
//! in order:
//!
//! | tree             | key        | value                          |
//! |------------------|------------|--------------------------------|
//! | `meta`           | `tip`      | hash of the best chain tip     |
//! | `meta`           | `version`  | schema version (u32 LE)        |
//! | `entry_by_hash`  | block hash | serialized `ChainEntry`        |
//! | `height_by_hash` | block hash | height (u32 BE)                |
//! | `hash_by_height` | height BE  | hash (main chain only)         |
//! | `next_by_hash`   | block hash | next main-chain hash           |
//! | `block_by_hash`  | block hash | raw block bytes                |
//! | `coins_by_tx`    | tx hash    | serialized `Coins` bundle      |
//! | `undo_by_hash`   | block hash | serialized `UndoCoins`         |
//! | `prune_queue`    | height BE  | hash to prune at that height   |
//!
//! All reads are `&self` and thread-safe; consensus-mutating writes are
//! expected to be serialized by the single chain worker that owns the
//! database handle. Each mutating operation is applied as one batch per
//! tree, then flushed.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::{debug, trace};

use sable_chain::{
    block::{self, Block},
    coins::{CoinView, Coins, UndoCoins},
    parameters::{genesis_block, Network, NetworkParams, MEDIAN_TIMESPAN},
    transaction,
    BitcoinDeserialize, BitcoinSerialize,
};

use crate::{ChainEntry, Config, HashOrHeight, StateError};

/// The schema version this build reads and writes.
///
/// Opening a database with any other stored version fails rather than
/// guessing at record layouts.
pub const DATABASE_VERSION: u32 = 1;

struct Caches {
    /// Entries by block hash.
    entries: Mutex<LruCache<block::Hash, Arc<ChainEntry>>>,
    /// Main-chain hashes by height. Populated only when main-chain
    /// membership is known.
    heights: Mutex<LruCache<block::Height, block::Hash>>,
    /// Serialized coins bundles by transaction hash, deferred-decoded at
    /// read time.
    coins: Mutex<LruCache<transaction::Hash, Bytes>>,
}

/// The persistent block/header/UTXO index.
pub struct ChainDb {
    network: &'static NetworkParams,
    prune: bool,

    db: sled::Db,
    meta: sled::Tree,
    entry_by_hash: sled::Tree,
    height_by_hash: sled::Tree,
    hash_by_height: sled::Tree,
    next_by_hash: sled::Tree,
    block_by_hash: sled::Tree,
    coins_by_tx: sled::Tree,
    undo_by_hash: sled::Tree,
    prune_queue: sled::Tree,

    caches: Caches,
    tip: Mutex<block::Hash>,
}

impl ChainDb {
    /// Open (or create) the database for `network`.
    ///
    /// A fresh database is bootstrapped with the network's genesis block:
    /// entry, height, main-chain pointer, and tip. Genesis coins are not
    /// indexed; the genesis coinbase is unspendable by long-standing
    /// convention.
    pub fn open(config: &Config, network: Network) -> Result<ChainDb, StateError> {
        let db = config.sled_config(network).open()?;

        let meta = db.open_tree(b"meta")?;
        match meta.get(b"version")? {
            Some(raw) if raw.len() == 4 => {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&raw);
                let found = u32::from_le_bytes(bytes);
                if found != DATABASE_VERSION {
                    return Err(StateError::SchemaVersion {
                        found,
                        expected: DATABASE_VERSION,
                    });
                }
            }
            Some(_) => return Err(StateError::Corrupt("malformed schema version record")),
            None => {
                meta.insert(b"version", DATABASE_VERSION.to_le_bytes().to_vec())?;
            }
        }

        let params = network.params();
        // Size the entry caches so retargeting, majority-window checks,
        // locator construction, and a reasonable reorg depth all hit cache.
        let entry_cache_size = ((params.retarget_interval as usize + 1) * 2) + 100;
        let caches = Caches {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(entry_cache_size).expect("cache size is nonzero"),
            )),
            heights: Mutex::new(LruCache::new(
                NonZeroUsize::new(entry_cache_size).expect("cache size is nonzero"),
            )),
            coins: Mutex::new(LruCache::new(
                NonZeroUsize::new(100_000).expect("cache size is nonzero"),
            )),
        };

        let chain_db = ChainDb {
            network: params,
            prune: config.prune,
            meta,
            entry_by_hash: db.open_tree(b"entry_by_hash")?,
            height_by_hash: db.open_tree(b"height_by_hash")?,
            hash_by_height: db.open_tree(b"hash_by_height")?,
            next_by_hash: db.open_tree(b"next_by_hash")?,
            block_by_hash: db.open_tree(b"block_by_hash")?,
            coins_by_tx: db.open_tree(b"coins_by_tx")?,
            undo_by_hash: db.open_tree(b"undo_by_hash")?,
            prune_queue: db.open_tree(b"prune_queue")?,
            db,
            caches,
            tip: Mutex::new(block::Hash([0; 32])),
        };

        let genesis = genesis_block(network);
        let genesis_entry =
            ChainEntry::from_header(&genesis.header, None).expect("genesis header is valid");
        if !chain_db.entry_by_hash.contains_key(&genesis_entry.hash.0)? {
            debug!(network = %network, hash = %genesis_entry.hash, "initializing chain state");
            chain_db
                .entry_by_hash
                .insert(&genesis_entry.hash.0, genesis_entry.bitcoin_serialize_to_vec()?)?;
            chain_db
                .height_by_hash
                .insert(&genesis_entry.hash.0, 0u32.to_be_bytes().to_vec())?;
            chain_db
                .hash_by_height
                .insert(&0u32.to_be_bytes(), genesis_entry.hash.0.to_vec())?;
            chain_db
                .block_by_hash
                .insert(&genesis_entry.hash.0, genesis.bitcoin_serialize_to_vec()?)?;
            chain_db.meta.insert(b"tip", genesis_entry.hash.0.to_vec())?;
            chain_db.db.flush()?;
        }

        let tip = match chain_db.meta.get(b"tip")? {
            Some(raw) if raw.len() == 32 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&raw);
                block::Hash(bytes)
            }
            _ => return Err(StateError::Corrupt("missing or malformed tip record")),
        };
        *chain_db.tip.lock().expect("tip lock is not poisoned") = tip;

        Ok(chain_db)
    }

    /// The consensus parameters this database was opened with.
    pub fn network(&self) -> &'static NetworkParams {
        self.network
    }

    /// Whether this database deletes old block bodies and undo records.
    pub fn pruning(&self) -> bool {
        self.prune
    }

    /// The hash of the current best tip.
    pub fn tip_hash(&self) -> block::Hash {
        *self.tip.lock().expect("tip lock is not poisoned")
    }

    /// The entry of the current best tip.
    pub fn tip_entry(&self) -> Result<Arc<ChainEntry>, StateError> {
        self.entry(self.tip_hash().into())?
            .ok_or(StateError::Corrupt("tip entry is missing"))
    }

    /// Look up an entry by hash or main-chain height.
    pub fn entry(&self, key: HashOrHeight) -> Result<Option<Arc<ChainEntry>>, StateError> {
        let hash = match key {
            HashOrHeight::Hash(hash) => hash,
            HashOrHeight::Height(height) => {
                let cached = self
                    .caches
                    .heights
                    .lock()
                    .expect("height cache lock is not poisoned")
                    .get(&height)
                    .copied();
                match cached {
                    Some(hash) => hash,
                    None => match self.hash_at(height)? {
                        Some(hash) => {
                            // Main-chain membership is known here, so the
                            // height cache may be populated.
                            self.caches
                                .heights
                                .lock()
                                .expect("height cache lock is not poisoned")
                                .put(height, hash);
                            hash
                        }
                        None => return Ok(None),
                    },
                }
            }
        };

        if let Some(entry) = self
            .caches
            .entries
            .lock()
            .expect("entry cache lock is not poisoned")
            .get(&hash)
        {
            return Ok(Some(entry.clone()));
        }

        match self.entry_by_hash.get(&hash.0)? {
            Some(raw) => {
                let entry = Arc::new(ChainEntry::bitcoin_deserialize(&raw[..])?);
                self.caches
                    .entries
                    .lock()
                    .expect("entry cache lock is not poisoned")
                    .put(hash, entry.clone());
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// The main-chain hash at `height`, reading the index directly.
    fn hash_at(&self, height: block::Height) -> Result<Option<block::Hash>, StateError> {
        Ok(self
            .hash_by_height
            .get(&height.0.to_be_bytes())?
            .map(|raw| {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&raw);
                block::Hash(bytes)
            }))
    }

    /// The stored height of `hash`, whether or not it is on the main chain.
    pub fn height(&self, hash: block::Hash) -> Result<Option<block::Height>, StateError> {
        Ok(self.height_by_hash.get(&hash.0)?.map(|raw| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&raw);
            block::Height(u32::from_be_bytes(bytes))
        }))
    }

    /// Whether `hash` is on the main chain.
    pub fn is_main_chain(&self, hash: block::Hash) -> Result<bool, StateError> {
        if hash == self.tip_hash() {
            return Ok(true);
        }
        match self.height(hash)? {
            Some(height) => Ok(self.hash_at(height)? == Some(hash)),
            None => Ok(false),
        }
    }

    /// The main-chain successor of `hash`, if `hash` is on the main chain
    /// below the tip.
    pub fn next_hash(&self, hash: block::Hash) -> Result<Option<block::Hash>, StateError> {
        Ok(self.next_by_hash.get(&hash.0)?.map(|raw| {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&raw);
            block::Hash(bytes)
        }))
    }

    /// Read a stored block body.
    pub fn block(&self, key: HashOrHeight) -> Result<Option<Arc<Block>>, StateError> {
        let hash = match key {
            HashOrHeight::Hash(hash) => hash,
            HashOrHeight::Height(height) => match self.hash_at(height)? {
                Some(hash) => hash,
                None => return Ok(None),
            },
        };
        match self.block_by_hash.get(&hash.0)? {
            Some(raw) => Ok(Some(Arc::new(Block::bitcoin_deserialize(&raw[..])?))),
            None => Ok(None),
        }
    }

    /// Read a transaction's coins bundle.
    pub fn coins(&self, hash: &transaction::Hash) -> Result<Option<Coins>, StateError> {
        let cached = self
            .caches
            .coins
            .lock()
            .expect("coin cache lock is not poisoned")
            .get(hash)
            .cloned();
        if let Some(raw) = cached {
            return Ok(Some(Coins::from_bytes(raw)?));
        }
        match self.coins_by_tx.get(&hash.0)? {
            Some(raw) => {
                let raw = Bytes::copy_from_slice(&raw);
                self.caches
                    .coins
                    .lock()
                    .expect("coin cache lock is not poisoned")
                    .put(*hash, raw.clone());
                Ok(Some(Coins::from_bytes(raw)?))
            }
            None => Ok(None),
        }
    }

    /// Read a single unspent coin.
    pub fn coin(
        &self,
        outpoint: &sable_chain::transparent::OutPoint,
    ) -> Result<Option<sable_chain::coins::Coin>, StateError> {
        Ok(self
            .coins(&outpoint.hash)?
            .and_then(|coins| coins.coin(outpoint.index)))
    }

    /// Build the `CoinView` a block's verification reads from: the current
    /// bundle of every transaction referenced by the block's inputs.
    pub fn coin_view(&self, block: &Block) -> Result<CoinView, StateError> {
        let mut view = CoinView::new();
        let mut seen = HashSet::new();
        for outpoint in block.spent_outpoints() {
            if seen.insert(outpoint.hash) {
                if let Some(coins) = self.coins(&outpoint.hash)? {
                    view.add(outpoint.hash, coins);
                }
            }
        }
        Ok(view)
    }

    /// Build the view a *re-verification* of `block` needs: the current
    /// coins plus the block's stored undo coins, so verification during a
    /// reorganization sees the same inputs the original connection saw.
    pub fn undo_view(&self, block: &Block) -> Result<CoinView, StateError> {
        let mut view = self.coin_view(block)?;
        if let Some(undo) = self.undo_coins(block.hash())? {
            for (outpoint, coin) in undo.iter() {
                if !view.has(outpoint) {
                    view.restore(*outpoint, coin.clone());
                }
            }
        }
        Ok(view)
    }

    /// Read a block's undo record.
    pub fn undo_coins(&self, hash: block::Hash) -> Result<Option<UndoCoins>, StateError> {
        match self.undo_by_hash.get(&hash.0)? {
            Some(raw) => Ok(Some(UndoCoins::bitcoin_deserialize(&raw[..])?)),
            None => Ok(None),
        }
    }

    /// Save a block and its entry.
    ///
    /// Always writes the entry, height, and block body. When `connect` is
    /// true the block becomes the new tip: main-chain pointers move, the
    /// coin changes in `view` are applied, and the undo record is written.
    /// When false the block is stored as a side chain.
    pub fn save(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: Option<&mut CoinView>,
        connect: bool,
    ) -> Result<(), StateError> {
        self.entry_by_hash
            .insert(&entry.hash.0, entry.bitcoin_serialize_to_vec()?)?;
        self.height_by_hash
            .insert(&entry.hash.0, entry.height.0.to_be_bytes().to_vec())?;
        self.block_by_hash
            .insert(&entry.hash.0, block.bitcoin_serialize_to_vec()?)?;
        self.caches
            .entries
            .lock()
            .expect("entry cache lock is not poisoned")
            .put(entry.hash, Arc::new(entry.clone()));

        if connect {
            let view = view.expect("connecting saves always carry a view");
            self.connect_block(entry, view)?;
            metrics::counter!("state.committed.block.count", 1);
            metrics::gauge!("state.committed.block.height", entry.height.0 as _);
        } else {
            trace!(hash = %entry.hash, height = entry.height.0, "saved side-chain block");
            metrics::counter!("state.sidechain.block.count", 1);
            self.db.flush()?;
        }
        Ok(())
    }

    /// Re-point the main chain at an already-stored side-chain block and
    /// apply its coin changes. Used while reorganizing.
    pub fn reconnect(
        &self,
        entry: &ChainEntry,
        _block: &Block,
        view: &mut CoinView,
    ) -> Result<(), StateError> {
        self.connect_block(entry, view)?;
        metrics::counter!("state.reconnected.block.count", 1);
        Ok(())
    }

    fn connect_block(&self, entry: &ChainEntry, view: &mut CoinView) -> Result<(), StateError> {
        let undo = view.take_undo();

        let mut coins_batch = sled::Batch::default();
        {
            let mut coin_cache = self
                .caches
                .coins
                .lock()
                .expect("coin cache lock is not poisoned");
            for (hash, coins) in view.to_sorted_vec() {
                if coins.is_empty() {
                    // The last output of the bundle was spent.
                    coins_batch.remove(&hash.0[..]);
                    coin_cache.pop(hash);
                } else {
                    let raw = coins.bitcoin_serialize_to_vec()?;
                    coin_cache.put(*hash, Bytes::copy_from_slice(&raw));
                    coins_batch.insert(&hash.0[..], raw);
                }
            }
        }
        self.coins_by_tx.apply_batch(coins_batch)?;

        if !undo.is_empty() || entry.height.0 > 0 {
            self.undo_by_hash
                .insert(&entry.hash.0, undo.bitcoin_serialize_to_vec()?)?;
        }

        self.next_by_hash
            .insert(&entry.previous_block_hash().0, entry.hash.0.to_vec())?;
        self.hash_by_height
            .insert(&entry.height.0.to_be_bytes(), entry.hash.0.to_vec())?;
        self.meta.insert(b"tip", entry.hash.0.to_vec())?;

        self.caches
            .heights
            .lock()
            .expect("height cache lock is not poisoned")
            .put(entry.height, entry.hash);
        *self.tip.lock().expect("tip lock is not poisoned") = entry.hash;

        if self.prune {
            self.enqueue_prune(entry)?;
        }
        self.db.flush()?;

        trace!(hash = %entry.hash, height = entry.height.0, "connected block");
        Ok(())
    }

    /// Disconnect the tip block `entry`, restoring the UTXO set from its
    /// undo record. Returns the disconnected block body.
    ///
    /// The entry, height record, and block body remain stored: the block
    /// becomes a side chain.
    pub fn disconnect(&self, entry: &ChainEntry) -> Result<Arc<Block>, StateError> {
        let block = self
            .block(entry.hash.into())?
            .ok_or(StateError::MissingBlock(entry.hash))?;
        let mut undo = self
            .undo_coins(entry.hash)?
            .ok_or(StateError::Corrupt("missing undo record for main-chain block"))?;

        let created: HashSet<transaction::Hash> =
            block.transactions.iter().map(|tx| tx.hash()).collect();

        // Seed a working view with the bundles the undo coins restore into.
        let mut view = CoinView::new();
        for (outpoint, _) in undo.iter() {
            if !created.contains(&outpoint.hash) {
                if let Some(coins) = self.coins(&outpoint.hash)? {
                    view.add(outpoint.hash, coins);
                }
            }
        }

        // Unwind transactions in reverse: drop the outputs each one
        // created, then restore the coins its inputs spent. Outputs both
        // created and spent inside this block cancel out.
        let mut removed: Vec<transaction::Hash> = Vec::new();
        for tx in block.transactions.iter().rev() {
            view.remove(&tx.hash());
            removed.push(tx.hash());
            for input in tx.inputs.iter().rev() {
                if input.outpoint().is_some() {
                    let (outpoint, coin) = undo
                        .pop()
                        .ok_or(StateError::Corrupt("undo record is too short"))?;
                    view.restore(outpoint, coin);
                }
            }
        }
        if !undo.is_empty() {
            return Err(StateError::Corrupt("undo record is too long"));
        }

        let mut coins_batch = sled::Batch::default();
        {
            let mut coin_cache = self
                .caches
                .coins
                .lock()
                .expect("coin cache lock is not poisoned");
            for hash in removed.iter() {
                if view.coins(hash).is_none() {
                    coins_batch.remove(&hash.0[..]);
                    coin_cache.pop(hash);
                }
            }
            for (hash, coins) in view.to_sorted_vec() {
                if coins.is_empty() {
                    coins_batch.remove(&hash.0[..]);
                    coin_cache.pop(hash);
                } else {
                    let raw = coins.bitcoin_serialize_to_vec()?;
                    coin_cache.put(*hash, Bytes::copy_from_slice(&raw));
                    coins_batch.insert(&hash.0[..], raw);
                }
            }
        }
        self.coins_by_tx.apply_batch(coins_batch)?;

        self.next_by_hash.remove(&entry.previous_block_hash().0)?;
        self.hash_by_height.remove(&entry.height.0.to_be_bytes())?;
        self.undo_by_hash.remove(&entry.hash.0)?;
        self.meta.insert(b"tip", entry.previous_block_hash().0.to_vec())?;

        self.caches
            .heights
            .lock()
            .expect("height cache lock is not poisoned")
            .pop(&entry.height);
        *self.tip.lock().expect("tip lock is not poisoned") = entry.previous_block_hash();

        self.db.flush()?;

        metrics::counter!("state.disconnected.block.count", 1);
        debug!(hash = %entry.hash, height = entry.height.0, "disconnected block");
        Ok(block)
    }

    /// Schedule this block's body and undo record for deletion once it is
    /// `keep_blocks` deep, and process anything scheduled for the current
    /// height.
    fn enqueue_prune(&self, entry: &ChainEntry) -> Result<(), StateError> {
        if entry.height.0 <= self.network.prune_after_height {
            return Ok(());
        }
        let due_height = entry.height.0.saturating_add(self.network.keep_blocks);
        self.prune_queue
            .insert(&due_height.to_be_bytes(), entry.hash.0.to_vec())?;

        if let Some(raw) = self.prune_queue.get(&entry.height.0.to_be_bytes())? {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&raw);
            let victim = block::Hash(bytes);
            self.block_by_hash.remove(&victim.0)?;
            self.undo_by_hash.remove(&victim.0)?;
            self.prune_queue.remove(&entry.height.0.to_be_bytes())?;
            debug!(hash = %victim, at_height = entry.height.0, "pruned block body and undo data");
        }
        Ok(())
    }

    /// A block locator for the current main chain: dense near the tip,
    /// backing off exponentially to genesis.
    pub fn block_locator(&self) -> Result<Vec<block::Hash>, StateError> {
        let tip = self.tip_entry()?;
        let heights = crate::util::block_locator_heights(tip.height);
        let mut hashes = Vec::with_capacity(heights.len());
        for height in heights {
            if let Some(hash) = self.hash_at(height)? {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }

    /// Up to `max` ancestors of `entry` (starting with `entry` itself),
    /// walking the parent links through the cache.
    pub fn ancestors(
        &self,
        entry: &ChainEntry,
        max: usize,
    ) -> Result<Vec<Arc<ChainEntry>>, StateError> {
        let mut ancestors = Vec::new();
        let mut cursor = Arc::new(entry.clone());
        loop {
            if ancestors.len() >= max {
                break;
            }
            ancestors.push(cursor.clone());
            if cursor.height.0 == 0 {
                break;
            }
            cursor = self
                .entry(cursor.previous_block_hash().into())?
                .ok_or(StateError::Corrupt("entry chain has a missing parent"))?;
        }
        Ok(ancestors)
    }

    /// The ancestor of `entry` at exactly `height`.
    pub fn ancestor_at(
        &self,
        entry: &ChainEntry,
        height: block::Height,
    ) -> Result<Option<Arc<ChainEntry>>, StateError> {
        if height > entry.height {
            return Ok(None);
        }
        let mut cursor = Arc::new(entry.clone());
        while cursor.height > height {
            cursor = self
                .entry(cursor.previous_block_hash().into())?
                .ok_or(StateError::Corrupt("entry chain has a missing parent"))?;
        }
        Ok(Some(cursor))
    }

    /// The median of the last `MEDIAN_TIMESPAN` timestamps ending at
    /// `entry` (inclusive).
    pub fn median_time_past(&self, entry: &ChainEntry) -> Result<DateTime<Utc>, StateError> {
        let ancestors = self.ancestors(entry, MEDIAN_TIMESPAN)?;
        let mut times: Vec<DateTime<Utc>> = ancestors
            .iter()
            .map(|ancestor| ancestor.header.time)
            .collect();
        times.sort();
        Ok(times[times.len() / 2])
    }
}
