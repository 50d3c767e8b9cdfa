//! The in-memory UTXO overlay used while connecting a block.

use std::collections::HashMap;

use crate::{block::Height, transaction, transaction::Transaction, transparent::OutPoint};

use super::{Coin, Coins, UndoCoins};

/// A scratchpad UTXO view for block connection.
///
/// Reads resolve against the bundles loaded into the view; spends and new
/// outputs accumulate here, and only the net change is persisted. Every
/// spend records the coin's pre-spend state, so the view's undo list is
/// sufficient to reverse the block.
#[derive(Debug, Default)]
pub struct CoinView {
    coins: HashMap<transaction::Hash, Coins>,
    undo: UndoCoins,
}

impl CoinView {
    pub fn new() -> CoinView {
        CoinView::default()
    }

    /// Seed the view with a bundle loaded from storage.
    pub fn add(&mut self, hash: transaction::Hash, coins: Coins) {
        self.coins.insert(hash, coins);
    }

    /// Index the outputs of a newly connected transaction.
    pub fn add_tx(&mut self, tx: &Transaction, height: Option<Height>) {
        self.coins.insert(tx.hash(), Coins::from_tx(tx, height));
    }

    /// The bundle for a transaction, if the view holds one.
    pub fn coins(&self, hash: &transaction::Hash) -> Option<&Coins> {
        self.coins.get(hash)
    }

    /// The unspent coin at `outpoint`, if the view holds one.
    pub fn get(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(&outpoint.hash)?.coin(outpoint.index)
    }

    /// Returns true if the view holds an unspent coin at `outpoint`.
    pub fn has(&self, outpoint: &OutPoint) -> bool {
        self.coins
            .get(&outpoint.hash)
            .map(|coins| coins.is_unspent(outpoint.index))
            .unwrap_or(false)
    }

    /// Spend the coin at `outpoint`, recording its pre-spend state in the
    /// undo list. Returns `None` (and records nothing) if the coin is
    /// missing or already spent.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        let coin = self.coins.get_mut(&outpoint.hash)?.spend(outpoint.index)?;
        self.undo.push(*outpoint, coin.clone());
        Some(coin)
    }

    /// Put a coin back, creating the bundle if necessary. Used when
    /// disconnecting blocks.
    pub fn restore(&mut self, outpoint: OutPoint, coin: Coin) {
        let bundle = self
            .coins
            .entry(outpoint.hash)
            .or_insert_with(|| Coins::empty(coin.version, coin.height, coin.coinbase));
        bundle.restore(outpoint.index, coin);
    }

    /// Remove a transaction's bundle outright. Used when disconnecting the
    /// block that created it.
    pub fn remove(&mut self, hash: &transaction::Hash) -> Option<Coins> {
        self.coins.remove(hash)
    }

    /// Returns true when every non-coinbase input of `tx` resolves to an
    /// unspent coin in this view.
    pub fn fill_coins(&self, tx: &Transaction) -> bool {
        tx.inputs
            .iter()
            .filter_map(|input| input.outpoint())
            .all(|outpoint| self.has(&outpoint))
    }

    /// The undo records accumulated by `spend`, in spend order.
    pub fn undo(&self) -> &UndoCoins {
        &self.undo
    }

    /// Take the undo records, leaving the view's coin state intact.
    pub fn take_undo(&mut self) -> UndoCoins {
        std::mem::take(&mut self.undo)
    }

    /// The touched bundles, sorted by transaction hash.
    ///
    /// Iteration order does not affect correctness, but a deterministic
    /// order keeps test assertions and batch layouts reproducible.
    pub fn to_sorted_vec(&self) -> Vec<(&transaction::Hash, &Coins)> {
        let mut entries: Vec<_> = self.coins.iter().collect();
        entries.sort_by_key(|(hash, _)| hash.0);
        entries
    }

    /// The number of bundles in the view.
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
