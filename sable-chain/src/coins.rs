//! The per-transaction unspent-output ("coins") representation.
//!
//! The UTXO set is stored as one record per transaction: a `Coins` bundle
//! holding every still-unspent output of that transaction, in a compressed
//! encoding. Bundles read from storage keep their raw buffer and decode
//! individual outputs on demand, so validating a spend of one output from a
//! many-output transaction never decodes the rest of the bundle.

mod serialize;
mod undo;
mod view;

#[cfg(test)]
mod tests;

pub use undo::UndoCoins;
pub use view::CoinView;

use bytes::Bytes;

use crate::{block::Height, transaction::Transaction, transparent};

/// One unspent transaction output, resolved with its creation context.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// The version of the creating transaction.
    pub version: u32,
    /// The height of the block that confirmed the creating transaction, or
    /// `None` while unconfirmed.
    pub height: Option<Height>,
    /// Whether the creating transaction was a coinbase.
    pub coinbase: bool,
    /// The output itself.
    pub output: transparent::Output,
}

impl Coin {
    /// Returns true if this coin may be spent by a block at `spend_height`.
    ///
    /// Coinbase outputs are unspendable until `maturity` additional blocks
    /// have been connected above them.
    pub fn is_mature(&self, spend_height: Height, maturity: u32) -> bool {
        if !self.coinbase {
            return true;
        }
        match self.height {
            Some(born) => spend_height.0 >= born.0.saturating_add(maturity),
            None => false,
        }
    }
}

/// The slot for a single output inside a `Coins` bundle.
#[derive(Clone, Debug)]
enum Slot {
    /// The output was spent (or was never spendable).
    Spent,
    /// A decoded output.
    Cached(transparent::Output),
    /// A not-yet-decoded span of the bundle's raw buffer.
    Deferred { offset: usize, len: usize },
}

/// The unspent outputs of a single transaction.
#[derive(Clone, Debug)]
pub struct Coins {
    /// The version of the creating transaction.
    pub version: u32,
    /// The confirming block height, or `None` while unconfirmed.
    pub height: Option<Height>,
    /// Whether the creating transaction was a coinbase.
    pub coinbase: bool,
    slots: Vec<Slot>,
    /// The serialized form this bundle was parsed from, shared by its
    /// deferred slots. Empty for bundles built from a transaction.
    raw: Bytes,
}

impl Coins {
    /// Index the spendable outputs of a transaction.
    ///
    /// Provably unspendable outputs never enter the UTXO set: their slots
    /// are created pre-spent.
    pub fn from_tx(tx: &Transaction, height: Option<Height>) -> Coins {
        let slots = tx
            .outputs
            .iter()
            .map(|output| {
                if output.lock_script.is_unspendable() {
                    Slot::Spent
                } else {
                    Slot::Cached(output.clone())
                }
            })
            .collect();
        Coins {
            version: tx.version,
            height,
            coinbase: tx.is_coinbase(),
            slots,
            raw: Bytes::new(),
        }
    }

    /// An empty bundle, used as the base for restoring undo coins.
    pub fn empty(version: u32, height: Option<Height>, coinbase: bool) -> Coins {
        Coins {
            version,
            height,
            coinbase,
            slots: Vec::new(),
            raw: Bytes::new(),
        }
    }

    /// The number of output slots (spent or not) in this bundle.
    pub fn output_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the output at `index` exists and is unspent.
    pub fn is_unspent(&self, index: u32) -> bool {
        matches!(
            self.slots.get(index as usize),
            Some(Slot::Cached(_)) | Some(Slot::Deferred { .. })
        )
    }

    /// Returns true once every output in the bundle has been spent.
    ///
    /// Empty bundles are deleted from storage rather than persisted.
    pub fn is_empty(&self) -> bool {
        !self.slots.iter().any(|slot| !matches!(slot, Slot::Spent))
    }

    /// The coin at `index`, decoding a deferred slot on demand.
    pub fn coin(&self, index: u32) -> Option<Coin> {
        let output = self.decode_slot(self.slots.get(index as usize)?)?;
        Some(Coin {
            version: self.version,
            height: self.height,
            coinbase: self.coinbase,
            output,
        })
    }

    /// Spend the output at `index`, removing and returning it.
    pub fn spend(&mut self, index: u32) -> Option<Coin> {
        let coin = self.coin(index)?;
        self.slots[index as usize] = Slot::Spent;
        Some(coin)
    }

    /// Put a previously spent coin back into its slot, growing the bundle
    /// if the slot has been trimmed. Used when disconnecting blocks.
    pub fn restore(&mut self, index: u32, coin: Coin) {
        let index = index as usize;
        while self.slots.len() <= index {
            self.slots.push(Slot::Spent);
        }
        self.version = coin.version;
        self.height = coin.height;
        self.coinbase = coin.coinbase;
        self.slots[index] = Slot::Cached(coin.output);
    }

    fn decode_slot(&self, slot: &Slot) -> Option<transparent::Output> {
        match slot {
            Slot::Spent => None,
            Slot::Cached(output) => Some(output.clone()),
            Slot::Deferred { offset, len } => {
                let raw = &self.raw[*offset..*offset + *len];
                let (output, _) = serialize::decode_output_entry(raw)
                    .expect("deferred slots were validated by the initial scan");
                output
            }
        }
    }
}

/// Bundles are equal when they hold the same outputs in the same slots,
/// regardless of which slots are still deferred.
impl PartialEq for Coins {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.height == other.height
            && self.coinbase == other.coinbase
            && self.output_count() == other.output_count()
            && (0..self.output_count() as u32).all(|index| self.coin(index) == other.coin(index))
    }
}

impl Eq for Coins {}
