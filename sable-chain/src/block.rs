//! Blocks and block-related structures (heights, headers, etc.)
#![allow(clippy::unit_arg)]

mod hash;
mod header;
mod height;
mod serialize;

pub mod merkle;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

use std::{fmt, sync::Arc};

pub use hash::Hash;
pub use header::BlockTimeError;
pub use header::Header;
pub use height::Height;
pub use merkle::MerkleBlock;
pub use serialize::{MAX_BLOCK_BYTES, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT};

use crate::{fmt::DisplayToDebug, transaction, transaction::Transaction, transparent};

/// A Bitcoin block, containing a header and a list of transactions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The block header, containing block metadata.
    pub header: Header,
    /// The block transactions.
    pub transactions: Vec<Arc<Transaction>>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fmter = f.debug_struct("Block");
        if let Some(height) = self.coinbase_height() {
            fmter.field("height", &height);
        }

        fmter.field("hash", &DisplayToDebug(self.hash())).finish()
    }
}

impl Block {
    /// Return the block height reported in the coinbase transaction, if any.
    ///
    /// The height is parsed from the BIP34 height push in the coinbase data,
    /// so blocks mined before BIP34 activation may not report one.
    pub fn coinbase_height(&self) -> Option<Height> {
        self.transactions
            .get(0)
            .and_then(|tx| tx.inputs.get(0))
            .and_then(|input| match input {
                transparent::Input::Coinbase { ref height, .. } => *height,
                _ => None,
            })
    }

    /// Compute the hash of this block.
    pub fn hash(&self) -> Hash {
        Hash::from(self)
    }

    /// The hash of every transaction in this block, in block order.
    pub fn transaction_hashes(&self) -> Vec<transaction::Hash> {
        self.transactions.iter().map(|tx| tx.hash()).collect()
    }

    /// Every outpoint spent by this block's non-coinbase inputs.
    ///
    /// This is the read set a `CoinView` must be seeded with before the
    /// block can be verified and connected.
    pub fn spent_outpoints(&self) -> Vec<transparent::OutPoint> {
        self.transactions
            .iter()
            .flat_map(|tx| tx.inputs.iter())
            .filter_map(transparent::Input::outpoint)
            .collect()
    }

    /// The BIP141 weight of this block.
    pub fn weight(&self) -> u64 {
        let overhead = Header::len() + crate::CompactInt::size(self.transactions.len());
        4 * overhead as u64
            + self
                .transactions
                .iter()
                .map(|tx| tx.weight())
                .sum::<u64>()
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        (&block.header).into()
    }
}
