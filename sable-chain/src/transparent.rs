//! Transparent-related (Bitcoin-inherited) functionality.
#![allow(clippy::unit_arg)]

mod script;
mod serialize;
mod witness;

pub use script::{Script, ScriptClass};
pub use serialize::coinbase_height_data;
pub use witness::Witness;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;

use crate::compactint::CompactInt;
use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use sable_serde_derive::{BtcDeserialize, BtcSerialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::{
    amount::{Amount, NonNegative},
    block, transaction,
};

/// The sequence number that makes an input final and disables its locks.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// BIP68: when set, the sequence number carries no relative-lock meaning.
pub const SEQUENCE_DISABLE_FLAG: u32 = 1 << 31;

/// BIP68: when set, the relative lock is measured in 512-second units
/// instead of blocks.
pub const SEQUENCE_TYPE_FLAG: u32 = 1 << 22;

/// BIP68: the mask of the relative-lock value bits.
pub const SEQUENCE_MASK: u32 = 0x0000_ffff;

/// BIP68: time-based relative locks have 2^9 = 512 second granularity.
pub const SEQUENCE_GRANULARITY: u32 = 9;

/// Arbitrary data inserted by miners into a coinbase transaction.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, BtcDeserialize, BtcSerialize)]
pub struct CoinbaseData(
    /// Invariant: this vec must be at most 100 bytes; deserialization
    /// rejects longer data fields.
    pub(super) Vec<u8>,
);

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl CoinbaseData {
    pub fn new(data: Vec<u8>) -> CoinbaseData {
        CoinbaseData(data)
    }

    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The null outpoint that marks a coinbase input.
    pub const fn null() -> OutPoint {
        OutPoint {
            hash: transaction::Hash([0; 32]),
            index: 0xffff_ffff,
        }
    }

    /// Returns true if this is the null coinbase marker.
    pub fn is_null(&self) -> bool {
        *self == OutPoint::null()
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        /// The sequence number for the input.
        sequence: u32,
        /// The segregated witness stack for the input.
        ///
        /// Not part of the input's own serialization; witness-bearing
        /// transactions carry the stacks in a separate trailing section.
        witness: Witness,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// The height of this block, parsed from the BIP34 height push at
        /// the front of the coinbase data when present.
        height: Option<block::Height>,
        /// Free data inserted by miners. Includes the block height post
        /// BIP34.
        data: CoinbaseData,
        /// The sequence number for the input.
        sequence: u32,
        /// The witness reserved value, after SegWit.
        witness: Witness,
    },
}

impl Input {
    /// The outpoint spent by this input, or `None` for a coinbase input.
    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    pub fn sequence(&self) -> u32 {
        match self {
            Input::PrevOut { sequence, .. } => *sequence,
            Input::Coinbase { sequence, .. } => *sequence,
        }
    }

    pub fn witness(&self) -> &Witness {
        match self {
            Input::PrevOut { witness, .. } => witness,
            Input::Coinbase { witness, .. } => witness,
        }
    }

    pub fn set_witness(&mut self, new_witness: Witness) {
        match self {
            Input::PrevOut { witness, .. } => *witness = new_witness,
            Input::Coinbase { witness, .. } => *witness = new_witness,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self, Input::Coinbase { .. })
    }

    /// Returns the serialized length (in bytes) of this input, excluding
    /// any witness data.
    pub fn len(&self) -> usize {
        match *self {
            Input::PrevOut {
                ref unlock_script, ..
            } => OutPoint::len() + unlock_script.serialized_size() + 4,
            Input::Coinbase { ref data, .. } => OutPoint::len() + data.serialized_size() + 4,
        }
    }
}

/// A transparent output from a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the coins you "own" are in fact a subset of unspent transaction
/// outputs (or "UTXO"s) of the global UTXO set.
///
/// UTXOs are indivisible, discrete units of value which can only be
/// consumed in their entirety.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct Output {
    /// Transaction value.
    pub value: Amount<NonNegative>,

    /// The lock script defines the conditions under which this output can be
    /// spent.
    pub lock_script: Script,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}
