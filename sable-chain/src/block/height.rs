use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The height of a block is the length of the chain back to the genesis
/// block (whose height is zero).
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Height(pub u32);

impl Height {
    /// The minimum `Height`: the genesis block.
    pub const MIN: Height = Height(0);

    /// The maximum `Height`.
    ///
    /// Users should not construct heights above this value; it is the
    /// largest height distinguishable from a time-based lock time.
    pub const MAX: Height = Height(499_999_999);

    /// Add to this height, returning `None` on overflow past `Height::MAX`.
    pub fn checked_add(self, rhs: u32) -> Option<Height> {
        match self.0.checked_add(rhs) {
            Some(result) if result <= Height::MAX.0 => Some(Height(result)),
            _ => None,
        }
    }

    /// Subtract from this height, returning `None` below the genesis height.
    pub fn checked_sub(self, rhs: u32) -> Option<Height> {
        self.0.checked_sub(rhs).map(Height)
    }
}

impl BitcoinSerialize for Height {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for Height {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::bitcoin_deserialize(reader)?))
    }
}
