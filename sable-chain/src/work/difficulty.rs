//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target threshold" is stored in the block header as a
//! 32-bit `CompactDifficulty` (the Bitcoin nBits format). The `block::Hash`
//! must be less than or equal to the `ExpandedDifficulty` threshold, when
//! both are interpreted as 256-bit integers in little-endian byte order.

use std::{cmp::Ordering, fmt};

use primitive_types::U256;

use crate::{block, parameters::Network, BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A 32-bit "compact bits" value, exactly as it appears in the block header.
///
/// The compact format is a base-256 floating point encoding: one exponent
/// byte followed by a 23-bit mantissa and a sign bit. Negative and zero
/// targets are invalid in every context where a `CompactDifficulty` is used.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

/// The mantissa of a `CompactDifficulty`, without its sign bit.
const UNSIGNED_MANTISSA_MASK: u32 = 0x007f_ffff;

/// The sign bit of a `CompactDifficulty` mantissa.
const SIGN_BIT: u32 = 0x0080_0000;

/// The exponent offset: a mantissa with exponent 3 is its own value.
const OFFSET: i32 = 3;

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

impl CompactDifficulty {
    /// Expand this nBits value into a 256-bit target threshold.
    ///
    /// Returns `None` for negative, zero, or overflowing encodings, which
    /// are invalid in block headers.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        if self.0 & SIGN_BIT != 0 {
            return None;
        }
        let mantissa = self.0 & UNSIGNED_MANTISSA_MASK;
        if mantissa == 0 {
            return None;
        }
        let exponent = (self.0 >> 24) as i32;

        let result = if exponent <= OFFSET {
            U256::from(mantissa >> (8 * (OFFSET - exponent) as u32))
        } else {
            let shift = 8 * (exponent - OFFSET) as usize;
            if shift > 255 {
                return None;
            }
            let value = U256::from(mantissa) << shift;
            // A mantissa shifted off the top of a U256 is an overflow.
            if (value >> shift) != U256::from(mantissa) {
                return None;
            }
            value
        };

        if result.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(result))
        }
    }

    /// Calculate the proof of work of a block with this difficulty threshold.
    ///
    /// `work = floor(2^256 / (expanded + 1))`.
    pub fn to_work(self) -> Option<Work> {
        self.to_expanded().and_then(ExpandedDifficulty::to_work)
    }
}

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}

/// A 256-bit target threshold.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExpandedDifficulty(U256);

impl fmt::Debug for ExpandedDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut buf = [0u8; 32];
        // Use the same byte order as `block::Hash`'s debug output.
        self.0.to_big_endian(&mut buf);
        f.debug_tuple("ExpandedDifficulty")
            .field(&hex::encode(&buf))
            .finish()
    }
}

impl ExpandedDifficulty {
    /// Returns the easiest target allowed on `network` (the "PoW limit").
    pub fn target_difficulty_limit(network: Network) -> ExpandedDifficulty {
        network
            .params()
            .pow_limit_bits
            .to_expanded()
            .expect("hard-coded PoW limit expands")
    }

    /// Calculate the proof of work required to produce a hash at or below
    /// this threshold, saturating at the maximum representable work.
    pub fn to_work(self) -> Option<Work> {
        let target = self.0;
        // `work = floor(2^256 / (target + 1))`, computed without overflowing
        // 256 bits as `(!target / (target + 1)) + 1`.
        let divisor = target.checked_add(U256::one())?;
        Some(Work((!target / divisor) + U256::one()))
    }

    /// Re-encode this threshold as compact nBits, truncating the mantissa.
    pub fn to_compact(self) -> CompactDifficulty {
        let target = self.0;
        let mut size = (target.bits() + 7) / 8;
        let mut compact: u64 = if size <= 3 {
            target.low_u64() << (8 * (3 - size))
        } else {
            (target >> (8 * (size - 3))).low_u64()
        };
        // A mantissa with its high bit set would read back as negative.
        if compact & SIGN_BIT as u64 != 0 {
            compact >>= 8;
            size += 1;
        }
        CompactDifficulty((compact as u32 & UNSIGNED_MANTISSA_MASK) | ((size as u32) << 24))
    }
}

impl From<U256> for ExpandedDifficulty {
    fn from(value: U256) -> Self {
        ExpandedDifficulty(value)
    }
}

impl From<ExpandedDifficulty> for U256 {
    fn from(value: ExpandedDifficulty) -> Self {
        value.0
    }
}

impl PartialEq<block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &block::Hash) -> bool {
        other == self
    }
}

impl PartialOrd<block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &block::Hash) -> Option<Ordering> {
        other.partial_cmp(self).map(Ordering::reverse)
    }
}

impl PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        U256::from_little_endian(&self.0) == other.0
    }
}

impl PartialOrd<ExpandedDifficulty> for block::Hash {
    /// Block hashes are interpreted as 256-bit integers in little-endian
    /// byte order, then compared against the expanded target.
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<Ordering> {
        Some(U256::from_little_endian(&self.0).cmp(&other.0))
    }
}

/// Accumulated proof of work.
///
/// Sums of `Work` saturate at `U256::MAX` rather than wrapping, so the
/// comparison order of chain tips is preserved even in the absurd case.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Work(U256);

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Work")
            .field(&format_args!("{}", self.0))
            .finish()
    }
}

impl Work {
    /// The zero work value, used before genesis.
    pub fn zero() -> Work {
        Work(U256::zero())
    }

    /// The 32-byte little-endian representation, used for storage.
    pub fn to_bytes(self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.0.to_little_endian(&mut buf);
        buf
    }

    /// Reconstruct a work value from its storage representation.
    pub fn from_bytes(bytes: [u8; 32]) -> Work {
        Work(U256::from_little_endian(&bytes))
    }
}

impl std::ops::Add for Work {
    type Output = Work;

    fn add(self, rhs: Work) -> Work {
        let (sum, overflowed) = self.0.overflowing_add(rhs.0);
        if overflowed {
            Work(U256::MAX)
        } else {
            Work(sum)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The genesis nBits on mainnet.
    const GENESIS_BITS: CompactDifficulty = CompactDifficulty(0x1d00ffff);

    #[test]
    fn expand_genesis_bits() {
        let expanded = GENESIS_BITS.to_expanded().expect("genesis bits expand");
        let expected = U256::from(0xffffu64) << (8 * (0x1d - 3));
        assert_eq!(U256::from(expanded), expected);
        assert_eq!(expanded.to_compact(), GENESIS_BITS);
    }

    #[test]
    fn negative_and_zero_encodings_are_invalid() {
        assert_eq!(CompactDifficulty(0).to_expanded(), None);
        assert_eq!(CompactDifficulty(0x00123456).to_expanded(), None);
        assert_eq!(CompactDifficulty(0x01803456).to_expanded(), None);
        assert_eq!(CompactDifficulty(0x04923456).to_expanded(), None);
    }

    #[test]
    fn genesis_work() {
        // target = 0xffff << 208, work = floor(2^256 / (target + 1)) = 0x100010001
        let work = GENESIS_BITS.to_work().expect("genesis bits have work");
        assert_eq!(work, Work(U256::from(0x1_0001_0001u64)));
    }

    #[test]
    fn work_saturates() {
        let max = Work(U256::MAX);
        let one = Work(U256::one());
        assert_eq!(max + one, max);
    }

    #[test]
    fn hash_target_ordering() {
        let hash = block::Hash([0xff; 32]);
        let target = CompactDifficulty(0x1d00ffff).to_expanded().unwrap();
        assert!(hash > target);

        let easy_hash = block::Hash([0; 32]);
        assert!(easy_hash < target);
    }
}
