use std::io;

use chrono::{DateTime, TimeZone, Utc};

use crate::block::Height;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The raw lock-time value below which a lock time is interpreted as a
/// block height rather than a Unix timestamp.
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;

/// A transaction lock time: the earliest block height or time at which the
/// transaction may be mined.
///
/// The lock time is only enforced while at least one input's sequence
/// number is not final.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LockTime {
    /// Unlocked at a particular block height.
    Height(Height),
    /// Unlocked at a particular time.
    Time(DateTime<Utc>),
}

impl LockTime {
    /// The lock time of a transaction with no lock: raw value zero.
    pub fn unlocked() -> LockTime {
        LockTime::Height(Height(0))
    }

    /// Returns true if this is the zero ("no lock") value.
    pub fn is_unlocked(&self) -> bool {
        matches!(self, LockTime::Height(Height(0)))
    }

    /// The raw u32 wire value, needed for signature hashing.
    pub fn raw(&self) -> u32 {
        match self {
            LockTime::Height(height) => height.0,
            LockTime::Time(time) => time.timestamp() as u32,
        }
    }
}

impl Default for LockTime {
    fn default() -> LockTime {
        LockTime::unlocked()
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        // The inner values are already constrained to the correct ranges:
        // `Height::MAX` is below the threshold, and times below the
        // threshold cannot be constructed by deserialization.
        self.raw().bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if raw < LOCK_TIME_THRESHOLD {
            Ok(LockTime::Height(Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_splits_heights_and_times() {
        let height_bytes = (LOCK_TIME_THRESHOLD - 1).to_le_bytes();
        match LockTime::bitcoin_deserialize(&height_bytes[..]).unwrap() {
            LockTime::Height(height) => assert_eq!(height, Height(LOCK_TIME_THRESHOLD - 1)),
            other => panic!("expected a height lock: {:?}", other),
        }

        let time_bytes = LOCK_TIME_THRESHOLD.to_le_bytes();
        match LockTime::bitcoin_deserialize(&time_bytes[..]).unwrap() {
            LockTime::Time(time) => assert_eq!(time.timestamp(), LOCK_TIME_THRESHOLD as i64),
            other => panic!("expected a time lock: {:?}", other),
        }
    }
}
