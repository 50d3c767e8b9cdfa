//! Pool entries: a transaction with its admission context.

use std::io;
use std::sync::Arc;

use sable_chain::{
    block::Height, transaction, transaction::Transaction, BitcoinDeserialize, BitcoinSerialize,
    SerializationError,
};

use crate::policy::FREE_THRESHOLD;

/// A transaction resident in the pool.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    /// The transaction itself.
    pub tx: Arc<Transaction>,
    /// Cached `tx.hash()`.
    pub hash: transaction::Hash,
    /// The chain height when the entry was admitted.
    pub height: Height,
    /// Virtual size, in vbytes.
    pub size: u64,
    /// The priority at admission: sum of input value times input age,
    /// scaled by size.
    pub priority: f64,
    /// The fee paid, in satoshis.
    pub fee: i64,
    /// Receive time, in Unix seconds.
    pub time: i64,
    /// The total input value, in satoshis. Priority grows with this as the
    /// chain advances.
    pub value: i64,
    /// This entry plus all its in-pool descendants.
    pub desc_count: usize,
    /// Aggregate virtual size of this entry and its in-pool descendants.
    pub desc_size: u64,
    /// Aggregate fees of this entry and its in-pool descendants.
    pub desc_fee: i64,
    /// Whether this transaction spends outputs of other pool transactions.
    pub dependencies: bool,
}

impl MempoolEntry {
    /// The fee rate in satoshis per 1000 vbytes, rounded down.
    pub fn fee_rate(&self) -> i64 {
        if self.size == 0 {
            return 0;
        }
        self.fee * 1000 / self.size as i64
    }

    /// The priority this entry has reached by `height`: inputs age as the
    /// chain advances.
    pub fn priority_at(&self, height: Height) -> f64 {
        let delta = height.0.saturating_sub(self.height.0) as f64;
        let gained = if self.size == 0 {
            0.0
        } else {
            delta * self.value as f64 / self.size as f64
        };
        self.priority + gained
    }

    /// Whether this entry's priority exempts it from the minimum relay fee.
    pub fn is_free(&self, height: Height) -> bool {
        self.priority_at(height) > FREE_THRESHOLD
    }

    /// The pool's memory-usage estimate for this entry.
    pub fn memory_usage(&self) -> u64 {
        // Transaction bytes plus map/index overhead.
        self.tx.len() as u64 + 160
    }
}

/// Entries serialize for pool persistence across restarts: the transaction
/// followed by its admission context. Descendant aggregates are rebuilt on
/// load, so only the entry's own totals are stored.
impl BitcoinSerialize for MempoolEntry {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.tx.bitcoin_serialize(&mut writer)?;
        self.height.bitcoin_serialize(&mut writer)?;
        self.size.bitcoin_serialize(&mut writer)?;
        self.priority.to_bits().bitcoin_serialize(&mut writer)?;
        self.fee.bitcoin_serialize(&mut writer)?;
        self.time.bitcoin_serialize(&mut writer)?;
        self.value.bitcoin_serialize(&mut writer)?;
        self.dependencies.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for MempoolEntry {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let tx = <Arc<Transaction>>::bitcoin_deserialize(&mut reader)?;
        let hash = tx.hash();
        let height = Height::bitcoin_deserialize(&mut reader)?;
        let size = u64::bitcoin_deserialize(&mut reader)?;
        let priority = f64::from_bits(u64::bitcoin_deserialize(&mut reader)?);
        let fee = i64::bitcoin_deserialize(&mut reader)?;
        let time = i64::bitcoin_deserialize(&mut reader)?;
        let value = i64::bitcoin_deserialize(&mut reader)?;
        let dependencies = bool::bitcoin_deserialize(&mut reader)?;
        Ok(MempoolEntry {
            tx,
            hash,
            height,
            size,
            priority,
            fee,
            time,
            value,
            desc_count: 1,
            desc_size: size,
            desc_fee: fee,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sable_chain::transaction::LockTime;

    fn entry(size: u64, fee: i64, value: i64, height: u32) -> MempoolEntry {
        let tx = Arc::new(Transaction::new(1, Vec::new(), Vec::new(), LockTime::unlocked()));
        let hash = tx.hash();
        MempoolEntry {
            tx,
            hash,
            height: Height(height),
            size,
            priority: 0.0,
            fee,
            time: 0,
            value,
            desc_count: 1,
            desc_size: size,
            desc_fee: fee,
            dependencies: false,
        }
    }

    #[test]
    fn fee_rate_is_per_kilo_vbyte() {
        assert_eq!(entry(250, 500, 0, 0).fee_rate(), 2000);
        assert_eq!(entry(1000, 999, 0, 0).fee_rate(), 999);
    }

    #[test]
    fn entry_round_trip() {
        use sable_chain::transparent::{Input, OutPoint, Output, Script, Witness, SEQUENCE_FINAL};
        use std::convert::TryInto;

        let tx = Arc::new(Transaction::new(
            1,
            vec![Input::PrevOut {
                outpoint: OutPoint {
                    hash: transaction::Hash([3; 32]),
                    index: 1,
                },
                unlock_script: Script(Vec::new()),
                sequence: SEQUENCE_FINAL,
                witness: Witness::default(),
            }],
            vec![Output {
                value: 90_000.try_into().unwrap(),
                lock_script: Script(vec![0x51]),
            }],
            LockTime::unlocked(),
        ));
        let entry = MempoolEntry {
            hash: tx.hash(),
            height: Height(42),
            size: tx.vsize(),
            priority: 1.5,
            fee: 10_000,
            time: 1_300_000_000,
            value: 100_000,
            desc_count: 1,
            desc_size: tx.vsize(),
            desc_fee: 10_000,
            dependencies: false,
            tx,
        };

        let bytes = entry.bitcoin_serialize_to_vec().unwrap();
        let parsed = MempoolEntry::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(parsed.hash, entry.hash);
        assert_eq!(parsed.tx, entry.tx);
        assert_eq!(parsed.height, entry.height);
        assert_eq!(parsed.size, entry.size);
        assert_eq!(parsed.priority.to_bits(), entry.priority.to_bits());
        assert_eq!(parsed.fee, entry.fee);
        assert_eq!(parsed.time, entry.time);
        assert_eq!(parsed.value, entry.value);
        assert_eq!(parsed.dependencies, entry.dependencies);

        // Byte-equality of the re-serialization.
        assert_eq!(parsed.bitcoin_serialize_to_vec().unwrap(), bytes);
    }

    #[test]
    fn priority_ages_with_the_chain() {
        let entry = entry(250, 0, 100_000_000_000, 100);
        assert!(!entry.is_free(Height(100)));
        // A day of regtest-speed blocks later, the inputs have aged into
        // the free threshold.
        assert!(entry.priority_at(Height(244)) > entry.priority_at(Height(101)));
        assert!(entry.is_free(Height(244)));
    }
}
