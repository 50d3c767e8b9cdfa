//! Transactions and transaction-related structures.

use chrono::{DateTime, Utc};

use crate::{
    amount::{Amount, Error as AmountError, NonNegative},
    block,
    cached::Cached,
    compactint::CompactInt,
    transparent,
    transparent::{Script, ScriptClass},
};

mod hash;
mod lock_time;
mod serialize;
mod sighash;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

pub use hash::Hash;
pub use lock_time::LockTime;
pub use serialize::MAX_TX_SIZE;
pub use sighash::{SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_SINGLE};

/// The BIP141 witness scale factor: non-witness bytes weigh four times as
/// much as witness bytes.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// A Bitcoin transaction.
///
/// A transaction is an encoded data structure that facilitates the transfer
/// of value. Everything is designed to ensure that transactions can be
/// created, propagated on the network, validated, and finally added to the
/// global ledger of transactions (the blockchain).
///
/// Every transaction has two identifying hashes: the txid, computed over the
/// legacy encoding without witnesses, and the wtxid, computed over the full
/// BIP144 encoding. For transactions without witness data they coincide.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction version. Versions greater than 1 mean that BIP 68
    /// applies.
    pub version: u32,
    /// The transaction inputs.
    pub inputs: Vec<transparent::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transparent::Output>,
    /// The earliest block height or time this transaction can be mined.
    pub lock_time: LockTime,
    hash: Cached<Hash>,
    wtxid: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        lock_time: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
            wtxid: Cached::new(),
        }
    }

    /// Get the hash (txid) of this transaction.
    ///
    /// The txid never covers witness data.
    pub fn hash(&self) -> Hash {
        // If we have a cached version, just return that
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        // Otherwise, serialize the tx to calculate and return the hash
        Hash::from(self)
    }

    /// Get the witness hash (wtxid) of this transaction.
    ///
    /// Equal to the txid when the transaction carries no witness data.
    pub fn wtxid(&self) -> Hash {
        if !self.has_witness() {
            return self.hash();
        }
        if let Some(wtxid) = self.wtxid.value() {
            return wtxid;
        }
        serialize::witness_hash(self)
    }

    /// Returns true if any input carries a non-empty witness stack.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness().is_empty())
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs.iter().any(transparent::Input::is_coinbase)
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Returns true if this transaction can be included in a block at
    /// `height` whose median-time-past is `median_time`.
    ///
    /// A lock time only binds while at least one input's sequence number is
    /// not final.
    pub fn is_final(&self, height: block::Height, median_time: DateTime<Utc>) -> bool {
        if self.lock_time.is_unlocked() {
            return true;
        }
        let lock_passed = match self.lock_time {
            LockTime::Height(lock_height) => lock_height < height,
            LockTime::Time(lock_time) => lock_time < median_time,
        };
        lock_passed
            || self
                .inputs
                .iter()
                .all(|input| input.sequence() == transparent::SEQUENCE_FINAL)
    }

    /// The sum of this transaction's output values.
    pub fn value_out(&self) -> Result<Amount<NonNegative>, AmountError> {
        let mut total = Amount::zero();
        for output in self.outputs.iter() {
            total = (total + output.value)?;
        }
        Ok(total)
    }

    /// Returns the serialized length (in bytes) of the transaction without
    /// witness data.
    pub fn base_len(&self) -> usize {
        let mut size = 4;
        size += CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.len();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.len();
        }
        size + 4
    }

    /// Returns the full serialized length (in bytes) of the transaction,
    /// including the witness marker, flag, and stacks when present.
    pub fn len(&self) -> usize {
        if !self.has_witness() {
            return self.base_len();
        }
        self.base_len()
            + 2
            + self
                .inputs
                .iter()
                .map(|input| input.witness().serialized_size())
                .sum::<usize>()
    }

    /// The BIP141 transaction weight.
    pub fn weight(&self) -> u64 {
        let base = self.base_len() as u64;
        let total = self.len() as u64;
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    /// The virtual size used for fee-rate computations: weight scaled back
    /// to byte units, rounding up.
    pub fn vsize(&self) -> u64 {
        (self.weight() + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
    }

    /// The witness-scaled signature-operation cost of this transaction.
    ///
    /// Legacy and P2SH sigops weigh `WITNESS_SCALE_FACTOR` each; witness
    /// sigops weigh one. `spent_output` resolves the output locked by each
    /// input's outpoint; inputs that fail to resolve contribute only their
    /// legacy sigops, and the caller decides whether that is an error.
    pub fn sigop_cost<F>(&self, spent_output: F) -> u64
    where
        F: Fn(&transparent::OutPoint) -> Option<transparent::Output>,
    {
        let mut legacy: u64 = self
            .outputs
            .iter()
            .map(|output| output.lock_script.sigops(false))
            .sum();
        for input in self.inputs.iter() {
            if let transparent::Input::PrevOut { unlock_script, .. } = input {
                legacy += unlock_script.sigops(false);
            }
        }
        let mut cost = legacy * WITNESS_SCALE_FACTOR;

        for input in self.inputs.iter() {
            let (outpoint, unlock_script, witness) = match input {
                transparent::Input::PrevOut {
                    outpoint,
                    unlock_script,
                    witness,
                    ..
                } => (outpoint, unlock_script, witness),
                transparent::Input::Coinbase { .. } => continue,
            };
            let coin_script = match spent_output(outpoint) {
                Some(output) => output.lock_script,
                None => continue,
            };

            // P2SH redeem scripts are counted accurately and scaled like
            // legacy sigops.
            let redeem = if coin_script.script_hash().is_some() && unlock_script.is_push_only() {
                unlock_script.last_push().map(Script)
            } else {
                None
            };
            if let Some(ref redeem) = redeem {
                cost += redeem.sigops(true) * WITNESS_SCALE_FACTOR;
            }

            // Witness sigops are unscaled. A witness program can appear
            // directly in the spent output, or nested in the P2SH redeem.
            let witness_target = redeem.as_ref().unwrap_or(&coin_script);
            match witness_target.class() {
                ScriptClass::WitnessPubKeyHash => cost += 1,
                ScriptClass::WitnessScriptHash => {
                    if let Some(script) = witness.witness_script() {
                        cost += Script(script.to_vec()).sigops(true);
                    }
                }
                _ => {}
            }
        }
        cost
    }
}
