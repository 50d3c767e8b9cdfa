//! Transaction serialization: the legacy encoding and the BIP144
//! marker/flag witness encoding.

use std::{io, sync::Arc};

use crate::block::MAX_BLOCK_BYTES;
use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::CompactInt;

use super::*;
use crate::cached::Cached;
use crate::transparent;
use crate::transparent::{Input, Witness};

/// The maximum size of a transaction, excluding its witness data.
pub const MAX_TX_SIZE: u64 = 1_000_000;

/// The BIP144 marker byte: a zero where the legacy encoding would place a
/// nonzero input count.
const WITNESS_MARKER: u8 = 0x00;

/// The only currently-defined BIP144 flag value.
const WITNESS_FLAG: u8 = 0x01;

impl Transaction {
    /// Serialize this transaction in the legacy (witness-free) encoding.
    ///
    /// This is the encoding the txid commits to.
    pub fn serialize_without_witness<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut writer)?;
        self.inputs.bitcoin_serialize(&mut writer)?;
        self.outputs.bitcoin_serialize(&mut writer)?;
        self.lock_time.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

/// Compute the wtxid by hashing the full witness encoding.
pub(super) fn witness_hash(transaction: &Transaction) -> Hash {
    let mut hash_writer = sha256d::Writer::default();
    transaction
        .bitcoin_serialize(&mut hash_writer)
        .expect("Transactions must serialize into the hash writer");
    Hash(hash_writer.finish())
}

impl BitcoinSerialize for Transaction {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        if !self.has_witness() {
            return self.serialize_without_witness(writer);
        }
        self.version.bitcoin_serialize(&mut writer)?;
        writer.write_all(&[WITNESS_MARKER, WITNESS_FLAG])?;
        self.inputs.bitcoin_serialize(&mut writer)?;
        self.outputs.bitcoin_serialize(&mut writer)?;
        for input in self.inputs.iter() {
            input.witness().bitcoin_serialize(&mut writer)?;
        }
        self.lock_time.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

/// Deserializes a transaction, calculating and caching its txid (and wtxid,
/// when witness data is present).
impl BitcoinDeserialize for Transaction {
    fn bitcoin_deserialize<R: std::io::Read>(src: R) -> Result<Self, SerializationError> {
        // Put a sanity limit on the total read to protect against DOS
        // attacks; witness transactions can legitimately exceed the legacy
        // 1 MB bound, but never a whole block.
        let mut src = src.take(MAX_BLOCK_BYTES);
        let version = u32::bitcoin_deserialize(&mut src)?;

        let lead_count = CompactInt::bitcoin_deserialize(&mut src)?.value();
        let mut witness_encoded = false;
        let input_count = if lead_count == 0 {
            // A zero input count is the BIP144 witness marker; the flag
            // byte and real input count follow.
            let flag = u8::bitcoin_deserialize(&mut src)?;
            if flag != WITNESS_FLAG {
                return Err(SerializationError::Parse("invalid witness flag"));
            }
            witness_encoded = true;
            CompactInt::bitcoin_deserialize(&mut src)?.value()
        } else {
            lead_count
        };

        let blind_alloc_limit = 1024;
        let mut inputs: Vec<Input> =
            Vec::with_capacity(std::cmp::min(input_count as usize, blind_alloc_limit));
        for _ in 0..input_count {
            inputs.push(Input::bitcoin_deserialize(&mut src)?);
        }
        let outputs = <Vec<transparent::Output>>::bitcoin_deserialize(&mut src)?;

        if witness_encoded {
            for input in inputs.iter_mut() {
                input.set_witness(Witness::bitcoin_deserialize(&mut src)?);
            }
        }
        let lock_time = LockTime::bitcoin_deserialize(&mut src)?;

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: Cached::new(),
            wtxid: Cached::new(),
        };

        // The witness encoding is only allowed to appear when it carries
        // data; otherwise the txid would be malleable.
        if witness_encoded && !tx.has_witness() {
            return Err(SerializationError::Parse("superfluous witness record"));
        }

        // Calculate and cache the txid and wtxid.
        let own_hash = tx.hash();
        tx.hash = Cached::from(own_hash);
        let own_wtxid = tx.wtxid();
        tx.wtxid = Cached::from(own_wtxid);
        Ok(tx)
    }
}

impl<T> BitcoinDeserialize for Arc<T>
where
    T: BitcoinDeserialize,
{
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Arc::new(T::bitcoin_deserialize(reader)?))
    }
}

impl<T> BitcoinSerialize for Arc<T>
where
    T: BitcoinSerialize,
{
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        T::bitcoin_serialize(self, writer)
    }
}
