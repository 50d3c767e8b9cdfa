use std::fmt;

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use sable_serde_derive::BtcSerialize;
use serde::{Deserialize, Serialize};

use super::Transaction;

/// A transaction hash (txid).
///
/// Computed over the legacy transaction encoding, so it never covers
/// witness data; `Transaction::wtxid()` is the witness-inclusive hash.
///
/// Note: displayed hashes are in big-endian byte order, following the u256
/// convention set by Bitcoin; the internal byte order is the serialized one.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl From<&Transaction> for Hash {
    fn from(transaction: &Transaction) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        transaction
            .serialize_without_witness(&mut hash_writer)
            .expect("Transactions must serialize into the hash writer");
        Self(hash_writer.finish())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.write_str(&hex::encode(&reversed_bytes))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl BitcoinDeserialize for Hash {
    fn bitcoin_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Hash(bytes))
        }
    }
}
