use std::io;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A segregated witness stack: the stack items consumed by the script
/// interpreter when spending a witness program (BIP141).
///
/// An empty witness is the pre-SegWit state, and is not serialized at all
/// in the legacy transaction encoding.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Witness(pub Vec<Vec<u8>>);

impl Witness {
    pub fn new() -> Witness {
        Witness(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, item: Vec<u8>) {
        self.0.push(item);
    }

    pub fn items(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// The last stack item: the witness script of a P2WSH spend.
    pub fn witness_script(&self) -> Option<&[u8]> {
        self.0.last().map(Vec::as_slice)
    }

    /// Returns the serialized length (in bytes) of this witness stack.
    pub fn serialized_size(&self) -> usize {
        use crate::compactint::CompactInt;
        CompactInt::size(self.0.len())
            + self
                .0
                .iter()
                .map(|item| CompactInt::size(item.len()) + item.len())
                .sum::<usize>()
    }
}

impl BitcoinSerialize for Witness {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for Witness {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Witness(<Vec<Vec<u8>>>::bitcoin_deserialize(reader)?))
    }
}
