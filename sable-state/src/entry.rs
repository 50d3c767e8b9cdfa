//! The block-index entry: a header with its height and accumulated work.

use std::io;

use sable_chain::{
    block::{Hash, Header, Height},
    parameters::{VERSION_TOP_BITS, VERSION_TOP_MASK},
    work::difficulty::Work,
    BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

/// One block of the index: the header plus its position and cumulative
/// proof of work.
///
/// Entries are value types keyed by hash; they are created when a block is
/// accepted, never mutated, and only destroyed by a permanent prune of the
/// store. The accumulated `chainwork` is stored rather than recomputed so
/// that opening the database never rescans the header chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainEntry {
    /// The hash of `header`.
    pub hash: Hash,
    /// The block header.
    pub header: Header,
    /// The height of this block: the number of blocks between it and the
    /// genesis block.
    pub height: Height,
    /// The sum of the proofs of this block and all its ancestors.
    pub chainwork: Work,
}

impl ChainEntry {
    /// The serialized size of an entry: an 80-byte header, a height, and a
    /// 256-bit work value.
    pub const fn len() -> usize {
        Header::len() + 4 + 32
    }

    /// Build the entry for `header` on top of `prev`, or for a genesis
    /// header when `prev` is `None`.
    ///
    /// Returns `None` when the header's difficulty encoding is invalid
    /// (zero, negative, or overflowing), or the chain would exceed the
    /// maximum height.
    pub fn from_header(header: &Header, prev: Option<&ChainEntry>) -> Option<ChainEntry> {
        let proof = header.difficulty_threshold.to_work()?;
        let (height, chainwork) = match prev {
            Some(prev) => (prev.height.checked_add(1)?, prev.chainwork + proof),
            None => (Height(0), proof),
        };
        Some(ChainEntry {
            hash: header.hash(),
            header: *header,
            height,
            chainwork,
        })
    }

    /// The proof of work of this single block.
    pub fn proof(&self) -> Work {
        self.header
            .difficulty_threshold
            .to_work()
            .expect("stored entries have valid difficulty encodings")
    }

    /// The hash of this entry's parent.
    pub fn previous_block_hash(&self) -> Hash {
        self.header.previous_block_hash
    }

    /// Whether this block signals the given BIP9 deployment bit.
    pub fn has_bit(&self, bit: u8) -> bool {
        (self.header.version & VERSION_TOP_MASK) == VERSION_TOP_BITS
            && (self.header.version & (1 << bit)) != 0
    }
}

impl BitcoinSerialize for ChainEntry {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.bitcoin_serialize(&mut writer)?;
        self.height.bitcoin_serialize(&mut writer)?;
        writer.write_all(&self.chainwork.to_bytes())?;
        Ok(())
    }
}

impl BitcoinDeserialize for ChainEntry {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        // Parsing the header through the buffer path caches its own hash.
        let header = Header::bitcoin_deserialize(&mut reader)?;
        let height = Height::bitcoin_deserialize(&mut reader)?;
        let chainwork = Work::from_bytes(<[u8; 32]>::bitcoin_deserialize(&mut reader)?);
        Ok(ChainEntry {
            hash: header.hash(),
            header,
            height,
            chainwork,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use sable_chain::parameters::{genesis_block, Network};

    #[test]
    fn genesis_entry_round_trip() {
        sable_test::init();

        let block = genesis_block(Network::Regtest);
        let entry = ChainEntry::from_header(&block.header, None).expect("genesis bits are valid");
        assert_eq!(entry.height, Height(0));
        assert_eq!(entry.hash, block.hash());

        let bytes = entry.bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), ChainEntry::len());
        let parsed = ChainEntry::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(entry, parsed);
    }

    #[test]
    fn chainwork_accumulates() {
        sable_test::init();

        let block = genesis_block(Network::Regtest);
        let genesis = ChainEntry::from_header(&block.header, None).unwrap();

        let child_header = Header::new(
            block.header.version,
            block.hash(),
            block.header.merkle_root,
            block.header.time,
            block.header.difficulty_threshold,
            1,
        );
        let child = ChainEntry::from_header(&child_header, Some(&genesis)).unwrap();
        assert_eq!(child.height, Height(1));
        assert_eq!(child.chainwork, genesis.chainwork + child.proof());
        assert!(child.chainwork > genesis.chainwork);
    }

    #[test]
    fn version_bits_detection() {
        sable_test::init();

        let block = genesis_block(Network::Regtest);
        let mut entry = ChainEntry::from_header(&block.header, None).unwrap();

        entry.header.version = 0x2000_0001;
        assert!(entry.has_bit(0));
        assert!(!entry.has_bit(1));

        // Without the BIP9 top bits, signal bits are meaningless.
        entry.header.version = 0x4000_0001;
        assert!(!entry.has_bit(0));
    }
}
