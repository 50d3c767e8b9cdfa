use std::io::Write;

use bytes::Buf;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{serialization::sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
use sable_serde_derive::BtcSerialize;

use crate::{cached::Cached, work::difficulty::CompactDifficulty};

use super::{merkle, Hash, Height};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via the backwards reference (previous header
/// hash) present in the block header. Each block points backwards to its
/// parent, all the way back to the genesis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, BtcSerialize)]
pub struct Header {
    /// The block's version field.
    ///
    /// After BIP9, the top three bits are `001` and the remaining bits are
    /// deployment signals.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    ///
    /// Note that because of a flaw in the tree's design, the `merkle_root`
    /// does not always precisely bind the contents of the block
    /// (CVE-2012-2459); duplicate transaction detection is a separate check.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner started
    /// hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block's header hash
    /// must be less than or equal to, in the nBits format used by Bitcoin.
    pub difficulty_threshold: CompactDifficulty,

    /// An arbitrary field that miners can change to modify the header hash
    /// in order to produce a hash less than or equal to the target threshold.
    pub nonce: u32,

    /// For efficiency, we cache the hash of this block after computing it the
    /// first time. This field is not part of the consensus serialization.
    hash: Cached<Hash>,
}

#[derive(Error, Debug)]
pub enum BlockTimeError {
    #[error("invalid time {0:?} in block header {1:?} {2:?}: block time is more than 2 hours in the future ({3:?}). Hint: check your machine's date, time, and time zone.")]
    InvalidBlockTime(DateTime<Utc>, Height, Hash, DateTime<Utc>),
}

impl Header {
    /// Returns length of a serialized header in bytes
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: Cached::new(),
        }
    }

    /// Get the hash of this header, using the cached value when one was
    /// computed during deserialization.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash::from(self)
    }

    /// Returns `Ok(())` if the block time is less than or equal to 2 hours
    /// in the future, according to the node's local clock (`now`).
    ///
    /// This is a non-deterministic rule, as clocks vary over time and
    /// between different nodes; a block rejected by this rule at a given
    /// point in time may later be accepted.
    pub fn time_is_valid_at(
        &self,
        now: DateTime<Utc>,
        height: &Height,
        hash: &Hash,
    ) -> Result<(), BlockTimeError> {
        let two_hours_in_the_future = now
            .checked_add_signed(Duration::hours(2))
            .expect("calculating 2 hours in the future does not overflow");
        if self.time <= two_hours_in_the_future {
            Ok(())
        } else {
            Err(BlockTimeError::InvalidBlockTime(
                self.time,
                *height,
                *hash,
                two_hours_in_the_future,
            ))
        }
    }

    /// Deserializes a block header from a `Buf`, hashing the raw 80 bytes as
    /// they stream past so the hash never needs a re-serialization.
    ///
    /// Note: this op is zero-copy if the underlying buffer is a `Bytes` or
    /// `BytesMut` object.
    pub fn deserialize_from_buf<B: Buf>(mut src: B) -> Result<Self, SerializationError> {
        if src.remaining() < Header::len() {
            return Err(SerializationError::Parse(
                "Not enough bytes in block header",
            ));
        }
        let src = src.copy_to_bytes(Header::len());
        let mut hash_writer = sha256d::Writer::default();
        hash_writer
            .write_all(&src[..])
            .expect("Sha256dWriter is infallible");
        let own_hash = Hash::from_bytes_exact(hash_writer.finish());

        let mut src = std::io::Cursor::new(src);
        Ok(Header {
            version: u32::bitcoin_deserialize(&mut src)?,
            previous_block_hash: Hash::bitcoin_deserialize(&mut src)?,
            merkle_root: merkle::Root::bitcoin_deserialize(&mut src)?,
            time: <DateTime<Utc>>::bitcoin_deserialize(&mut src)?,
            difficulty_threshold: CompactDifficulty::bitcoin_deserialize(&mut src)?,
            nonce: u32::bitcoin_deserialize(&mut src)?,
            hash: Cached::from(own_hash),
        })
    }
}

impl BitcoinDeserialize for Header {
    fn bitcoin_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; 80];
        reader.read_exact(&mut raw)?;
        Header::deserialize_from_buf(&raw[..])
    }
}
