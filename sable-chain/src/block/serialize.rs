use std::{convert::TryInto, io, sync::Arc};

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction::Transaction;
use crate::CompactInt;

use super::{Block, Header};

/// The maximum size of a Bitcoin block, in bytes.
///
/// After SegWit, this includes the size of the witness structure.
pub const MAX_BLOCK_BYTES: u64 = 4_000_000;

/// The maximum BIP141 weight of a block.
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// The maximum witness-scaled signature-operation cost of a block.
pub const MAX_BLOCK_SIGOPS_COST: u64 = 80_000;

impl BitcoinSerialize for Block {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.bitcoin_serialize(&mut writer)?;
        self.transactions.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Block {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        // If the limit is reached mid-transaction, we get an UnexpectedEof.
        let mut reader = reader.take(MAX_BLOCK_BYTES);
        let header = Header::bitcoin_deserialize(&mut reader)?;

        let tx_count = CompactInt::bitcoin_deserialize(&mut reader)?.value();
        // Sanity check the number of transactions to prevent DOS attacks:
        // every transaction needs at least one 36-byte outpoint.
        if tx_count > MAX_BLOCK_BYTES / (36 * 4) {
            return Err(SerializationError::Parse(
                "Block contained too many transactions for each to have at least one input",
            ));
        }
        let mut transactions = Vec::with_capacity(
            tx_count
                .try_into()
                .expect("tx count bound fits in a usize"),
        );
        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::bitcoin_deserialize(&mut reader)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
