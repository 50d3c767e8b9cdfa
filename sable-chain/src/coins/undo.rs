//! Per-block undo records.

use std::io;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transparent::OutPoint;

use super::Coin;

/// The pre-spend state of every coin consumed by a block, in spend order.
///
/// Disconnecting a block walks its transactions in reverse, popping records
/// off the end of this list to restore each input's coin.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UndoCoins {
    items: Vec<(OutPoint, Coin)>,
}

impl UndoCoins {
    pub fn new() -> UndoCoins {
        UndoCoins::default()
    }

    pub fn push(&mut self, outpoint: OutPoint, coin: Coin) {
        self.items.push((outpoint, coin));
    }

    /// Pop the most recent spend record.
    pub fn pop(&mut self) -> Option<(OutPoint, Coin)> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(OutPoint, Coin)> {
        self.items.iter()
    }
}

impl BitcoinSerialize for UndoCoins {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.items.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for UndoCoins {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(UndoCoins {
            items: <Vec<(OutPoint, Coin)>>::bitcoin_deserialize(reader)?,
        })
    }
}
