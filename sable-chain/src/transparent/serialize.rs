//! Consensus serialization for outpoints, inputs, and outputs.
//!
//! Input witnesses are *not* written here: witness stacks live in a separate
//! trailing section of the transaction encoding (BIP144), so they are
//! handled by `transaction::serialize`.

use std::io;

use crate::block;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use super::{CoinbaseData, Input, OutPoint, Output, Script, Witness};

/// The maximum size of the coinbase data field.
pub(crate) const MAX_COINBASE_DATA_LEN: usize = 100;

impl BitcoinSerialize for OutPoint {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.hash.bitcoin_serialize(&mut writer)?;
        self.index.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: crate::transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
                ..
            } => {
                outpoint.bitcoin_serialize(&mut writer)?;
                unlock_script.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)?;
            }
            Input::Coinbase { data, sequence, .. } => {
                OutPoint::null().bitcoin_serialize(&mut writer)?;
                data.0.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)?;
            }
        }
        Ok(())
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;
        if outpoint.is_null() {
            let data = <Vec<u8>>::bitcoin_deserialize(&mut reader)?;
            if data.len() > MAX_COINBASE_DATA_LEN {
                return Err(SerializationError::Parse("coinbase data is too long"));
            }
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::Coinbase {
                height: parse_coinbase_height(&data),
                data: CoinbaseData(data),
                sequence,
                witness: Witness::default(),
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: Script::bitcoin_deserialize(&mut reader)?,
                sequence: u32::bitcoin_deserialize(&mut reader)?,
                witness: Witness::default(),
            })
        }
    }
}

/// Parse the BIP34 height push at the front of the coinbase data.
///
/// Heights are script-number pushes: a 1-4 byte little-endian push for most
/// heights, or a bare `OP_1`..`OP_16` for the first sixteen blocks.
/// Pre-BIP34 coinbases have arbitrary data here, so failure is `None`,
/// never an error.
pub(crate) fn parse_coinbase_height(data: &[u8]) -> Option<block::Height> {
    let first = *data.first()?;
    match first {
        // OP_1..=OP_16
        0x51..=0x60 => Some(block::Height((first - 0x50) as u32)),
        len @ 1..=4 => {
            let len = len as usize;
            if data.len() <= len {
                return None;
            }
            let mut raw = [0u8; 4];
            raw[..len].copy_from_slice(&data[1..=len]);
            let height = u32::from_le_bytes(raw);
            // The sign bit of a script number is not a valid height.
            if data[len] & 0x80 != 0 || height > block::Height::MAX.0 {
                return None;
            }
            Some(block::Height(height))
        }
        _ => None,
    }
}

/// Encode a height as a BIP34 coinbase push.
///
/// Always the `[len, bytes…]` script-number form, even for heights that
/// have a one-byte `OP_n` encoding; this matches the historical
/// serializer, and keeps the coinbase data at least two bytes long.
pub fn coinbase_height_data(height: block::Height) -> Vec<u8> {
    let value = height.0;
    if value == 0 {
        // OP_0: an empty push.
        return vec![0x00];
    }
    let raw = value.to_le_bytes();
    let mut len = 4;
    while len > 1 && raw[len - 1] == 0 {
        len -= 1;
    }
    // Add a padding byte if the number would read back as negative.
    if raw[len - 1] & 0x80 != 0 {
        len += 1;
    }
    let mut data = Vec::with_capacity(1 + len);
    data.push(len as u8);
    data.extend_from_slice(&raw[..len]);
    data
}

impl BitcoinSerialize for Output {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.value.bitcoin_serialize(&mut writer)?;
        self.lock_script.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Output {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Output {
            value: BitcoinDeserialize::bitcoin_deserialize(&mut reader)?,
            lock_script: Script::bitcoin_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_height_round_trip() {
        for height in &[0u32, 1, 16, 17, 127, 128, 255, 256, 229_931, 499_999_999] {
            let height = block::Height(*height);
            let data = coinbase_height_data(height);
            if height.0 == 0 {
                // OP_0 pushes an empty slice, which reads back as no height.
                assert_eq!(parse_coinbase_height(&data), None);
            } else {
                assert_eq!(parse_coinbase_height(&data), Some(height), "{:?}", height);
            }
        }
    }

    #[test]
    fn null_outpoint_marks_coinbase() {
        let input = Input::Coinbase {
            height: Some(block::Height(17)),
            data: CoinbaseData(coinbase_height_data(block::Height(17))),
            sequence: super::super::SEQUENCE_FINAL,
            witness: Witness::default(),
        };
        let bytes = input.bitcoin_serialize_to_vec().unwrap();
        let parsed = Input::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(input, parsed);
        assert!(parsed.is_coinbase());
    }
}
