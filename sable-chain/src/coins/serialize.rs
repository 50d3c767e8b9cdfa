//! The compressed coins encoding.
//!
//! ```text
//! coins := varint(version)
//!          u32((height << 1) | coinbase_flag)     height 0x7FFFFFFF = unconfirmed
//!          output_entry*
//!
//! output_entry := 0xFF                            spent
//!              |  0x00 varbytes(script) varint(value)
//!              |  0x01 20_bytes(pubkey_hash) varint(value)
//!              |  0x02 20_bytes(script_hash) varint(value)
//! ```
//!
//! The entry list has no count prefix: it runs to the end of the record.
//! This encoding is fixed; a node's database is only readable by builds
//! using the same scheme.

use std::convert::TryFrom;
use std::io::{self, Read};

use bytes::Bytes;

use crate::amount::Amount;
use crate::block::Height;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transparent::{Output, Script};
use crate::CompactInt;

use super::{Coin, Coins, Slot};

const SPENT_MARKER: u8 = 0xff;
const PREFIX_RAW_SCRIPT: u8 = 0x00;
const PREFIX_PUBKEY_HASH: u8 = 0x01;
const PREFIX_SCRIPT_HASH: u8 = 0x02;

/// The height code marking a bundle from an unconfirmed transaction.
const UNCONFIRMED_HEIGHT: u32 = 0x7fff_ffff;

fn encode_context(height: Option<Height>, coinbase: bool) -> u32 {
    let height_code = match height {
        Some(height) => height.0,
        None => UNCONFIRMED_HEIGHT,
    };
    (height_code << 1) | coinbase as u32
}

fn decode_context(code: u32) -> (Option<Height>, bool) {
    let coinbase = code & 1 != 0;
    let height_code = code >> 1;
    if height_code == UNCONFIRMED_HEIGHT {
        (None, coinbase)
    } else {
        (Some(Height(height_code)), coinbase)
    }
}

fn write_output_entry<W: io::Write>(output: &Output, mut writer: W) -> Result<(), io::Error> {
    let value = i64::from(output.value) as u64;
    if let Some(hash) = output.lock_script.pub_key_hash() {
        writer.write_all(&[PREFIX_PUBKEY_HASH])?;
        writer.write_all(&hash)?;
    } else if let Some(hash) = output.lock_script.script_hash() {
        writer.write_all(&[PREFIX_SCRIPT_HASH])?;
        writer.write_all(&hash)?;
    } else {
        writer.write_all(&[PREFIX_RAW_SCRIPT])?;
        output.lock_script.bitcoin_serialize(&mut writer)?;
    }
    CompactInt::from(value as usize).bitcoin_serialize(&mut writer)?;
    Ok(())
}

/// Decode one output entry, returning the output (`None` for a spent
/// marker) and the number of bytes consumed.
pub(super) fn decode_output_entry(
    raw: &[u8],
) -> Result<(Option<Output>, usize), SerializationError> {
    let mut cursor = io::Cursor::new(raw);
    let prefix = u8::bitcoin_deserialize(&mut cursor)?;
    let lock_script = match prefix {
        SPENT_MARKER => return Ok((None, 1)),
        PREFIX_RAW_SCRIPT => Script::bitcoin_deserialize(&mut cursor)?,
        PREFIX_PUBKEY_HASH => Script::new_p2pkh(<[u8; 20]>::bitcoin_deserialize(&mut cursor)?),
        PREFIX_SCRIPT_HASH => Script::new_p2sh(<[u8; 20]>::bitcoin_deserialize(&mut cursor)?),
        _ => return Err(SerializationError::Parse("invalid coin entry prefix")),
    };
    let value = CompactInt::bitcoin_deserialize(&mut cursor)?.value();
    let value = Amount::try_from(value as i64)
        .map_err(|_| SerializationError::Parse("coin value outside valid range"))?;
    Ok((
        Some(Output { value, lock_script }),
        cursor.position() as usize,
    ))
}

impl BitcoinSerialize for Coins {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.version as usize).bitcoin_serialize(&mut writer)?;
        encode_context(self.height, self.coinbase).bitcoin_serialize(&mut writer)?;
        for slot in self.slots.iter() {
            match slot {
                Slot::Spent => writer.write_all(&[SPENT_MARKER])?,
                // Deferred slots round-trip without being decoded.
                Slot::Deferred { offset, len } => {
                    writer.write_all(&self.raw[*offset..*offset + *len])?
                }
                Slot::Cached(output) => write_output_entry(output, &mut writer)?,
            }
        }
        Ok(())
    }
}

impl Coins {
    /// Parse a bundle from its stored bytes, deferring output decoding.
    ///
    /// The initial scan only measures each entry, recording `(offset, len)`
    /// spans into the shared buffer; `coin(index)` decodes single outputs
    /// on demand.
    pub fn from_bytes(raw: Bytes) -> Result<Coins, SerializationError> {
        let mut cursor = io::Cursor::new(&raw[..]);
        let version = CompactInt::bitcoin_deserialize(&mut cursor)?.value() as u32;
        let (height, coinbase) = decode_context(u32::bitcoin_deserialize(&mut cursor)?);

        let mut slots = Vec::new();
        let mut offset = cursor.position() as usize;
        while offset < raw.len() {
            let (output, len) = decode_output_entry(&raw[offset..])?;
            slots.push(match output {
                None => Slot::Spent,
                Some(_) => Slot::Deferred { offset, len },
            });
            offset += len;
        }

        Ok(Coins {
            version,
            height,
            coinbase,
            slots,
            raw,
        })
    }
}

impl BitcoinDeserialize for Coins {
    /// Reads the remainder of `reader` as a coins record.
    ///
    /// Bundles are stored as whole database values, so the record extends
    /// to the end of the input.
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Coins::from_bytes(Bytes::from(raw))
    }
}

impl BitcoinSerialize for Coin {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.version as usize).bitcoin_serialize(&mut writer)?;
        encode_context(self.height, self.coinbase).bitcoin_serialize(&mut writer)?;
        write_output_entry(&self.output, &mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Coin {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = CompactInt::bitcoin_deserialize(&mut reader)?.value() as u32;
        let (height, coinbase) = decode_context(u32::bitcoin_deserialize(&mut reader)?);

        let prefix = u8::bitcoin_deserialize(&mut reader)?;
        let lock_script = match prefix {
            PREFIX_RAW_SCRIPT => Script::bitcoin_deserialize(&mut reader)?,
            PREFIX_PUBKEY_HASH => Script::new_p2pkh(<[u8; 20]>::bitcoin_deserialize(&mut reader)?),
            PREFIX_SCRIPT_HASH => Script::new_p2sh(<[u8; 20]>::bitcoin_deserialize(&mut reader)?),
            SPENT_MARKER => return Err(SerializationError::Parse("spent marker in coin record")),
            _ => return Err(SerializationError::Parse("invalid coin entry prefix")),
        };
        let value = CompactInt::bitcoin_deserialize(&mut reader)?.value();
        let value = Amount::try_from(value as i64)
            .map_err(|_| SerializationError::Parse("coin value outside valid range"))?;
        Ok(Coin {
            version,
            height,
            coinbase,
            output: Output { value, lock_script },
        })
    }
}
