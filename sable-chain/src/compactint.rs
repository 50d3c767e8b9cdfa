use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

/// A Bitcoin variable-length integer.
///
/// Values below 253 are a single byte; larger values get a one-byte tag
/// (253, 254, 255) followed by a little-endian u16, u32, or u64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the encoded length (in bytes) of a value.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= std::u16::MAX as usize {
            3
        } else if value <= std::u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl Default for CompactInt {
    fn default() -> CompactInt {
        CompactInt::new()
    }
}

impl BitcoinSerialize for CompactInt {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 253 {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= std::u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= std::u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl BitcoinDeserialize for CompactInt {
    fn bitcoin_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::bitcoin_deserialize(&mut target)?;
        if first < 253 {
            Ok(CompactInt::from(first as usize))
        } else if first == 253 {
            Ok(CompactInt::from(
                u16::bitcoin_deserialize(&mut target)? as usize
            ))
        } else if first == 254 {
            Ok(CompactInt::from(
                u32::bitcoin_deserialize(&mut target)? as usize
            ))
        } else {
            Ok(CompactInt(u64::bitcoin_deserialize(&mut target)?))
        }
    }
}
