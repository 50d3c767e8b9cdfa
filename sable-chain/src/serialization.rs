//! Consensus-critical serialization.
//!
//! This module contains the `BitcoinSerialize` and `BitcoinDeserialize`
//! traits: analogs of the Serde `Serialize` and `Deserialize` traits, but
//! producing the exact byte layouts fixed by the Bitcoin wire and storage
//! formats. Vectors are length-prefixed with `CompactInt`, integers are
//! little-endian, and `Vec<u8>` is treated as a length-prefixed byte string.

mod deserialize;
mod error;

pub mod sha256d;

use std::convert::TryFrom;

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Utc};

pub use deserialize::{BitcoinDeserialize, BitcoinDeserializeInto};
pub use error::SerializationError;

use crate::compactint::CompactInt;

pub trait BitcoinSerialize {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn bitcoin_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.bitcoin_serialize(&mut data)?;
        Ok(data)
    }
}

impl BitcoinSerialize for bool {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl BitcoinSerialize for u16 {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for u32 {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for u64 {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for i32 {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for i64 {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl BitcoinSerialize for DateTime<Utc> {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        // u32 times are valid until 2106; anything later saturates, and the
        // block-header time checks reject the result long before that.
        let time_u32 = u32::try_from(self.timestamp()).unwrap_or(std::u32::MAX);
        target.write_u32::<LittleEndian>(time_u32)
    }
}

impl BitcoinSerialize for &[u8] {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl BitcoinSerialize for [u8; 4] {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl BitcoinSerialize for [u8; 32] {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

// Byte vectors are serialized as length-prefixed strings, not element-wise.
// This is why `u8` itself does not implement `BitcoinSerialize`: it would
// make the generic `Vec<T>` impl overlap with this one.
impl BitcoinSerialize for Vec<u8> {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).bitcoin_serialize(&mut target)?;
        target.write_all(self)?;
        Ok(())
    }
}

impl<T> BitcoinSerialize for Vec<T>
where
    T: BitcoinSerialize,
{
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).bitcoin_serialize(&mut target)?;
        for item in self.iter() {
            item.bitcoin_serialize(&mut target)?
        }
        Ok(())
    }
}

impl<T, U> BitcoinSerialize for (T, U)
where
    T: BitcoinSerialize,
    U: BitcoinSerialize,
{
    fn bitcoin_serialize<W>(&self, mut target: W) -> std::result::Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.bitcoin_serialize(&mut target)?;
        self.1.bitcoin_serialize(&mut target)?;
        Ok(())
    }
}

impl<T: BitcoinSerialize> BitcoinSerialize for Option<T> {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            Some(contents) => contents.bitcoin_serialize(&mut target),
            None => Ok(()),
        }
    }
}
