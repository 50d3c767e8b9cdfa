//! Strongly-typed satoshi amounts.
//!
//! The `Amount` type is parameterized by a `Constraint` implementation,
//! so that the type system tracks whether a value is allowed to be
//! negative (fees during accounting) or not (output values).

use std::{
    convert::{TryFrom, TryInto},
    marker::PhantomData,
    ops::RangeInclusive,
};

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// One bitcoin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// The maximum amount of money that can ever exist, in satoshis.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// A runtime validated type for representing amounts of satoshis.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "i64")]
#[serde(into = "i64")]
#[serde(bound = "C: Constraint + Clone")]
pub struct Amount<C = NonNegative>(i64, PhantomData<C>);

impl<C> std::fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple(&format!("Amount<{}>", std::any::type_name::<C>()))
            .field(&self.0)
            .finish()
    }
}

impl<C> std::fmt::Display for Amount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> Amount<C> {
    /// The zero amount, valid under every constraint.
    pub fn zero() -> Amount<C> {
        Amount(0, PhantomData)
    }

    /// Convert this amount into one with a different constraint, failing if
    /// the value is out of range for the target constraint.
    pub fn constrain<C2: Constraint>(self) -> Result<Amount<C2>, Error> {
        self.0.try_into()
    }
}

impl<C> From<Amount<C>> for i64 {
    fn from(amount: Amount<C>) -> i64 {
        amount.0
    }
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if C::valid_range().contains(&value) {
            Ok(Amount(value, PhantomData))
        } else {
            Err(Error::Invalid { value })
        }
    }
}

impl<C: PartialEq> PartialEq for Amount<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<C: PartialEq> PartialEq<i64> for Amount<C> {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl<C: Eq> Eq for Amount<C> {}

impl<C: Eq> PartialOrd for Amount<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.0.cmp(&other.0))
    }
}

impl<C: Eq> Ord for Amount<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<C> std::hash::Hash for Amount<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<C: Constraint> std::ops::Add<Amount<C>> for Amount<C> {
    type Output = Result<Amount<C>, Error>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        let value = self.0.checked_add(rhs.0).ok_or(Error::Overflow)?;
        value.try_into()
    }
}

impl<C: Constraint> std::ops::Add<Amount<C>> for Result<Amount<C>, Error> {
    type Output = Result<Amount<C>, Error>;

    fn add(self, rhs: Amount<C>) -> Self::Output {
        self? + rhs
    }
}

impl<C: Constraint> std::ops::Sub<Amount<C>> for Amount<C> {
    type Output = Result<Amount<C>, Error>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        let value = self.0.checked_sub(rhs.0).ok_or(Error::Overflow)?;
        value.try_into()
    }
}

impl<C: Constraint> std::ops::Sub<Amount<C>> for Result<Amount<C>, Error> {
    type Output = Result<Amount<C>, Error>;

    fn sub(self, rhs: Amount<C>) -> Self::Output {
        self? - rhs
    }
}

impl<C> BitcoinSerialize for Amount<C> {
    fn bitcoin_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(target)
    }
}

impl<C: Constraint> BitcoinDeserialize for Amount<C> {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let value = i64::bitcoin_deserialize(reader)?;
        value
            .try_into()
            .map_err(|_| SerializationError::Parse("amount outside valid range"))
    }
}

/// Errors that can be returned when validating or combining `Amount`s.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The amount is outside the range of its constraint.
    #[error("amount {value} is outside the valid range")]
    Invalid {
        /// The invalid value.
        value: i64,
    },
    /// Amount arithmetic over- or underflowed an i64.
    #[error("amount arithmetic overflowed")]
    Overflow,
}

/// Marker type for `Amount`s that can be negative.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NegativeAllowed {}

/// Marker type for `Amount`s that cannot be negative.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NonNegative {}

/// The constraint applied to the value inside an `Amount`.
pub trait Constraint {
    /// The range of values valid under this constraint.
    fn valid_range() -> RangeInclusive<i64>;
}

impl Constraint for NegativeAllowed {
    fn valid_range() -> RangeInclusive<i64> {
        -MAX_MONEY..=MAX_MONEY
    }
}

impl Constraint for NonNegative {
    fn valid_range() -> RangeInclusive<i64> {
        0..=MAX_MONEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_enforced() {
        assert!(Amount::<NonNegative>::try_from(-1).is_err());
        assert!(Amount::<NonNegative>::try_from(MAX_MONEY + 1).is_err());
        assert!(Amount::<NonNegative>::try_from(MAX_MONEY).is_ok());
        assert!(Amount::<NegativeAllowed>::try_from(-1).is_ok());
    }

    #[test]
    fn addition_saturates_into_error() {
        let one: Amount = 1.try_into().unwrap();
        let max: Amount = MAX_MONEY.try_into().unwrap();
        assert_eq!(
            max + one,
            Err(Error::Invalid {
                value: MAX_MONEY + 1
            })
        );
    }

    #[test]
    fn round_trip_bytes() {
        let amount: Amount = (50 * COIN).try_into().unwrap();
        let bytes = amount.bitcoin_serialize_to_vec().unwrap();
        let parsed = Amount::<NonNegative>::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(amount, parsed);
    }
}
