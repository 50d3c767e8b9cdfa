use std::convert::TryInto;

use proptest::{collection::vec, prelude::*};

use crate::amount::MAX_MONEY;

use super::serialize::parse_coinbase_height;
use super::{CoinbaseData, Input, Output, Script, Witness, SEQUENCE_FINAL};

impl Arbitrary for Output {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        ((0..=MAX_MONEY), any::<Script>())
            .prop_map(|(value, lock_script)| Output {
                value: value.try_into().expect("value is in range"),
                lock_script,
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Witness {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(vec(any::<u8>(), 0..32), 0..4).prop_map(Witness).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Input {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        prop_oneof![
            (any::<super::OutPoint>(), any::<Script>(), any::<Witness>()).prop_map(
                |(outpoint, unlock_script, witness)| Input::PrevOut {
                    outpoint,
                    unlock_script,
                    sequence: SEQUENCE_FINAL,
                    witness,
                }
            ),
            vec(any::<u8>(), 0..95).prop_map(|data| {
                Input::Coinbase {
                    // The parsed height must agree with the data bytes, or
                    // round-trip comparisons would fail.
                    height: parse_coinbase_height(&data),
                    data: CoinbaseData(data),
                    sequence: SEQUENCE_FINAL,
                    witness: Witness::default(),
                }
            }),
        ]
        .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
