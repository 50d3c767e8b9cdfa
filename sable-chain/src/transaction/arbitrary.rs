use chrono::{TimeZone, Utc};
use proptest::{collection::vec, prelude::*};

use crate::block::Height;
use crate::transparent;

use super::{lock_time::LOCK_TIME_THRESHOLD, LockTime, Transaction};

impl Arbitrary for LockTime {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        prop_oneof![
            (0..LOCK_TIME_THRESHOLD).prop_map(|height| LockTime::Height(Height(height))),
            (LOCK_TIME_THRESHOLD..=u32::max_value())
                .prop_map(|time| LockTime::Time(Utc.timestamp(time as i64, 0))),
        ]
        .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Transaction {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<u32>(),
            vec(any::<transparent::Input>(), 1..4),
            vec(any::<transparent::Output>(), 1..4),
            any::<LockTime>(),
        )
            .prop_map(|(version, inputs, outputs, lock_time)| {
                Transaction::new(version, inputs, outputs, lock_time)
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
