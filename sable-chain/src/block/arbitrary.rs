use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::{collection::vec, prelude::*};

use crate::transaction::Transaction;
use crate::work::difficulty::CompactDifficulty;

use super::{merkle, Block, Hash, Header};

impl Arbitrary for Header {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<u32>(),
            any::<Hash>(),
            any::<[u8; 32]>(),
            any::<u32>(),
            any::<u32>(),
            any::<u32>(),
        )
            .prop_map(|(version, previous_block_hash, merkle_root, time, bits, nonce)| {
                Header::new(
                    version,
                    previous_block_hash,
                    merkle::Root(merkle_root),
                    Utc.timestamp(time as i64, 0),
                    CompactDifficulty(bits),
                    nonce,
                )
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Block {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<Header>(), vec(any::<Transaction>(), 1..3))
            .prop_map(|(header, transactions)| Block {
                header,
                transactions: transactions.into_iter().map(Arc::new).collect(),
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
