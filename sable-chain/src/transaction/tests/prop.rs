use proptest::prelude::*;

use crate::serialization::{BitcoinDeserializeInto, BitcoinSerialize};

use super::super::*;

proptest! {
    #[test]
    fn transaction_roundtrip(tx in any::<Transaction>()) {
        sable_test::init();

        let bytes = tx.bitcoin_serialize_to_vec()?;
        let other_tx: Transaction = bytes.as_slice().bitcoin_deserialize_into()?;

        prop_assert_eq![&tx, &other_tx];
        prop_assert_eq![tx.hash(), other_tx.hash()];
        prop_assert_eq![tx.wtxid(), other_tx.wtxid()];
    }

    #[test]
    fn length_accounting_matches_serialization(tx in any::<Transaction>()) {
        sable_test::init();

        let bytes = tx.bitcoin_serialize_to_vec()?;
        prop_assert_eq![bytes.len(), tx.len()];

        let mut legacy = Vec::new();
        tx.serialize_without_witness(&mut legacy)?;
        prop_assert_eq![legacy.len(), tx.base_len()];
    }

    #[test]
    fn wtxid_equals_txid_without_witness(tx in any::<Transaction>()) {
        sable_test::init();

        if !tx.has_witness() {
            prop_assert_eq![tx.hash(), tx.wtxid()];
        } else {
            prop_assert_ne![tx.hash(), tx.wtxid()];
        }
    }
}
