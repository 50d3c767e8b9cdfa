use std::env;

use proptest::{arbitrary::any, prelude::*, test_runner::Config};

use crate::serialization::{BitcoinDeserializeInto, BitcoinSerialize};

use super::super::*;

proptest! {
    #[test]
    fn block_hash_roundtrip(hash in any::<Hash>()) {
        sable_test::init();

        let bytes = hash.bitcoin_serialize_to_vec()?;
        let other_hash: Hash = bytes.as_slice().bitcoin_deserialize_into()?;

        prop_assert_eq![hash, other_hash];
    }

    #[test]
    fn block_hash_display_fromstr_roundtrip(hash in any::<Hash>()) {
        sable_test::init();

        let display = format!("{}", hash);
        let parsed = display.parse::<Hash>().expect("hash should parse");
        prop_assert_eq!(hash, parsed);
    }
}

proptest! {
    #![proptest_config(Config::with_cases(1000))]

    #[test]
    fn blockheader_roundtrip(header in any::<Header>()) {
        sable_test::init();

        let bytes = header.bitcoin_serialize_to_vec().unwrap();
        let other_header = bytes.as_slice().bitcoin_deserialize_into()?;

        prop_assert_eq![header, other_header];
    }
}

proptest! {
    // The block roundtrip test can be really slow, so we use fewer cases by
    // default. Set the PROPTEST_CASES env var to override this default.
    #![proptest_config(Config::with_cases(env::var("PROPTEST_CASES")
                                          .ok()
                                          .and_then(|v| v.parse().ok())
                                          .unwrap_or(16)))]

    #[test]
    fn block_roundtrip(block in any::<Block>()) {
        sable_test::init();

        let bytes = block.bitcoin_serialize_to_vec()?;
        let other_block: Block = bytes.as_slice().bitcoin_deserialize_into()?;

        prop_assert_eq![block, other_block];
    }
}

#[test]
fn deserialized_header_caches_its_hash() {
    sable_test::init();

    let header = super::generate::block_header();
    let bytes = header.bitcoin_serialize_to_vec().unwrap();
    let parsed = Header::deserialize_from_buf(&bytes[..]).unwrap();
    assert_eq!(parsed.hash(), header.hash());
}

#[test]
fn mined_blocks_meet_their_target() {
    sable_test::init();

    use chrono::{TimeZone, Utc};
    let block = super::generate::mine_block(
        Hash([0; 32]),
        Height(1),
        Utc.timestamp(1_296_688_700, 0),
        Vec::new(),
    );
    let target = super::generate::EASY_BITS.to_expanded().unwrap();
    assert!(block.hash() <= target);
    assert_eq!(block.coinbase_height(), Some(Height(1)));
}
