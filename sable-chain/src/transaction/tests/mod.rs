mod prop;

use std::convert::TryInto;

use chrono::{TimeZone, Utc};

use crate::block::Height;
use crate::transparent::{
    CoinbaseData, Input, OutPoint, Output, Script, Witness, SEQUENCE_FINAL,
};

use super::*;

fn spend_input(sequence: u32) -> Input {
    Input::PrevOut {
        outpoint: OutPoint {
            hash: Hash([9; 32]),
            index: 0,
        },
        unlock_script: Script(Vec::new()),
        sequence,
        witness: Witness::default(),
    }
}

fn simple_output(value: i64) -> Output {
    Output {
        value: value.try_into().unwrap(),
        lock_script: Script(vec![0x51]),
    }
}

#[test]
fn coinbase_detection() {
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Some(Height(5)),
            data: CoinbaseData::new(vec![0x01, 0x05]),
            sequence: SEQUENCE_FINAL,
            witness: Witness::default(),
        }],
        vec![simple_output(50)],
        LockTime::unlocked(),
    );
    assert!(coinbase.is_coinbase());
    assert!(coinbase.contains_coinbase_input());

    let spend = Transaction::new(
        1,
        vec![spend_input(SEQUENCE_FINAL)],
        vec![simple_output(50)],
        LockTime::unlocked(),
    );
    assert!(!spend.is_coinbase());
}

#[test]
fn finality_rules() {
    let at_height = Height(100);
    let at_time = Utc.timestamp(600_000_000, 0);

    // No lock: always final.
    let tx = Transaction::new(
        1,
        vec![spend_input(0)],
        vec![simple_output(1)],
        LockTime::unlocked(),
    );
    assert!(tx.is_final(at_height, at_time));

    // Height lock in the future, non-final sequence: not final.
    let tx = Transaction::new(
        1,
        vec![spend_input(0)],
        vec![simple_output(1)],
        LockTime::Height(Height(100)),
    );
    assert!(!tx.is_final(at_height, at_time));
    // ...but a lock height strictly below the target height passes.
    assert!(tx.is_final(Height(101), at_time));
    // ...and final sequence numbers override the lock.
    let tx = Transaction::new(
        1,
        vec![spend_input(SEQUENCE_FINAL)],
        vec![simple_output(1)],
        LockTime::Height(Height(100)),
    );
    assert!(tx.is_final(at_height, at_time));

    // Time locks compare against the median time.
    let tx = Transaction::new(
        1,
        vec![spend_input(0)],
        vec![simple_output(1)],
        LockTime::Time(Utc.timestamp(600_000_001, 0)),
    );
    assert!(!tx.is_final(at_height, at_time));
    assert!(tx.is_final(at_height, Utc.timestamp(600_000_002, 0)));
}

#[test]
fn weight_of_legacy_transaction_is_four_times_size() {
    let tx = Transaction::new(
        1,
        vec![spend_input(SEQUENCE_FINAL)],
        vec![simple_output(1)],
        LockTime::unlocked(),
    );
    assert!(!tx.has_witness());
    assert_eq!(tx.weight(), 4 * tx.base_len() as u64);
    assert_eq!(tx.vsize(), tx.base_len() as u64);
}

#[test]
fn witness_discount() {
    let mut input = spend_input(SEQUENCE_FINAL);
    input.set_witness(Witness(vec![vec![0u8; 72], vec![0u8; 33]]));
    let tx = Transaction::new(1, vec![input], vec![simple_output(1)], LockTime::unlocked());
    assert!(tx.has_witness());
    assert!(tx.vsize() < tx.len() as u64);
    assert_eq!(tx.weight(), 3 * tx.base_len() as u64 + tx.len() as u64);
}

#[test]
fn value_out_sums_outputs() {
    let tx = Transaction::new(
        1,
        vec![spend_input(SEQUENCE_FINAL)],
        vec![simple_output(30), simple_output(12)],
        LockTime::unlocked(),
    );
    let total: i64 = tx.value_out().unwrap().into();
    assert_eq!(total, 42);
}

#[test]
fn sigop_cost_scales_legacy_ops() {
    let tx = Transaction::new(
        1,
        vec![spend_input(SEQUENCE_FINAL)],
        vec![Output {
            value: 1.try_into().unwrap(),
            lock_script: Script::new_p2pkh([0; 20]),
        }],
        LockTime::unlocked(),
    );
    // One CHECKSIG in the output template, no resolvable inputs.
    assert_eq!(tx.sigop_cost(|_| None), 4);
}
