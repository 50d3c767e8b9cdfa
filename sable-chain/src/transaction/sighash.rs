//! Signature-hash computation.
//!
//! The digests the script interpreter's signature checks commit to: the
//! legacy algorithm, and the BIP143 algorithm used for version-0 witness
//! programs. Signature *verification* is out of scope for this crate; these
//! functions only produce the digests.

use std::io::Write;

use crate::amount::{Amount, NonNegative};
use crate::serialization::{sha256d, BitcoinSerialize};
use crate::transparent::{OutPoint, Script};

use super::{Hash, Transaction};

/// Sign all outputs.
pub const SIGHASH_ALL: u32 = 1;
/// Sign no outputs.
pub const SIGHASH_NONE: u32 = 2;
/// Sign only the output paired with this input.
pub const SIGHASH_SINGLE: u32 = 3;
/// Sign only this input, allowing others to be added.
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

const SIGHASH_OUTPUT_MASK: u32 = 0x1f;

impl Transaction {
    /// The legacy signature hash for `index`, with the given script code
    /// and hash type.
    ///
    /// Following the historical quirk, a `SIGHASH_SINGLE` hash type with no
    /// matching output yields the digest `1` rather than an error.
    pub fn signature_hash(&self, index: usize, script_code: &Script, hash_type: u32) -> Hash {
        let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
        let output_type = hash_type & SIGHASH_OUTPUT_MASK;

        if output_type == SIGHASH_SINGLE && index >= self.outputs.len() {
            let mut one = [0u8; 32];
            one[0] = 1;
            return Hash(one);
        }

        let mut writer = sha256d::Writer::default();
        self.version
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");

        // Inputs: under ANYONECANPAY only the signed input appears; all
        // other input scripts are cleared, and their sequences are zeroed
        // under NONE and SINGLE.
        let empty_script = Script(Vec::new());
        let signed_inputs: Vec<(OutPoint, &Script, u32)> = self
            .inputs
            .iter()
            .enumerate()
            .filter(|(i, _)| !anyone_can_pay || *i == index)
            .map(|(i, input)| {
                let outpoint = input.outpoint().unwrap_or_else(OutPoint::null);
                let script = if i == index { script_code } else { &empty_script };
                let sequence = if i != index
                    && (output_type == SIGHASH_NONE || output_type == SIGHASH_SINGLE)
                {
                    0
                } else {
                    input.sequence()
                };
                (outpoint, script, sequence)
            })
            .collect();

        write_compact_len(&mut writer, signed_inputs.len());
        for (outpoint, script, sequence) in signed_inputs {
            outpoint
                .bitcoin_serialize(&mut writer)
                .expect("Sha256dWriter is infallible");
            script
                .bitcoin_serialize(&mut writer)
                .expect("Sha256dWriter is infallible");
            sequence
                .bitcoin_serialize(&mut writer)
                .expect("Sha256dWriter is infallible");
        }

        // Outputs: all, none, or the single output paired with the input
        // (with prior outputs blanked to value -1).
        match output_type {
            SIGHASH_NONE => write_compact_len(&mut writer, 0),
            SIGHASH_SINGLE => {
                write_compact_len(&mut writer, index + 1);
                for _ in 0..index {
                    (-1i64)
                        .bitcoin_serialize(&mut writer)
                        .expect("Sha256dWriter is infallible");
                    write_compact_len(&mut writer, 0);
                }
                self.outputs[index]
                    .bitcoin_serialize(&mut writer)
                    .expect("Sha256dWriter is infallible");
            }
            _ => {
                self.outputs
                    .bitcoin_serialize(&mut writer)
                    .expect("Sha256dWriter is infallible");
            }
        }

        self.lock_time
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        hash_type
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        Hash(writer.finish())
    }

    /// The BIP143 signature hash for version-0 witness program spends.
    pub fn witness_signature_hash(
        &self,
        index: usize,
        script_code: &Script,
        value: Amount<NonNegative>,
        hash_type: u32,
    ) -> Hash {
        let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
        let output_type = hash_type & SIGHASH_OUTPUT_MASK;

        let zero = [0u8; 32];

        let hash_prevouts = if anyone_can_pay {
            zero
        } else {
            let mut writer = sha256d::Writer::default();
            for input in self.inputs.iter() {
                input
                    .outpoint()
                    .unwrap_or_else(OutPoint::null)
                    .bitcoin_serialize(&mut writer)
                    .expect("Sha256dWriter is infallible");
            }
            writer.finish()
        };

        let hash_sequence = if anyone_can_pay
            || output_type == SIGHASH_NONE
            || output_type == SIGHASH_SINGLE
        {
            zero
        } else {
            let mut writer = sha256d::Writer::default();
            for input in self.inputs.iter() {
                input
                    .sequence()
                    .bitcoin_serialize(&mut writer)
                    .expect("Sha256dWriter is infallible");
            }
            writer.finish()
        };

        let hash_outputs = match output_type {
            SIGHASH_NONE => zero,
            SIGHASH_SINGLE => {
                if let Some(output) = self.outputs.get(index) {
                    let mut writer = sha256d::Writer::default();
                    output
                        .bitcoin_serialize(&mut writer)
                        .expect("Sha256dWriter is infallible");
                    writer.finish()
                } else {
                    zero
                }
            }
            _ => {
                let mut writer = sha256d::Writer::default();
                for output in self.outputs.iter() {
                    output
                        .bitcoin_serialize(&mut writer)
                        .expect("Sha256dWriter is infallible");
                }
                writer.finish()
            }
        };

        let input = &self.inputs[index];
        let mut writer = sha256d::Writer::default();
        self.version
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        writer
            .write_all(&hash_prevouts)
            .expect("Sha256dWriter is infallible");
        writer
            .write_all(&hash_sequence)
            .expect("Sha256dWriter is infallible");
        input
            .outpoint()
            .unwrap_or_else(OutPoint::null)
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        script_code
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        value
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        input
            .sequence()
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        writer
            .write_all(&hash_outputs)
            .expect("Sha256dWriter is infallible");
        self.lock_time
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        hash_type
            .bitcoin_serialize(&mut writer)
            .expect("Sha256dWriter is infallible");
        Hash(writer.finish())
    }
}

fn write_compact_len<W: Write>(writer: &mut W, len: usize) {
    crate::CompactInt::from(len)
        .bitcoin_serialize(writer)
        .expect("Sha256dWriter is infallible");
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;
    use crate::transaction::{Hash, LockTime, Transaction};
    use crate::transparent::{Input, OutPoint, Output, Script, Witness, SEQUENCE_FINAL};

    fn input(marker: u8) -> Input {
        Input::PrevOut {
            outpoint: OutPoint {
                hash: crate::transaction::Hash([marker; 32]),
                index: 0,
            },
            unlock_script: Script(Vec::new()),
            sequence: SEQUENCE_FINAL,
            witness: Witness::default(),
        }
    }

    fn output(value: i64) -> Output {
        Output {
            value: value.try_into().unwrap(),
            lock_script: Script(vec![0x51]),
        }
    }

    fn two_input_tx(second_marker: u8) -> Transaction {
        Transaction::new(
            1,
            vec![input(1), input(second_marker)],
            vec![output(10), output(20)],
            LockTime::unlocked(),
        )
    }

    #[test]
    fn hash_types_commit_to_different_data() {
        let tx = two_input_tx(2);
        let code = Script(vec![0x51]);
        let all = tx.signature_hash(0, &code, SIGHASH_ALL);
        let none = tx.signature_hash(0, &code, SIGHASH_NONE);
        let single = tx.signature_hash(0, &code, SIGHASH_SINGLE);
        assert_ne!(all, none);
        assert_ne!(all, single);
        assert_ne!(none, single);
    }

    #[test]
    fn single_with_no_matching_output_is_the_one_digest() {
        let tx = Transaction::new(
            1,
            vec![input(1), input(2), input(3)],
            vec![output(10)],
            LockTime::unlocked(),
        );
        let mut one = [0u8; 32];
        one[0] = 1;
        assert_eq!(
            tx.signature_hash(2, &Script(Vec::new()), SIGHASH_SINGLE),
            Hash(one)
        );
    }

    #[test]
    fn anyone_can_pay_ignores_other_inputs() {
        let code = Script(vec![0x51]);
        let digest_a =
            two_input_tx(2).signature_hash(0, &code, SIGHASH_ALL | SIGHASH_ANYONECANPAY);
        let digest_b =
            two_input_tx(9).signature_hash(0, &code, SIGHASH_ALL | SIGHASH_ANYONECANPAY);
        assert_eq!(digest_a, digest_b);

        // Without the flag, the other input is committed to.
        let digest_a = two_input_tx(2).signature_hash(0, &code, SIGHASH_ALL);
        let digest_b = two_input_tx(9).signature_hash(0, &code, SIGHASH_ALL);
        assert_ne!(digest_a, digest_b);
    }

    #[test]
    fn witness_digest_commits_to_the_spent_value() {
        let tx = two_input_tx(2);
        let code = Script(vec![0x51]);
        let value_a = 1_000i64.try_into().unwrap();
        let value_b = 2_000i64.try_into().unwrap();
        assert_ne!(
            tx.witness_signature_hash(0, &code, value_a, SIGHASH_ALL),
            tx.witness_signature_hash(0, &code, value_b, SIGHASH_ALL),
        );
    }
}
