#![allow(clippy::unit_arg)]
use crate::{
    compactint::CompactInt,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};
use std::{
    fmt,
    io::{self, Read},
};

/// The maximum allowed size of a script, in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// The maximum size of a data-carrier (`OP_RETURN`) script under standard
/// policy.
pub const MAX_NULL_DATA_SIZE: usize = 83;

// The opcodes the chain core needs to recognize. Script *execution* is a
// black box behind the consensus::script seam; these are only used for
// template classification and sigop counting.
const OP_0: u8 = 0x00;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1NEGATE: u8 = 0x4f;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

/// An encoding of a Bitcoin script.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Script(pub Vec<u8>);

/// The standard script templates the chain core can recognize.
///
/// Used for coin compression (pubkey-hash and script-hash outputs get a
/// 21-byte encoding) and output standardness.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScriptClass {
    /// Pay-to-pubkey: `<pubkey> OP_CHECKSIG`.
    PubKey,
    /// Pay-to-pubkey-hash: `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`.
    PubKeyHash,
    /// Pay-to-script-hash: `OP_HASH160 <20 bytes> OP_EQUAL` (BIP16).
    ScriptHash,
    /// Bare multisig: `OP_m <pubkeys...> OP_n OP_CHECKMULTISIG`.
    Multisig,
    /// A provably unspendable data carrier: `OP_RETURN ...`.
    NullData,
    /// Version-0 witness program with a 20-byte hash (BIP141).
    WitnessPubKeyHash,
    /// Version-0 witness program with a 32-byte hash (BIP141).
    WitnessScriptHash,
    /// Anything else.
    NonStandard,
}

impl Script {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Build a pay-to-pubkey-hash lock script.
    pub fn new_p2pkh(hash: [u8; 20]) -> Script {
        let mut raw = Vec::with_capacity(25);
        raw.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        raw.extend_from_slice(&hash);
        raw.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(raw)
    }

    /// Build a pay-to-script-hash lock script.
    pub fn new_p2sh(hash: [u8; 20]) -> Script {
        let mut raw = Vec::with_capacity(23);
        raw.extend_from_slice(&[OP_HASH160, 20]);
        raw.extend_from_slice(&hash);
        raw.push(OP_EQUAL);
        Script(raw)
    }

    /// Classify this script against the standard templates.
    pub fn class(&self) -> ScriptClass {
        let raw = &self.0;
        if self.pub_key_hash().is_some() {
            return ScriptClass::PubKeyHash;
        }
        if self.script_hash().is_some() {
            return ScriptClass::ScriptHash;
        }
        if let Some((version, program)) = self.witness_program() {
            if version == 0 && program.len() == 20 {
                return ScriptClass::WitnessPubKeyHash;
            }
            if version == 0 && program.len() == 32 {
                return ScriptClass::WitnessScriptHash;
            }
            return ScriptClass::NonStandard;
        }
        if (raw.len() == 35 && raw[0] == 33 || raw.len() == 67 && raw[0] == 65)
            && raw[raw.len() - 1] == OP_CHECKSIG
        {
            return ScriptClass::PubKey;
        }
        if !raw.is_empty() && raw[0] == OP_RETURN {
            if raw.len() <= MAX_NULL_DATA_SIZE && Script(raw[1..].to_vec()).is_push_only() {
                return ScriptClass::NullData;
            }
            return ScriptClass::NonStandard;
        }
        if self.is_multisig() {
            return ScriptClass::Multisig;
        }
        ScriptClass::NonStandard
    }

    /// The 20-byte hash of a pay-to-pubkey-hash script, if this is one.
    pub fn pub_key_hash(&self) -> Option<[u8; 20]> {
        let raw = &self.0;
        if raw.len() == 25
            && raw[0] == OP_DUP
            && raw[1] == OP_HASH160
            && raw[2] == 20
            && raw[23] == OP_EQUALVERIFY
            && raw[24] == OP_CHECKSIG
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&raw[3..23]);
            Some(hash)
        } else {
            None
        }
    }

    /// The 20-byte hash of a pay-to-script-hash script, if this is one.
    pub fn script_hash(&self) -> Option<[u8; 20]> {
        let raw = &self.0;
        if raw.len() == 23 && raw[0] == OP_HASH160 && raw[1] == 20 && raw[22] == OP_EQUAL {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&raw[2..22]);
            Some(hash)
        } else {
            None
        }
    }

    /// The witness version and program, if this is a BIP141 witness script.
    pub fn witness_program(&self) -> Option<(u8, &[u8])> {
        let raw = &self.0;
        if raw.len() < 4 || raw.len() > 42 {
            return None;
        }
        let version = match raw[0] {
            OP_0 => 0,
            op if (OP_1..=OP_16).contains(&op) => op - OP_1 + 1,
            _ => return None,
        };
        let push = raw[1] as usize;
        if (2..=40).contains(&push) && raw.len() == push + 2 {
            Some((version, &raw[2..]))
        } else {
            None
        }
    }

    fn is_multisig(&self) -> bool {
        let ops: Vec<(u8, Option<&[u8]>)> = match self.ops().collect::<Result<_, ()>>() {
            Ok(ops) => ops,
            Err(()) => return false,
        };
        // `OP_m <key>*n OP_n OP_CHECKMULTISIG`, keys in canonical sizes.
        if ops.len() < 4 || ops[ops.len() - 1].0 != OP_CHECKMULTISIG {
            return false;
        }
        let m = ops[0].0;
        let n = ops[ops.len() - 2].0;
        if !(OP_1..=OP_16).contains(&m) || !(OP_1..=OP_16).contains(&n) || m > n {
            return false;
        }
        let keys = &ops[1..ops.len() - 2];
        keys.len() == (n - OP_1 + 1) as usize
            && keys
                .iter()
                .all(|(_, data)| matches!(data, Some(key) if key.len() == 33 || key.len() == 65))
    }

    /// Returns true when every operation in the script is a push.
    pub fn is_push_only(&self) -> bool {
        for op in self.ops() {
            match op {
                Ok((opcode, _)) if opcode <= OP_16 => continue,
                _ => return false,
            }
        }
        true
    }

    /// Returns true when this script can never be spent.
    pub fn is_unspendable(&self) -> bool {
        (!self.0.is_empty() && self.0[0] == OP_RETURN) || self.0.len() > MAX_SCRIPT_SIZE
    }

    /// Count the legacy signature operations in this script.
    ///
    /// With `accurate` counting, `OP_CHECKMULTISIG` preceded by `OP_n` counts
    /// as `n` sigops; otherwise it pessimistically counts as 20. A malformed
    /// trailing push ends the count, matching the historical behavior.
    pub fn sigops(&self, accurate: bool) -> u64 {
        let mut count = 0u64;
        let mut last_opcode = 0xff;
        for op in self.ops() {
            let (opcode, _) = match op {
                Ok(op) => op,
                Err(()) => break,
            };
            match opcode {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    if accurate && (OP_1..=OP_16).contains(&last_opcode) {
                        count += (last_opcode - OP_1 + 1) as u64;
                    } else {
                        count += 20;
                    }
                }
                _ => {}
            }
            last_opcode = opcode;
        }
        count
    }

    /// The data pushed by the final operation in this script, if the script
    /// is well formed and ends in a push. Used to extract P2SH redeem
    /// scripts.
    pub fn last_push(&self) -> Option<Vec<u8>> {
        let mut last = None;
        for op in self.ops() {
            match op {
                Ok((_, Some(data))) => last = Some(data.to_vec()),
                Ok((_, None)) => last = None,
                Err(()) => return None,
            }
        }
        last
    }

    /// Iterate over `(opcode, push data)` pairs, yielding `Err(())` once if
    /// the script ends inside a push.
    fn ops(&self) -> Ops<'_> {
        Ops {
            script: &self.0,
            index: 0,
            failed: false,
        }
    }
}

struct Ops<'a> {
    script: &'a [u8],
    index: usize,
    failed: bool,
}

impl<'a> Iterator for Ops<'a> {
    type Item = Result<(u8, Option<&'a [u8]>), ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.script.len() {
            return None;
        }
        let opcode = self.script[self.index];
        self.index += 1;
        let data_len = match opcode {
            len @ 0x01..=0x4b => len as usize,
            OP_PUSHDATA1 => {
                if self.index + 1 > self.script.len() {
                    self.failed = true;
                    return Some(Err(()));
                }
                let len = self.script[self.index] as usize;
                self.index += 1;
                len
            }
            OP_PUSHDATA2 => {
                if self.index + 2 > self.script.len() {
                    self.failed = true;
                    return Some(Err(()));
                }
                let len = u16::from_le_bytes([self.script[self.index], self.script[self.index + 1]])
                    as usize;
                self.index += 2;
                len
            }
            OP_PUSHDATA4 => {
                if self.index + 4 > self.script.len() {
                    self.failed = true;
                    return Some(Err(()));
                }
                let mut len_bytes = [0u8; 4];
                len_bytes.copy_from_slice(&self.script[self.index..self.index + 4]);
                self.index += 4;
                u32::from_le_bytes(len_bytes) as usize
            }
            _ => return Some(Ok((opcode, None))),
        };
        if self.index + data_len > self.script.len() {
            self.failed = true;
            return Some(Err(()));
        }
        let data = &self.script[self.index..self.index + data_len];
        self.index += data_len;
        Some(Ok((opcode, Some(data))))
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl BitcoinSerialize for Script {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).bitcoin_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl BitcoinDeserialize for Script {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = CompactInt::bitcoin_deserialize(&mut reader)?.value();
        let mut bytes = Vec::new();
        reader.take(len).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < len {
            return Err(SerializationError::Parse("truncated script"));
        }
        Ok(Script(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_template() {
        let script = Script::new_p2pkh([0xab; 20]);
        assert_eq!(script.class(), ScriptClass::PubKeyHash);
        assert_eq!(script.pub_key_hash(), Some([0xab; 20]));
        assert_eq!(script.script_hash(), None);
        assert_eq!(script.sigops(false), 1);
    }

    #[test]
    fn p2sh_template() {
        let script = Script::new_p2sh([0xcd; 20]);
        assert_eq!(script.class(), ScriptClass::ScriptHash);
        assert_eq!(script.script_hash(), Some([0xcd; 20]));
    }

    #[test]
    fn null_data_is_unspendable() {
        let script = Script(vec![OP_RETURN, 4, b'd', b'a', b't', b'a']);
        assert_eq!(script.class(), ScriptClass::NullData);
        assert!(script.is_unspendable());
    }

    #[test]
    fn witness_templates() {
        let mut raw = vec![OP_0, 20];
        raw.extend_from_slice(&[0u8; 20]);
        assert_eq!(Script(raw).class(), ScriptClass::WitnessPubKeyHash);

        let mut raw = vec![OP_0, 32];
        raw.extend_from_slice(&[0u8; 32]);
        assert_eq!(Script(raw).class(), ScriptClass::WitnessScriptHash);
    }

    #[test]
    fn multisig_sigop_counting() {
        // 2-of-3 multisig
        let mut raw = vec![OP_1 + 1];
        for _ in 0..3 {
            raw.push(33);
            raw.extend_from_slice(&[2u8; 33]);
        }
        raw.push(OP_1 + 2);
        raw.push(OP_CHECKMULTISIG);
        let script = Script(raw);
        assert_eq!(script.sigops(true), 3);
        assert_eq!(script.sigops(false), 20);
    }

    #[test]
    fn truncated_push_stops_sigop_count() {
        let script = Script(vec![OP_CHECKSIG, 75, 1, 2]);
        assert_eq!(script.sigops(false), 1);
    }
}

#[cfg(test)]
mod proptests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn script_roundtrip(script in any::<Script>()) {
            sable_test::init();

            let mut bytes = Cursor::new(Vec::new());
            script.bitcoin_serialize(&mut bytes)?;

            bytes.set_position(0);
            let other_script = Script::bitcoin_deserialize(&mut bytes)?;

            prop_assert_eq![script, other_script];
        }
    }
}
