//! The Bitcoin transaction Merkle tree, and the partial-tree subset proofs
//! served to SPV clients.

use std::{fmt, io, iter::FromIterator};

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction;
use sable_serde_derive::BtcSerialize;
use serde::{Deserialize, Serialize};

use super::Header;

/// The root of the transaction Merkle tree.
///
/// Note: same as block and transaction hashes, roots are displayed in
/// big-endian byte order but stored in the serialized (reversed) order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, BtcSerialize)]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed_bytes = self.0;
        reversed_bytes.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed_bytes))
            .finish()
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

fn hash_nodes(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&left);
    buf[32..].copy_from_slice(&right);
    sha256d::digest(&buf)
}

/// Compute the Merkle root of a sequence of transaction hashes.
///
/// When a level has an odd number of nodes, the last node is paired with
/// itself. Because of this, two distinct transaction lists can produce the
/// same root (CVE-2012-2459); callers must reject blocks containing
/// duplicate transactions separately.
impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();
        if level.is_empty() {
            return Root([0; 32]);
        }
        while level.len() > 1 {
            if level.len() % 2 != 0 {
                let last = *level.last().expect("level is non-empty");
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| hash_nodes(pair[0], pair[1]))
                .collect();
        }
        Root(level[0])
    }
}

/// A BIP37 partial Merkle tree: a subset proof that the matched transactions
/// are committed to by a block's Merkle root.
///
/// The tree is stored as a depth-first list of traversal flags plus the
/// hashes of the pruned subtrees and matched leaves.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartialMerkleTree {
    transaction_count: u32,
    hashes: Vec<transaction::Hash>,
    flags: Vec<bool>,
}

impl PartialMerkleTree {
    /// Build a partial tree over `txids`, where `matches[i]` marks the
    /// transactions to prove.
    ///
    /// The two slices run in parallel and must have the same length.
    pub fn from_hashes(txids: &[transaction::Hash], matches: &[bool]) -> PartialMerkleTree {
        assert_eq!(
            txids.len(),
            matches.len(),
            "every txid needs a match marker"
        );
        let mut tree = PartialMerkleTree {
            transaction_count: txids.len() as u32,
            hashes: Vec::new(),
            flags: Vec::new(),
        };
        if txids.is_empty() {
            return tree;
        }
        let mut height = 0;
        while tree.width(height) > 1 {
            height += 1;
        }
        tree.build(height, 0, txids, matches);
        tree
    }

    /// The number of transactions in the underlying block.
    pub fn transaction_count(&self) -> u32 {
        self.transaction_count
    }

    /// The number of nodes at the given height of the tree.
    fn width(&self, height: u32) -> u32 {
        (self.transaction_count + (1 << height) - 1) >> height
    }

    fn calc_hash(&self, height: u32, pos: u32, txids: &[transaction::Hash]) -> [u8; 32] {
        if height == 0 {
            return txids[pos as usize].0;
        }
        let left = self.calc_hash(height - 1, pos * 2, txids);
        let right = if pos * 2 + 1 < self.width(height - 1) {
            self.calc_hash(height - 1, pos * 2 + 1, txids)
        } else {
            left
        };
        hash_nodes(left, right)
    }

    fn build(&mut self, height: u32, pos: u32, txids: &[transaction::Hash], matches: &[bool]) {
        let begin = (pos as usize) << height;
        let end = std::cmp::min((pos as usize + 1) << height, txids.len());
        let parent_of_match = matches[begin..end].iter().any(|matched| *matched);
        self.flags.push(parent_of_match);
        if height == 0 || !parent_of_match {
            self.hashes
                .push(transaction::Hash(self.calc_hash(height, pos, txids)));
        } else {
            self.build(height - 1, pos * 2, txids, matches);
            if pos * 2 + 1 < self.width(height - 1) {
                self.build(height - 1, pos * 2 + 1, txids, matches);
            }
        }
    }

    /// Recompute the Merkle root committed to by this proof, returning it
    /// together with the matched transactions and their block positions.
    pub fn extract_matches(
        &self,
    ) -> Result<(Root, Vec<(usize, transaction::Hash)>), SerializationError> {
        if self.transaction_count == 0 {
            return Err(SerializationError::Parse(
                "partial merkle tree over an empty block",
            ));
        }
        if (self.hashes.len() as u32) > self.transaction_count {
            return Err(SerializationError::Parse(
                "partial merkle tree has more hashes than transactions",
            ));
        }

        let mut height = 0;
        while self.width(height) > 1 {
            height += 1;
        }

        let mut bits_used = 0;
        let mut hashes_used = 0;
        let mut matches = Vec::new();
        let root =
            self.traverse_extract(height, 0, &mut bits_used, &mut hashes_used, &mut matches)?;

        // Everything in the proof must be consumed, modulo the zero padding
        // bits in the final serialized flag byte.
        if hashes_used != self.hashes.len() {
            return Err(SerializationError::Parse(
                "partial merkle tree has unused hashes",
            ));
        }
        if self.flags.len() - bits_used >= 8 || self.flags[bits_used..].iter().any(|bit| *bit) {
            return Err(SerializationError::Parse(
                "partial merkle tree has unused flag bits",
            ));
        }

        Ok((Root(root), matches))
    }

    fn traverse_extract(
        &self,
        height: u32,
        pos: u32,
        bits_used: &mut usize,
        hashes_used: &mut usize,
        matches: &mut Vec<(usize, transaction::Hash)>,
    ) -> Result<[u8; 32], SerializationError> {
        if *bits_used >= self.flags.len() {
            return Err(SerializationError::Parse(
                "partial merkle tree overflowed its flag bits",
            ));
        }
        let parent_of_match = self.flags[*bits_used];
        *bits_used += 1;

        if height == 0 || !parent_of_match {
            if *hashes_used >= self.hashes.len() {
                return Err(SerializationError::Parse(
                    "partial merkle tree overflowed its hashes",
                ));
            }
            let hash = self.hashes[*hashes_used];
            *hashes_used += 1;
            if height == 0 && parent_of_match {
                matches.push((pos as usize, hash));
            }
            return Ok(hash.0);
        }

        let left = self.traverse_extract(height - 1, pos * 2, bits_used, hashes_used, matches)?;
        let right = if pos * 2 + 1 < self.width(height - 1) {
            let right =
                self.traverse_extract(height - 1, pos * 2 + 1, bits_used, hashes_used, matches)?;
            // Identical siblings are the CVE-2012-2459 malleation.
            if right == left {
                return Err(SerializationError::Parse(
                    "partial merkle tree has duplicate hashes",
                ));
            }
            right
        } else {
            left
        };
        Ok(hash_nodes(left, right))
    }
}

impl BitcoinSerialize for PartialMerkleTree {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.transaction_count.bitcoin_serialize(&mut writer)?;
        self.hashes.bitcoin_serialize(&mut writer)?;
        let mut packed = vec![0u8; (self.flags.len() + 7) / 8];
        for (index, flag) in self.flags.iter().enumerate() {
            packed[index / 8] |= (*flag as u8) << (index % 8);
        }
        packed.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for PartialMerkleTree {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let transaction_count = u32::bitcoin_deserialize(&mut reader)?;
        let hashes = <Vec<transaction::Hash>>::bitcoin_deserialize(&mut reader)?;
        let packed = <Vec<u8>>::bitcoin_deserialize(&mut reader)?;
        let mut flags = Vec::with_capacity(packed.len() * 8);
        for byte in packed.iter() {
            for bit in 0..8 {
                flags.push(byte & (1 << bit) != 0);
            }
        }
        Ok(PartialMerkleTree {
            transaction_count,
            hashes,
            flags,
        })
    }
}

/// A block header together with a partial Merkle tree: everything an SPV
/// client needs to verify that its transactions are in the block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, BtcSerialize)]
pub struct MerkleBlock {
    pub header: Header,
    pub proof: PartialMerkleTree,
}

impl MerkleBlock {
    /// Build a `MerkleBlock` proving the transactions selected by `matched`.
    pub fn from_block<F>(block: &super::Block, matched: F) -> MerkleBlock
    where
        F: Fn(&transaction::Hash) -> bool,
    {
        let txids = block.transaction_hashes();
        let matches: Vec<bool> = txids.iter().map(matched).collect();
        MerkleBlock {
            header: block.header,
            proof: PartialMerkleTree::from_hashes(&txids, &matches),
        }
    }
}

impl BitcoinDeserialize for MerkleBlock {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(MerkleBlock {
            header: Header::bitcoin_deserialize(&mut reader)?,
            proof: PartialMerkleTree::bitcoin_deserialize(&mut reader)?,
        })
    }
}
