//! Genesis consensus parameters for each Bitcoin network.

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::{block, block::Block, parameters::Network, BitcoinDeserialize};

/// The previous block hash for the genesis block.
///
/// All known networks use the `null` value for the parent of the genesis
/// block.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// Returns the hash for the genesis block in `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    match network {
        // bitcoin-cli getblockhash 0
        Network::Mainnet => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        // bitcoin-cli -testnet getblockhash 0
        Network::Testnet => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        // bitcoin-cli -regtest getblockhash 0
        Network::Regtest => "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
    }
    .parse()
    .expect("hard-coded hash parses")
}

/// Returns the genesis block for `network`.
pub fn genesis_block(network: Network) -> Arc<Block> {
    match network {
        Network::Mainnet => MAINNET_GENESIS.clone(),
        Network::Testnet => TESTNET_GENESIS.clone(),
        Network::Regtest => REGTEST_GENESIS.clone(),
    }
}

// Every network shares Satoshi's coinbase transaction; the networks differ
// only in the header's time, bits, and nonce.
const GENESIS_TX_HEX: &str = "01000000010000000000000000000000000000000000000000000000000000\
                              000000000000ffffffff4d04ffff001d0104455468652054696d6573203033\
                              2f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f\
                              66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff01\
                              00f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828\
                              e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384d\
                              f7ba0b8d578a4c702b6bf11d5fac00000000";

const GENESIS_MERKLE_ROOT_HEX: &str =
    "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a";

fn parse_genesis(header_suffix_hex: &str) -> Arc<Block> {
    // version 1, null previous hash, shared merkle root, then the
    // network-specific time/bits/nonce suffix.
    let block_hex = format!(
        "01000000{}{}{}01{}",
        "00".repeat(32),
        GENESIS_MERKLE_ROOT_HEX,
        header_suffix_hex,
        GENESIS_TX_HEX.replace(char::is_whitespace, ""),
    );
    let bytes = hex::decode(block_hex).expect("hard-coded genesis block hex decodes");
    Arc::new(Block::bitcoin_deserialize(&bytes[..]).expect("hard-coded genesis block parses"))
}

lazy_static! {
    // time 1231006505, bits 0x1d00ffff, nonce 2083236893
    static ref MAINNET_GENESIS: Arc<Block> = parse_genesis("29ab5f49ffff001d1dac2b7c");
    // time 1296688602, bits 0x1d00ffff, nonce 414098458
    static ref TESTNET_GENESIS: Arc<Block> = parse_genesis("dae5494dffff001d1aa4ae18");
    // time 1296688602, bits 0x207fffff, nonce 2
    static ref REGTEST_GENESIS: Arc<Block> = parse_genesis("dae5494dffff7f2002000000");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_blocks_match_their_hashes() {
        for network in &[Network::Mainnet, Network::Testnet, Network::Regtest] {
            let block = genesis_block(*network);
            assert_eq!(block.hash(), genesis_hash(*network), "{}", network);
            assert_eq!(
                block.header.previous_block_hash,
                GENESIS_PREVIOUS_BLOCK_HASH
            );
        }
    }

    #[test]
    fn genesis_merkle_root_is_its_coinbase_hash() {
        let block = genesis_block(Network::Mainnet);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(
            block.header.merkle_root.0,
            block.transactions[0].hash().0,
        );
    }
}
