//! Hex test vectors shared across the workspace.

use lazy_static::lazy_static;

lazy_static! {
    /// The mainnet genesis block header (80 bytes).
    pub static ref MAINNET_GENESIS_HEADER: Vec<u8> = hex::decode(
        "0100000000000000000000000000000000000000000000000000000000000000\
         000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa\
         4b1e5e4a29ab5f49ffff001d1dac2b7c"
    )
    .expect("hard-coded header hex is valid");

    /// Satoshi's coinbase transaction, shared by every network's genesis
    /// block.
    pub static ref GENESIS_COINBASE_TX: Vec<u8> = hex::decode(
        "01000000010000000000000000000000000000000000000000000000000000\
         000000000000ffffffff4d04ffff001d0104455468652054696d6573203033\
         2f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f\
         66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff01\
         00f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828\
         e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384d\
         f7ba0b8d578a4c702b6bf11d5fac00000000"
    )
    .expect("hard-coded transaction hex is valid");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_decode() {
        assert_eq!(MAINNET_GENESIS_HEADER.len(), 80);
        assert!(!GENESIS_COINBASE_TX.is_empty());
    }
}
