//! Block-subsidy calculation.

use std::convert::TryInto;

use sable_chain::{
    amount::{Amount, NonNegative, COIN},
    block::Height,
    parameters::NetworkParams,
};

/// The starting block reward, before any halvings.
const INITIAL_SUBSIDY: i64 = 50 * COIN;

/// The miner subsidy for a block at `height`.
///
/// The subsidy halves every `halving_interval` blocks, and hits zero after
/// 64 halvings (well past the end of new issuance).
pub fn block_subsidy(height: Height, params: &NetworkParams) -> Amount<NonNegative> {
    let halvings = height.0 / params.halving_interval;
    if halvings >= 64 {
        return Amount::zero();
    }
    (INITIAL_SUBSIDY >> halvings)
        .try_into()
        .expect("a right-shifted subsidy is within the valid amount range")
}

#[cfg(test)]
mod tests {
    use super::*;

    use sable_chain::parameters::Network;

    #[test]
    fn halving_schedule() {
        let params = Network::Mainnet.params();
        assert_eq!(block_subsidy(Height(0), params), 50 * COIN);
        assert_eq!(block_subsidy(Height(209_999), params), 50 * COIN);
        assert_eq!(block_subsidy(Height(210_000), params), 25 * COIN);
        assert_eq!(block_subsidy(Height(420_000), params), 12 * COIN + 50_000_000);
        assert_eq!(block_subsidy(Height(64 * 210_000), params), 0);
    }

    #[test]
    fn regtest_halves_faster() {
        let params = Network::Regtest.params();
        assert_eq!(block_subsidy(Height(150), params), 25 * COIN);
    }
}
