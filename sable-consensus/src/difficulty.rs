//! Difficulty retargeting.

use chrono::{DateTime, Utc};
use primitive_types::U256;

use sable_chain::{
    block::Height,
    work::difficulty::{CompactDifficulty, ExpandedDifficulty},
};
use sable_state::{ChainDb, ChainEntry};

use crate::error::BlockError;

/// The required difficulty bits for the block after `prev`.
///
/// Difficulty retargets every `retarget_interval` blocks, scaling the
/// previous target by the actual duration of the last window, clamped to
/// `[timespan / 4, timespan * 4]`. Networks with `no_retargeting` keep
/// their difficulty forever, and networks that allow minimum-difficulty
/// blocks may drop to the PoW limit when a block is more than two spacings
/// late.
pub fn required_bits(
    db: &ChainDb,
    prev: &ChainEntry,
    block_time: DateTime<Utc>,
) -> Result<CompactDifficulty, BlockError> {
    let params = db.network();
    let next_height = prev.height.0 + 1;

    if next_height % params.retarget_interval != 0 {
        if params.allow_min_difficulty_blocks {
            // The "20-minute rule": a block arriving more than two target
            // spacings after its parent may use the minimum difficulty.
            if block_time.timestamp() > prev.header.time.timestamp() + 2 * params.target_spacing {
                return Ok(params.pow_limit_bits);
            }
            // Otherwise inherit the last non-minimum difficulty in this
            // retarget window.
            let mut cursor = db
                .entry(prev.hash.into())?
                .ok_or(BlockError::State(sable_state::StateError::Corrupt(
                    "previous entry disappeared during retarget",
                )))?;
            while cursor.height.0 % params.retarget_interval != 0
                && cursor.header.difficulty_threshold == params.pow_limit_bits
            {
                cursor = db
                    .entry(cursor.previous_block_hash().into())?
                    .ok_or(BlockError::State(sable_state::StateError::Corrupt(
                        "entry chain has a missing parent",
                    )))?;
            }
            return Ok(cursor.header.difficulty_threshold);
        }
        return Ok(prev.header.difficulty_threshold);
    }

    if params.no_retargeting {
        return Ok(prev.header.difficulty_threshold);
    }

    // The first block of the closing window.
    let first = db
        .ancestor_at(
            prev,
            Height(next_height - params.retarget_interval),
        )?
        .ok_or(BlockError::State(sable_state::StateError::Corrupt(
            "retarget window extends below genesis",
        )))?;

    let mut actual_timespan = prev.header.time.timestamp() - first.header.time.timestamp();
    actual_timespan = actual_timespan
        .max(params.target_timespan / 4)
        .min(params.target_timespan * 4);

    let old_target: U256 = prev
        .header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(prev.hash))?
        .into();

    // new = old * actual / target, capped at the PoW limit. The clamp above
    // keeps the multiplication inside 256 bits for any real target.
    let new_target = old_target * U256::from(actual_timespan as u64)
        / U256::from(params.target_timespan as u64);
    let limit: U256 = ExpandedDifficulty::target_difficulty_limit(params.network).into();
    let new_target = if new_target > limit { limit } else { new_target };

    Ok(ExpandedDifficulty::from(new_target).to_compact())
}

#[cfg(test)]
mod tests {
    use super::*;

    use sable_chain::parameters::Network;
    use sable_state::Config;

    #[test]
    fn regtest_never_retargets() {
        sable_test::init();

        let db = ChainDb::open(&Config::ephemeral(), Network::Regtest).unwrap();
        let genesis = db.tip_entry().unwrap();
        // Far in the future: regtest stays at the PoW limit regardless.
        let far_future = genesis.header.time + chrono::Duration::days(30);
        let bits = required_bits(&db, &genesis, far_future).unwrap();
        assert_eq!(bits, Network::Regtest.params().pow_limit_bits);
    }
}
