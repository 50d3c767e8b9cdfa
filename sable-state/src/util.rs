//! Chain-agnostic helpers.

use sable_chain::block;

/// The heights of the blocks in a block locator: dense near the tip,
/// then backing off exponentially, always ending at the genesis block.
pub fn block_locator_heights(tip_height: block::Height) -> Vec<block::Height> {
    let mut step = 1u32;
    let mut height = tip_height.0;
    let mut heights = Vec::new();
    loop {
        heights.push(block::Height(height));
        if height == 0 {
            break;
        }
        if heights.len() >= 10 {
            step = step.saturating_mul(2);
        }
        height = height.saturating_sub(step);
    }
    heights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_ends_at_genesis() {
        for tip in &[0u32, 1, 9, 10, 11, 1000, 1_000_000] {
            let heights = block_locator_heights(block::Height(*tip));
            assert_eq!(heights.first(), Some(&block::Height(*tip)));
            assert_eq!(heights.last(), Some(&block::Height(0)));
            // Strictly descending.
            assert!(heights.windows(2).all(|pair| pair[0] > pair[1]));
        }
    }

    #[test]
    fn locator_is_dense_near_the_tip() {
        let heights = block_locator_heights(block::Height(1000));
        assert_eq!(
            &heights[..10],
            &(991..=1000)
                .rev()
                .map(block::Height)
                .collect::<Vec<_>>()[..]
        );
    }
}
