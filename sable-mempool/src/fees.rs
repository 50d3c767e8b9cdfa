//! The rolling minimum fee rate.

use crate::policy::{FEE_HALFLIFE, MIN_RELAY_FEE};

/// An exponentially-decaying minimum fee rate.
///
/// Every eviction bumps the rate to just above the evicted entry's rate;
/// between bumps it halves every `FEE_HALFLIFE` seconds, faster when the
/// pool has drained below half or a quarter of its capacity. Once it
/// decays below half the minimum relay fee it snaps to zero.
#[derive(Clone, Debug)]
pub struct RollingFeeRate {
    rate: f64,
    last_update: i64,
}

impl RollingFeeRate {
    pub fn new() -> RollingFeeRate {
        RollingFeeRate {
            rate: 0.0,
            last_update: 0,
        }
    }

    /// The current minimum rate in satoshis per 1000 vbytes.
    pub fn current(&mut self, now: i64, pool_size: u64, max_size: u64) -> i64 {
        if self.rate <= 0.0 {
            return 0;
        }
        let halflife = if pool_size < max_size / 4 {
            FEE_HALFLIFE / 4
        } else if pool_size < max_size / 2 {
            FEE_HALFLIFE / 2
        } else {
            FEE_HALFLIFE
        };
        let elapsed = (now - self.last_update).max(0);
        self.rate /= 2f64.powf(elapsed as f64 / halflife as f64);
        self.last_update = now;
        if self.rate < MIN_RELAY_FEE as f64 / 2.0 {
            self.rate = 0.0;
        }
        self.rate as i64
    }

    /// Raise the minimum after an eviction; the floor only moves up.
    pub fn bump(&mut self, rate: i64, now: i64) {
        let bumped = (rate + MIN_RELAY_FEE) as f64;
        if bumped > self.rate {
            self.rate = bumped;
            self.last_update = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decays_by_halves() {
        let mut rolling = RollingFeeRate::new();
        rolling.bump(9_000, 0);
        assert_eq!(rolling.current(0, u64::max_value(), u64::max_value()), 10_000);
        assert_eq!(
            rolling.current(FEE_HALFLIFE, u64::max_value(), u64::max_value()),
            5_000
        );
        // Below half the relay minimum, the rate snaps to zero.
        assert_eq!(
            rolling.current(FEE_HALFLIFE * 10, u64::max_value(), u64::max_value()),
            0
        );
    }

    #[test]
    fn drained_pools_decay_faster() {
        let mut full = RollingFeeRate::new();
        let mut empty = RollingFeeRate::new();
        full.bump(99_000, 0);
        empty.bump(99_000, 0);
        let after_full = full.current(FEE_HALFLIFE, 100, 100);
        let after_empty = empty.current(FEE_HALFLIFE, 1, 100);
        assert!(after_empty < after_full);
    }

    #[test]
    fn bump_never_lowers() {
        let mut rolling = RollingFeeRate::new();
        rolling.bump(9_000, 0);
        rolling.bump(1, 0);
        assert_eq!(rolling.current(0, u64::max_value(), u64::max_value()), 10_000);
    }
}
