//! Stake rows and the continuous-interest accrual formula.
//!
//! Interest accrues linearly between checkpoints:
//!
//! ```text
//! pending = floor(principal × rate_bps × elapsed_secs / (SECONDS_PER_YEAR × 10_000))
//! ```
//!
//! Every mutation folds `pending` into `accrued` and resets the checkpoint,
//! so a principal change never loses interest earned at the old principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{constants, WalletId};

/// One stake row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub user: WalletId,
    /// Staked principal in minor units.
    pub principal: u64,
    /// Start of the current accrual period.
    pub checkpoint: DateTime<Utc>,
    /// Interest folded at previous checkpoints and not yet claimed.
    pub accrued: u64,
    /// Optimistic-lock version. Incremented on every successful write.
    pub version: u64,
}

impl Stake {
    #[must_use]
    pub fn new(user: WalletId, principal: u64, now: DateTime<Utc>) -> Self {
        Self {
            user,
            principal,
            checkpoint: now,
            accrued: 0,
            version: 0,
        }
    }

    /// Whole seconds since the checkpoint. Clock skew counts as zero.
    #[must_use]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.checkpoint).num_seconds()).unwrap_or(0)
    }

    /// Interest accrued since the checkpoint, not yet folded.
    #[must_use]
    pub fn pending_interest(&self, rate_bps: u32, now: DateTime<Utc>) -> u64 {
        pending_interest(self.principal, rate_bps, self.elapsed_secs(now))
    }

    /// Accrued plus pending.
    #[must_use]
    pub fn total_rewards(&self, rate_bps: u32, now: DateTime<Utc>) -> u64 {
        self.accrued
            .saturating_add(self.pending_interest(rate_bps, now))
    }

    /// Fold pending interest into `accrued` and move the checkpoint to `now`.
    pub fn fold(&mut self, rate_bps: u32, now: DateTime<Utc>) {
        let pending = self.pending_interest(rate_bps, now);
        self.accrued = self.accrued.saturating_add(pending);
        self.checkpoint = now;
    }
}

/// `floor(principal × rate_bps × elapsed / (SECONDS_PER_YEAR × 10_000))`
/// computed in 128-bit integers. Saturates at `u64::MAX`.
#[must_use]
pub fn pending_interest(principal: u64, rate_bps: u32, elapsed_secs: u64) -> u64 {
    let numerator = u128::from(principal) * u128::from(rate_bps) * u128::from(elapsed_secs);
    let denominator =
        u128::from(constants::SECONDS_PER_YEAR) * u128::from(constants::BPS_DENOMINATOR);
    u64::try_from(numerator / denominator).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_year_at_twelve_percent() {
        assert_eq!(pending_interest(1_000, 1_200, constants::SECONDS_PER_YEAR), 120);
    }

    #[test]
    fn floors_partial_units() {
        // 1000 * 1200 * 1 / 315_360_000_000 < 1
        assert_eq!(pending_interest(1_000, 1_200, 1), 0);
        // Half a year: exactly 60.
        assert_eq!(pending_interest(1_000, 1_200, constants::SECONDS_PER_YEAR / 2), 60);
    }

    #[test]
    fn zero_inputs() {
        assert_eq!(pending_interest(0, 1_200, 1_000_000), 0);
        assert_eq!(pending_interest(1_000, 0, 1_000_000), 0);
        assert_eq!(pending_interest(1_000, 1_200, 0), 0);
    }

    #[test]
    fn large_values_do_not_overflow() {
        let v = pending_interest(u64::MAX, 10_000, constants::SECONDS_PER_YEAR);
        assert_eq!(v, u64::MAX);
    }

    #[test]
    fn fold_moves_checkpoint_and_keeps_interest() {
        let start = Utc::now();
        let mut stake = Stake::new(WalletId::from("alice"), 1_000, start);
        let year_later = start + chrono::Duration::seconds(constants::SECONDS_PER_YEAR as i64);

        stake.fold(1_200, year_later);
        assert_eq!(stake.accrued, 120);
        assert_eq!(stake.checkpoint, year_later);
        assert_eq!(stake.pending_interest(1_200, year_later), 0);
    }

    #[test]
    fn clock_skew_counts_as_zero() {
        let now = Utc::now();
        let stake = Stake::new(WalletId::from("alice"), 1_000, now);
        let earlier = now - chrono::Duration::seconds(60);
        assert_eq!(stake.elapsed_secs(earlier), 0);
        assert_eq!(stake.pending_interest(1_200, earlier), 0);
    }
}
