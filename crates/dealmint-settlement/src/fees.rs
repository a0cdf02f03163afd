//! Platform fee split.
//!
//! ```text
//! fee      = floor(price × fee_bps / 10_000)
//! proceeds = price − fee
//! ```
//!
//! The recipient of `proceeds` (issuer or reseller) absorbs rounding, so the
//! two legs always sum to the price.

use dealmint_types::{constants, DealmintError, PaySplit, Result, WalletId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub price: u64,
    pub fee: u64,
    pub proceeds: u64,
}

impl FeeSplit {
    pub fn compute(price: u64, fee_bps: u32) -> Result<Self> {
        if u64::from(fee_bps) > constants::BPS_DENOMINATOR {
            return Err(DealmintError::Configuration(format!(
                "fee of {fee_bps} bps exceeds 100%"
            )));
        }
        let fee = u128::from(price) * u128::from(fee_bps) / u128::from(constants::BPS_DENOMINATOR);
        let fee = u64::try_from(fee).map_err(|_| DealmintError::ArithmeticOverflow)?;
        let proceeds = price
            .checked_sub(fee)
            .ok_or(DealmintError::ArithmeticOverflow)?;
        Ok(Self {
            price,
            fee,
            proceeds,
        })
    }

    /// Ledger credit legs, skipping zero amounts.
    #[must_use]
    pub fn legs(&self, recipient: &WalletId, platform: &WalletId) -> Vec<PaySplit> {
        [
            PaySplit::new(recipient.clone(), self.proceeds),
            PaySplit::new(platform.clone(), self.fee),
        ]
        .into_iter()
        .filter(|leg| leg.amount > 0)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fee_is_two_and_a_half_percent() {
        let split = FeeSplit::compute(1_000, 250).unwrap();
        assert_eq!(split.fee, 25);
        assert_eq!(split.proceeds, 975);
    }

    #[test]
    fn rounding_goes_to_recipient() {
        let split = FeeSplit::compute(99, 250).unwrap();
        assert_eq!(split.fee, 2);
        assert_eq!(split.proceeds, 97);
        assert_eq!(split.fee + split.proceeds, 99);

        let tiny = FeeSplit::compute(39, 250).unwrap();
        assert_eq!(tiny.fee, 0);
        assert_eq!(tiny.proceeds, 39);
    }

    #[test]
    fn large_prices_do_not_overflow() {
        let split = FeeSplit::compute(u64::MAX, 10_000).unwrap();
        assert_eq!(split.fee, u64::MAX);
        assert_eq!(split.proceeds, 0);
    }

    #[test]
    fn rejects_fee_above_whole() {
        assert!(FeeSplit::compute(100, 10_001).is_err());
    }

    #[test]
    fn legs_skip_zero_amounts() {
        let merchant = WalletId::from("m");
        let platform = WalletId::from("p");
        let legs = FeeSplit::compute(39, 250).unwrap().legs(&merchant, &platform);
        assert_eq!(legs, vec![PaySplit::new(merchant, 39)]);
    }
}
