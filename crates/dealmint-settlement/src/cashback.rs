//! Tiered cashback.
//!
//! ```text
//! deal_value = discount_percent × base_unit × category_multiplier
//! cashback   = floor(deal_value × tier_rate / 100)
//! ```

use chrono::{DateTime, Utc};
use dealmint_store::{RecordStore, RewardStore, StoreError};
use dealmint_types::{
    CashbackTransaction, CashbackTxId, Coupon, DealmintError, EngineConfig, Result, Tier, WalletId,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Cashback in minor units for one redemption.
pub fn compute_cashback(
    discount_percent: u8,
    base_unit: u64,
    multiplier: Decimal,
    rate_percent: u32,
) -> Result<u64> {
    let deal_value = Decimal::from(discount_percent)
        .checked_mul(Decimal::from(base_unit))
        .and_then(|v| v.checked_mul(multiplier))
        .ok_or(DealmintError::ArithmeticOverflow)?;
    let cashback = deal_value
        .checked_mul(Decimal::from(rate_percent))
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or(DealmintError::ArithmeticOverflow)?
        .floor();
    if cashback.is_sign_negative() {
        return Err(DealmintError::ArithmeticOverflow);
    }
    cashback.to_u64().ok_or(DealmintError::ArithmeticOverflow)
}

/// Compute and append cashback for `user` redeeming `coupon` at `tier`.
/// Appending the row and bumping the lifetime total are one store call.
pub async fn award<S: RecordStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    user: &WalletId,
    coupon: &Coupon,
    tier: Tier,
    now: DateTime<Utc>,
) -> std::result::Result<CashbackTransaction, AwardError> {
    let rate_percent = config.cashback_rate(tier);
    let amount = compute_cashback(
        coupon.discount_percent,
        config.cashback_base_unit,
        config.multiplier(coupon.category),
        rate_percent,
    )?;
    let tx = CashbackTransaction {
        id: CashbackTxId::new(),
        user: user.clone(),
        coupon_id: coupon.id,
        amount,
        tier,
        rate_percent,
        created_at: now,
    };
    store.append_cashback(&tx).await?;
    Ok(tx)
}

/// Why a cashback award failed.
#[derive(Debug, thiserror::Error)]
pub enum AwardError {
    #[error(transparent)]
    Compute(#[from] DealmintError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl crate::retry::Transient for AwardError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}
