//! Redemption records: the permanent proof a coupon was consumed.
//!
//! Both `coupon_id` and `tx_proof` are globally unique across all time. The
//! store enforces each with its own unique index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CouponId, RedemptionId, TxProof, WalletId};

/// A redemption attempt as submitted at the point of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub coupon_id: CouponId,
    pub tx_proof: TxProof,
    pub user: WalletId,
    pub merchant: WalletId,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A committed redemption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    pub id: RedemptionId,
    pub coupon_id: CouponId,
    pub tx_proof: TxProof,
    pub user: WalletId,
    pub merchant: WalletId,
    pub redeemed_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl RedemptionRecord {
    #[must_use]
    pub fn from_request(request: RedemptionRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: RedemptionId::new(),
            coupon_id: request.coupon_id,
            tx_proof: request.tx_proof,
            user: request.user,
            merchant: request.merchant,
            redeemed_at: now,
            metadata: request.metadata,
        }
    }
}

/// Filter for listing redemptions. Empty filter returns everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedemptionQuery {
    #[serde(default)]
    pub merchant: Option<WalletId>,
    #[serde(default)]
    pub user: Option<WalletId>,
}

impl RedemptionQuery {
    #[must_use]
    pub fn matches(&self, record: &RedemptionRecord) -> bool {
        self.merchant.as_ref().is_none_or(|m| *m == record.merchant)
            && self.user.as_ref().is_none_or(|u| *u == record.user)
    }
}
