//! Outbox event rows mirroring ledger activity into the record store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CouponId, EventId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Claim or purchase out of escrow.
    Acquisition,
    Resale,
    Redemption,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquisition => write!(f, "ACQUISITION"),
            Self::Resale => write!(f, "RESALE"),
            Self::Redemption => write!(f, "REDEMPTION"),
        }
    }
}

/// An append-only event. Appending the same `id` twice is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub coupon_id: CouponId,
    pub wallet: WalletId,
    pub metadata: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEvent {
    #[must_use]
    pub fn new(
        kind: EventKind,
        coupon_id: CouponId,
        wallet: WalletId,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            kind,
            coupon_id,
            wallet,
            metadata,
            recorded_at: now,
        }
    }
}
