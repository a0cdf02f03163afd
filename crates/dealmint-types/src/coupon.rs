//! # Coupon: the singleton redeemable token
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────────┐ claim/purchase ┌───────┐  list   ┌────────┐
//!   │ ESCROWED ├───────────────▶│ OWNED │◀───────▶│ LISTED │
//!   └──────────┘                └───┬───┘ sale/   └───┬────┘
//!                                   │     cancel      │
//!                        redeem     ▼                 │ redeem
//!                             ┌──────────┐            │
//!                             │ REDEEMED │◀───────────┘
//!                             └──────────┘
//!   OWNED / LISTED ── expiry ──▶ EXPIRED   (advisory)
//! ```
//!
//! REDEEMED and EXPIRED are terminal. The store mirrors this state; the
//! ledger stays authoritative for who actually holds the token.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CouponId, DealmintError, Result, WalletId};

/// Lifecycle state of a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponState {
    /// Minted into the custodial escrow account, not yet released.
    Escrowed,
    /// Released to a user.
    Owned,
    /// Owned and offered on the resale marketplace.
    Listed,
    /// Consumed at point of sale. **Terminal.**
    Redeemed,
    /// Expiry passed unredeemed. **Terminal.**
    Expired,
}

impl CouponState {
    /// Can a coupon in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Escrowed, Self::Owned)
                | (Self::Owned, Self::Listed | Self::Redeemed | Self::Expired)
                | (Self::Listed, Self::Owned | Self::Redeemed | Self::Expired)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Redeemed | Self::Expired)
    }
}

impl fmt::Display for CouponState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Escrowed => write!(f, "ESCROWED"),
            Self::Owned => write!(f, "OWNED"),
            Self::Listed => write!(f, "LISTED"),
            Self::Redeemed => write!(f, "REDEEMED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Deal category. Drives the cashback multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Food & Beverage")]
    FoodBeverage,
    Retail,
    Services,
    Travel,
    Entertainment,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::FoodBeverage,
        Self::Retail,
        Self::Services,
        Self::Travel,
        Self::Entertainment,
        Self::Other,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FoodBeverage => "Food & Beverage",
            Self::Retail => "Retail",
            Self::Services => "Services",
            Self::Travel => "Travel",
            Self::Entertainment => "Entertainment",
            Self::Other => "Other",
        };
        f.write_str(s)
    }
}

/// Terms a merchant supplies when issuing a coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponTerms {
    pub title: String,
    /// Discount percentage, 1–100.
    pub discount_percent: u8,
    /// Price in minor units. `None` or `Some(0)` means free.
    pub price: Option<u64>,
    pub category: Category,
    pub expires_at: DateTime<Utc>,
}

impl CouponTerms {
    /// Validate the terms against `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DealmintError::InvalidTerms {
                reason: "title must not be empty".into(),
            });
        }
        if !(1..=100).contains(&self.discount_percent) {
            return Err(DealmintError::InvalidTerms {
                reason: format!(
                    "discount must be 1-100, got {}",
                    self.discount_percent
                ),
            });
        }
        if self.expires_at <= now {
            return Err(DealmintError::InvalidTerms {
                reason: "expiry must be in the future".into(),
            });
        }
        Ok(())
    }
}

/// A coupon row as mirrored in the record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Issuing merchant's wallet. Receives the issuer share of a purchase.
    pub merchant: WalletId,
    pub title: String,
    pub discount_percent: u8,
    pub price: Option<u64>,
    pub category: Category,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub state: CouponState,
    /// Current holder as last mirrored from the ledger. `None` while escrowed.
    pub owner: Option<WalletId>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// A freshly issued coupon, sitting in escrow.
    #[must_use]
    pub fn issued(merchant: WalletId, terms: CouponTerms, now: DateTime<Utc>) -> Self {
        Self {
            id: CouponId::new(),
            merchant,
            title: terms.title,
            discount_percent: terms.discount_percent,
            price: terms.price,
            category: terms.category,
            expires_at: terms.expires_at,
            active: true,
            state: CouponState::Escrowed,
            owner: None,
            created_at: now,
        }
    }

    /// Price in minor units, zero for free coupons.
    #[must_use]
    pub fn price_or_zero(&self) -> u64 {
        self.price.unwrap_or(0)
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.price_or_zero() == 0
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check the coupon can be released from escrow at `now`.
    pub fn ensure_releasable(&self, now: DateTime<Utc>) -> Result<()> {
        if !self.active {
            return Err(DealmintError::CouponInactive(self.id));
        }
        if self.is_expired_at(now) {
            return Err(DealmintError::CouponExpired(self.id));
        }
        Ok(())
    }

    /// Attempt a lifecycle transition.
    pub fn transition(&mut self, target: CouponState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(DealmintError::InvalidTransition {
                coupon: self.id,
                from: self.state,
                to: target,
            });
        }
        self.state = target;
        Ok(())
    }
}

/// Dummy coupon for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Coupon {
    pub fn dummy(price: Option<u64>) -> Self {
        let now = Utc::now();
        Self::issued(
            WalletId::random(),
            CouponTerms {
                title: "10% off lunch".into(),
                discount_percent: 10,
                price,
                category: Category::FoodBeverage,
                expires_at: now + chrono::Duration::days(30),
            },
            now,
        )
    }
}
