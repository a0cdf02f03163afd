//! Loyalty and reward types: tiers, badges, cashback ledger, user profile.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CashbackTxId, CouponId, WalletId};

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// User classification derived from lifetime redemptions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize,
)]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Ascending order.
    pub const ALL: [Tier; 4] = [Self::Bronze, Self::Silver, Self::Gold, Self::Platinum];

    /// Redemptions required to hold this tier.
    #[must_use]
    pub fn min_redemptions(&self) -> u64 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 6,
            Self::Gold => 21,
            Self::Platinum => 51,
        }
    }

    /// Bonus discount percentage granted at this tier.
    #[must_use]
    pub fn bonus_discount(&self) -> u8 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 5,
            Self::Gold => 10,
            Self::Platinum => 15,
        }
    }

    /// Highest tier whose threshold `redemptions` meets.
    #[must_use]
    pub fn for_redemptions(redemptions: u64) -> Self {
        Self::ALL
            .into_iter()
            .rev()
            .find(|t| redemptions >= t.min_redemptions())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => Some(Self::Platinum),
            Self::Platinum => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
        };
        f.write_str(s)
    }
}

/// Tier position and progress for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierProgress {
    pub current: Tier,
    pub total_redemptions: u64,
    pub next: Option<Tier>,
    pub redemptions_to_next: u64,
    pub bonus_discount: u8,
}

impl TierProgress {
    #[must_use]
    pub fn for_redemptions(total_redemptions: u64) -> Self {
        let current = Tier::for_redemptions(total_redemptions);
        let next = current.next();
        let redemptions_to_next = next.map_or(0, |n| {
            n.min_redemptions().saturating_sub(total_redemptions)
        });
        Self {
            current,
            total_redemptions,
            next,
            redemptions_to_next,
            bonus_discount: current.bonus_discount(),
        }
    }
}

// ---------------------------------------------------------------------------
// Badges
// ---------------------------------------------------------------------------

/// Activity counter a badge requirement is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Redemptions,
    Referrals,
    Reviews,
    Upvotes,
}

/// Milestone badge kinds. Each is earned at most once per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    FirstSteps,
    DealHunter,
    SavvyShopper,
    DiscountMaster,
    SocialButterfly,
    Influencer,
    Critic,
    CommunityChampion,
}

impl BadgeKind {
    pub const ALL: [BadgeKind; 8] = [
        Self::FirstSteps,
        Self::DealHunter,
        Self::SavvyShopper,
        Self::DiscountMaster,
        Self::SocialButterfly,
        Self::Influencer,
        Self::Critic,
        Self::CommunityChampion,
    ];

    /// The counter and threshold that unlock this badge.
    #[must_use]
    pub fn requirement(&self) -> (ActivityKind, u64) {
        match self {
            Self::FirstSteps => (ActivityKind::Redemptions, 1),
            Self::DealHunter => (ActivityKind::Redemptions, 10),
            Self::SavvyShopper => (ActivityKind::Redemptions, 25),
            Self::DiscountMaster => (ActivityKind::Redemptions, 50),
            Self::SocialButterfly => (ActivityKind::Referrals, 10),
            Self::Influencer => (ActivityKind::Referrals, 25),
            Self::Critic => (ActivityKind::Reviews, 20),
            Self::CommunityChampion => (ActivityKind::Upvotes, 50),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::FirstSteps => "First Steps",
            Self::DealHunter => "Deal Hunter",
            Self::SavvyShopper => "Savvy Shopper",
            Self::DiscountMaster => "Discount Master",
            Self::SocialButterfly => "Social Butterfly",
            Self::Influencer => "Influencer",
            Self::Critic => "Critic",
            Self::CommunityChampion => "Community Champion",
        }
    }
}

/// An earned badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub user: WalletId,
    pub kind: BadgeKind,
    /// Reference to the minted badge asset.
    pub mint_ref: String,
    pub earned_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cashback
// ---------------------------------------------------------------------------

/// Append-only cashback ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackTransaction {
    pub id: CashbackTxId,
    pub user: WalletId,
    pub coupon_id: CouponId,
    /// Awarded amount in minor units. Zero is a valid, recorded outcome.
    pub amount: u64,
    /// Tier at the time of the award.
    pub tier: Tier,
    /// Rate percent applied.
    pub rate_percent: u32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Reward bookkeeping for one wallet. Mutated only by side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub wallet: WalletId,
    pub tier: Tier,
    pub total_redemptions: u64,
    pub total_referrals: u64,
    pub total_reviews: u64,
    pub total_upvotes: u64,
    pub lifetime_cashback: u64,
}

impl UserProfile {
    #[must_use]
    pub fn new(wallet: WalletId) -> Self {
        Self {
            wallet,
            tier: Tier::Bronze,
            total_redemptions: 0,
            total_referrals: 0,
            total_reviews: 0,
            total_upvotes: 0,
            lifetime_cashback: 0,
        }
    }

    #[must_use]
    pub fn counter(&self, kind: ActivityKind) -> u64 {
        match kind {
            ActivityKind::Redemptions => self.total_redemptions,
            ActivityKind::Referrals => self.total_referrals,
            ActivityKind::Reviews => self.total_reviews,
            ActivityKind::Upvotes => self.total_upvotes,
        }
    }
}
