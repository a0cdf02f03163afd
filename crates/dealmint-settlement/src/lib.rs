//! # dealmint-settlement
//!
//! The settlement plane of the DealMint coupon engine.
//!
//! - **Escrow release** ([`EscrowDesk`]): issue coupons into custody, release
//!   them by free claim or paid purchase with a platform fee split
//! - **Resale** ([`Marketplace`]): list, verify buyer-settled payment proofs,
//!   close listings with a single-winner flip
//! - **Redemption** ([`RedemptionGuard`]): exactly-once commit backed by
//!   unique store indexes, followed by best-effort [`SideEffects`]
//! - **Rewards** ([`StakingDesk`], [`cashback`], [`loyalty`]): continuous
//!   staking interest, tiered cashback, tiers and badges
//! - **Plumbing**: [`Clock`], backoff ([`retry`]), and the [`outbox`] worker
//!   that lands deferred store writes
//!
//! [`SettlementEngine`] ties these together behind one facade.

pub mod accrual;
pub mod cashback;
pub mod clock;
pub mod context;
pub mod engine;
pub mod escrow;
pub mod fees;
pub mod loyalty;
pub mod marketplace;
pub mod outbox;
pub mod redemption;
pub mod retry;
pub mod side_effects;

pub use accrual::{RewardsClaimed, StakeInfo, StakingDesk, Unstaked};
pub use cashback::compute_cashback;
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::EngineContext;
pub use engine::SettlementEngine;
pub use escrow::{Acquisition, EscrowDesk};
pub use fees::FeeSplit;
pub use loyalty::{LoyaltyUpdate, RewardsProfile};
pub use marketplace::Marketplace;
pub use outbox::{DeadLetter, OutboxHandle, OutboxJob};
pub use redemption::RedemptionGuard;
pub use side_effects::SideEffects;
