//! # dealmint-types
//!
//! Shared types, errors, and configuration for the **DealMint** coupon
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace. Every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`CouponId`], [`ListingId`], [`RedemptionId`], [`CashbackTxId`], [`EventId`], [`WalletId`], [`TxProof`]
//! - **Coupon model**: [`Coupon`], [`CouponState`], [`CouponTerms`], [`Category`]
//! - **Marketplace model**: [`ResaleListing`], [`ResaleSale`], [`ListingQuery`], [`ListingSort`]
//! - **Redemption model**: [`RedemptionRequest`], [`RedemptionRecord`], [`RedemptionQuery`]
//! - **Rewards model**: [`Stake`], [`Tier`], [`TierProgress`], [`BadgeKind`], [`Badge`], [`CashbackTransaction`], [`UserProfile`]
//! - **Ledger model**: [`PaySplit`], [`TokenMove`], [`ConfirmedTransfer`]
//! - **Outbox model**: [`LedgerEvent`], [`EventKind`]
//! - **Configuration**: [`EngineConfig`], [`RetryPolicy`]
//! - **Errors**: [`DealmintError`] with `DM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod coupon;
pub mod error;
pub mod event;
pub mod ids;
pub mod ledger;
pub mod listing;
pub mod redemption;
pub mod rewards;
pub mod stake;

// Re-export all primary types at crate root for ergonomic imports:
//   use dealmint_types::{Coupon, CouponState, Stake, ...};

pub use config::*;
pub use coupon::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use ledger::*;
pub use listing::*;
pub use redemption::*;
pub use rewards::*;
pub use stake::*;

// Constants are accessed via `dealmint_types::constants::FOO`
// (not re-exported to avoid name collisions).
