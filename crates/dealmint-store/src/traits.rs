//! Record store seams.
//!
//! Each trait covers one table family. [`RecordStore`] is the union the
//! settlement engine depends on; any type implementing all six gets it for
//! free.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealmint_types::{
    ActivityKind, Badge, CashbackTransaction, Coupon, CouponId, CouponState, LedgerEvent,
    ListingId, ListingQuery, RedemptionQuery, RedemptionRecord, ResaleListing, ResaleSale, Stake,
    Tier, TxProof, UserProfile, WalletId,
};

use crate::StoreResult;

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()>;

    async fn get_coupon(&self, id: CouponId) -> StoreResult<Option<Coupon>>;

    /// Move the mirrored coupon to `target` with `owner`.
    ///
    /// Repeating a transition already applied is a no-op. A transition the
    /// lifecycle forbids returns [`crate::StoreError::StaleTransition`].
    async fn transition_coupon(
        &self,
        id: CouponId,
        target: CouponState,
        owner: Option<WalletId>,
    ) -> StoreResult<Coupon>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert a listing. At most one active listing per coupon.
    async fn insert_listing(&self, listing: &ResaleListing) -> StoreResult<()>;

    async fn get_listing(&self, id: ListingId) -> StoreResult<Option<ResaleListing>>;

    async fn active_listing_for(&self, coupon: CouponId) -> StoreResult<Option<ResaleListing>>;

    /// Conditional `active → inactive` flip without a sale. Returns `true`
    /// only for the caller that performed the flip.
    async fn deactivate_listing(&self, id: ListingId) -> StoreResult<bool>;

    /// Conditional flip that marks the listing sold to `buyer`. `proof` is
    /// unique across all sold listings: a proof that already closed another
    /// listing fails with [`crate::StoreError::ProofAlreadySettled`] and leaves this
    /// one active.
    async fn sell_listing(
        &self,
        id: ListingId,
        buyer: &WalletId,
        proof: &TxProof,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn query_listings(&self, query: &ListingQuery) -> StoreResult<Vec<ResaleListing>>;

    /// Write the sale for a listing. Rewriting the same listing is a no-op;
    /// a sale whose proof belongs to another listing is rejected.
    async fn record_sale(&self, sale: &ResaleSale) -> StoreResult<()>;

    async fn get_sale(&self, listing: ListingId) -> StoreResult<Option<ResaleSale>>;
}

#[async_trait]
pub trait RedemptionStore: Send + Sync {
    async fn redemption_by_coupon(&self, coupon: CouponId)
    -> StoreResult<Option<RedemptionRecord>>;

    async fn redemption_by_proof(&self, proof: &TxProof) -> StoreResult<Option<RedemptionRecord>>;

    /// Insert with coupon id and proof both unique. A violation on either
    /// index returns [`crate::StoreError::DuplicateRedemption`] carrying the
    /// record that holds the key.
    async fn insert_redemption(&self, record: &RedemptionRecord) -> StoreResult<()>;

    /// Matching records, newest first.
    async fn list_redemptions(&self, query: &RedemptionQuery)
    -> StoreResult<Vec<RedemptionRecord>>;
}

#[async_trait]
pub trait StakeStore: Send + Sync {
    async fn get_stake(&self, user: &WalletId) -> StoreResult<Option<Stake>>;

    /// Insert a first stake row. Conflicts if one already exists.
    async fn insert_stake(&self, stake: &Stake) -> StoreResult<Stake>;

    /// Replace the row if its stored version equals `expected_version`.
    /// The stored row gets `expected_version + 1`.
    async fn compare_and_swap_stake(
        &self,
        stake: &Stake,
        expected_version: u64,
    ) -> StoreResult<Stake>;
}

#[async_trait]
pub trait RewardStore: Send + Sync {
    async fn get_profile(&self, user: &WalletId) -> StoreResult<Option<UserProfile>>;

    /// Atomically increment one activity counter, creating the profile.
    async fn increment_counter(&self, user: &WalletId, kind: ActivityKind)
    -> StoreResult<UserProfile>;

    async fn set_tier(&self, user: &WalletId, tier: Tier) -> StoreResult<UserProfile>;

    /// Record a badge. Returns `false` if the user already holds that kind.
    async fn award_badge(&self, badge: &Badge) -> StoreResult<bool>;

    async fn badges(&self, user: &WalletId) -> StoreResult<Vec<Badge>>;

    /// Append a cashback row and add its amount to the user's lifetime
    /// total, as one operation.
    async fn append_cashback(&self, tx: &CashbackTransaction) -> StoreResult<UserProfile>;

    /// Most recent cashback rows for a user, newest first.
    async fn recent_cashback(
        &self,
        user: &WalletId,
        limit: usize,
    ) -> StoreResult<Vec<CashbackTransaction>>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event. Returns `false` if the id was already present.
    async fn append_event(&self, event: &LedgerEvent) -> StoreResult<bool>;

    async fn events_for(&self, coupon: CouponId) -> StoreResult<Vec<LedgerEvent>>;
}

/// Everything the settlement engine needs from the record store.
pub trait RecordStore:
    CouponStore + ListingStore + RedemptionStore + StakeStore + RewardStore + EventStore
{
}

impl<T> RecordStore for T where
    T: CouponStore + ListingStore + RedemptionStore + StakeStore + RewardStore + EventStore
{
}
