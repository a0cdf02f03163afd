//! In-memory record store for development and tests.
//!
//! Each table family sits behind its own `RwLock`. Every operation that must
//! be atomic (unique-index inserts, the listing flip, stake CAS, cashback
//! append with lifetime total) runs entirely under one write guard.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealmint_types::{
    ActivityKind, Badge, BadgeKind, CashbackTransaction, Coupon, CouponId, CouponState, EventId,
    LedgerEvent, ListingId, ListingQuery, RedemptionId, RedemptionQuery, RedemptionRecord,
    ResaleListing, ResaleSale, Stake, Tier, TxProof, UserProfile, WalletId,
};

use crate::{
    CouponStore, EventStore, ListingStore, RedemptionStore, RewardStore, StakeStore, StoreError,
    StoreResult,
};

/// Write paths that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    CouponWrite,
    SaleWrite,
    EventAppend,
    /// Fails with a version conflict rather than a backend error.
    StakeWrite,
    /// Tier and badge writes. Counter increments are not affected.
    ProfileWrite,
}

#[derive(Default)]
struct ListingTable {
    rows: HashMap<ListingId, ResaleListing>,
    /// Partial unique index: active listings only.
    active_by_coupon: HashMap<CouponId, ListingId>,
    /// Unique index: the proof that closed each sold listing.
    sold_by_proof: HashMap<TxProof, ListingId>,
}

#[derive(Default)]
struct SaleTable {
    rows: HashMap<ListingId, ResaleSale>,
    by_proof: HashMap<TxProof, ListingId>,
}

#[derive(Default)]
struct RedemptionTable {
    rows: HashMap<RedemptionId, RedemptionRecord>,
    by_coupon: HashMap<CouponId, RedemptionId>,
    by_proof: HashMap<TxProof, RedemptionId>,
}

#[derive(Default)]
struct RewardTables {
    profiles: HashMap<WalletId, UserProfile>,
    badges: BTreeMap<(WalletId, BadgeKind), Badge>,
    /// Append order is chronological.
    cashback: Vec<CashbackTransaction>,
}

#[derive(Default)]
struct EventTable {
    rows: Vec<LedgerEvent>,
    ids: HashSet<EventId>,
}

/// Single-process [`crate::RecordStore`].
#[derive(Default)]
pub struct InMemoryStore {
    coupons: RwLock<HashMap<CouponId, Coupon>>,
    listings: RwLock<ListingTable>,
    sales: RwLock<SaleTable>,
    redemptions: RwLock<RedemptionTable>,
    stakes: RwLock<HashMap<WalletId, Stake>>,
    rewards: RwLock<RewardTables>,
    events: RwLock<EventTable>,
    faults: Mutex<HashMap<FaultPoint, u32>>,
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Backend("lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Backend("lock poisoned".into()))
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes at `point` fail.
    pub fn fail_next(&self, point: FaultPoint, n: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point, n);
        }
    }

    fn check_fault(&self, point: FaultPoint) -> StoreResult<()> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        match faults.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                tracing::debug!(?point, "injected store fault");
                Err(match point {
                    FaultPoint::StakeWrite => StoreError::VersionConflict {
                        entity: "stake".into(),
                    },
                    _ => StoreError::Backend(format!("injected failure at {point:?}")),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> StoreResult<()> {
        self.check_fault(FaultPoint::CouponWrite)?;
        write(&self.coupons)?.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn get_coupon(&self, id: CouponId) -> StoreResult<Option<Coupon>> {
        Ok(read(&self.coupons)?.get(&id).cloned())
    }

    async fn transition_coupon(
        &self,
        id: CouponId,
        target: CouponState,
        owner: Option<WalletId>,
    ) -> StoreResult<Coupon> {
        self.check_fault(FaultPoint::CouponWrite)?;
        let mut coupons = write(&self.coupons)?;
        let coupon = coupons.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "coupon",
            id: id.to_string(),
        })?;
        let from = coupon.state;
        if from != target {
            coupon
                .transition(target)
                .map_err(|_| StoreError::StaleTransition {
                    coupon: id,
                    from,
                    to: target,
                })?;
        }
        if owner.is_some() {
            coupon.owner = owner;
        }
        Ok(coupon.clone())
    }
}

#[async_trait]
impl ListingStore for InMemoryStore {
    async fn insert_listing(&self, listing: &ResaleListing) -> StoreResult<()> {
        let mut table = write(&self.listings)?;
        if listing.active {
            if let Some(existing) = table.active_by_coupon.get(&listing.coupon_id) {
                return Err(StoreError::ActiveListingExists {
                    coupon: listing.coupon_id,
                    existing: *existing,
                });
            }
            table.active_by_coupon.insert(listing.coupon_id, listing.id);
        }
        table.rows.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get_listing(&self, id: ListingId) -> StoreResult<Option<ResaleListing>> {
        Ok(read(&self.listings)?.rows.get(&id).cloned())
    }

    async fn active_listing_for(&self, coupon: CouponId) -> StoreResult<Option<ResaleListing>> {
        let table = read(&self.listings)?;
        Ok(table
            .active_by_coupon
            .get(&coupon)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn deactivate_listing(&self, id: ListingId) -> StoreResult<bool> {
        let mut table = write(&self.listings)?;
        let Some(listing) = table.rows.get_mut(&id).filter(|l| l.active) else {
            return Ok(false);
        };
        listing.active = false;
        let coupon = listing.coupon_id;
        table.active_by_coupon.remove(&coupon);
        Ok(true)
    }

    async fn sell_listing(
        &self,
        id: ListingId,
        buyer: &WalletId,
        proof: &TxProof,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut table = write(&self.listings)?;
        if let Some(&listing) = table.sold_by_proof.get(proof) {
            if listing != id {
                return Err(StoreError::ProofAlreadySettled { listing });
            }
        }
        let Some(listing) = table.rows.get_mut(&id).filter(|l| l.active) else {
            return Ok(false);
        };
        listing.active = false;
        listing.buyer = Some(buyer.clone());
        listing.sold_at = Some(at);
        let coupon = listing.coupon_id;
        table.active_by_coupon.remove(&coupon);
        table.sold_by_proof.insert(proof.clone(), id);
        Ok(true)
    }

    async fn query_listings(&self, query: &ListingQuery) -> StoreResult<Vec<ResaleListing>> {
        let table = read(&self.listings)?;
        let mut matched: Vec<ResaleListing> = table
            .rows
            .values()
            .filter(|l| query.matches(l))
            .cloned()
            .collect();
        drop(table);
        query.apply_order(&mut matched);
        Ok(matched)
    }

    async fn record_sale(&self, sale: &ResaleSale) -> StoreResult<()> {
        self.check_fault(FaultPoint::SaleWrite)?;
        let mut table = write(&self.sales)?;
        match table.by_proof.get(&sale.proof) {
            Some(&listing) if listing != sale.listing_id => {
                return Err(StoreError::ProofAlreadySettled { listing });
            }
            Some(_) => return Ok(()),
            None => {}
        }
        table.by_proof.insert(sale.proof.clone(), sale.listing_id);
        table
            .rows
            .entry(sale.listing_id)
            .or_insert_with(|| sale.clone());
        Ok(())
    }

    async fn get_sale(&self, listing: ListingId) -> StoreResult<Option<ResaleSale>> {
        Ok(read(&self.sales)?.rows.get(&listing).cloned())
    }
}

#[async_trait]
impl RedemptionStore for InMemoryStore {
    async fn redemption_by_coupon(
        &self,
        coupon: CouponId,
    ) -> StoreResult<Option<RedemptionRecord>> {
        let table = read(&self.redemptions)?;
        Ok(table
            .by_coupon
            .get(&coupon)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn redemption_by_proof(&self, proof: &TxProof) -> StoreResult<Option<RedemptionRecord>> {
        let table = read(&self.redemptions)?;
        Ok(table
            .by_proof
            .get(proof)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn insert_redemption(&self, record: &RedemptionRecord) -> StoreResult<()> {
        let mut table = write(&self.redemptions)?;
        let existing = table
            .by_coupon
            .get(&record.coupon_id)
            .or_else(|| table.by_proof.get(&record.tx_proof));
        if let Some(existing) = existing {
            return Err(StoreError::DuplicateRedemption {
                existing: *existing,
            });
        }
        table.by_coupon.insert(record.coupon_id, record.id);
        table.by_proof.insert(record.tx_proof.clone(), record.id);
        table.rows.insert(record.id, record.clone());
        Ok(())
    }

    async fn list_redemptions(
        &self,
        query: &RedemptionQuery,
    ) -> StoreResult<Vec<RedemptionRecord>> {
        let table = read(&self.redemptions)?;
        let mut matched: Vec<RedemptionRecord> = table
            .rows
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        drop(table);
        matched.sort_by(|a, b| {
            b.redeemed_at
                .cmp(&a.redeemed_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(matched)
    }
}

#[async_trait]
impl StakeStore for InMemoryStore {
    async fn get_stake(&self, user: &WalletId) -> StoreResult<Option<Stake>> {
        Ok(read(&self.stakes)?.get(user).cloned())
    }

    async fn insert_stake(&self, stake: &Stake) -> StoreResult<Stake> {
        self.check_fault(FaultPoint::StakeWrite)?;
        let mut stakes = write(&self.stakes)?;
        if stakes.contains_key(&stake.user) {
            return Err(StoreError::VersionConflict {
                entity: format!("stake:{}", stake.user),
            });
        }
        stakes.insert(stake.user.clone(), stake.clone());
        Ok(stake.clone())
    }

    async fn compare_and_swap_stake(
        &self,
        stake: &Stake,
        expected_version: u64,
    ) -> StoreResult<Stake> {
        self.check_fault(FaultPoint::StakeWrite)?;
        let mut stakes = write(&self.stakes)?;
        let current = stakes.get(&stake.user).ok_or_else(|| StoreError::NotFound {
            entity: "stake",
            id: stake.user.to_string(),
        })?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: format!("stake:{}", stake.user),
            });
        }
        let mut next = stake.clone();
        next.version = expected_version + 1;
        stakes.insert(next.user.clone(), next.clone());
        Ok(next)
    }
}

#[async_trait]
impl RewardStore for InMemoryStore {
    async fn get_profile(&self, user: &WalletId) -> StoreResult<Option<UserProfile>> {
        Ok(read(&self.rewards)?.profiles.get(user).cloned())
    }

    async fn increment_counter(
        &self,
        user: &WalletId,
        kind: ActivityKind,
    ) -> StoreResult<UserProfile> {
        let mut tables = write(&self.rewards)?;
        let profile = tables
            .profiles
            .entry(user.clone())
            .or_insert_with(|| UserProfile::new(user.clone()));
        let counter = match kind {
            ActivityKind::Redemptions => &mut profile.total_redemptions,
            ActivityKind::Referrals => &mut profile.total_referrals,
            ActivityKind::Reviews => &mut profile.total_reviews,
            ActivityKind::Upvotes => &mut profile.total_upvotes,
        };
        *counter = counter.saturating_add(1);
        Ok(profile.clone())
    }

    async fn set_tier(&self, user: &WalletId, tier: Tier) -> StoreResult<UserProfile> {
        self.check_fault(FaultPoint::ProfileWrite)?;
        let mut tables = write(&self.rewards)?;
        let profile = tables
            .profiles
            .entry(user.clone())
            .or_insert_with(|| UserProfile::new(user.clone()));
        profile.tier = tier;
        Ok(profile.clone())
    }

    async fn award_badge(&self, badge: &Badge) -> StoreResult<bool> {
        self.check_fault(FaultPoint::ProfileWrite)?;
        let mut tables = write(&self.rewards)?;
        let key = (badge.user.clone(), badge.kind);
        if tables.badges.contains_key(&key) {
            return Ok(false);
        }
        tables.badges.insert(key, badge.clone());
        Ok(true)
    }

    async fn badges(&self, user: &WalletId) -> StoreResult<Vec<Badge>> {
        let tables = read(&self.rewards)?;
        Ok(tables
            .badges
            .values()
            .filter(|b| &b.user == user)
            .cloned()
            .collect())
    }

    async fn append_cashback(&self, tx: &CashbackTransaction) -> StoreResult<UserProfile> {
        let mut tables = write(&self.rewards)?;
        tables.cashback.push(tx.clone());
        let profile = tables
            .profiles
            .entry(tx.user.clone())
            .or_insert_with(|| UserProfile::new(tx.user.clone()));
        profile.lifetime_cashback = profile.lifetime_cashback.saturating_add(tx.amount);
        Ok(profile.clone())
    }

    async fn recent_cashback(
        &self,
        user: &WalletId,
        limit: usize,
    ) -> StoreResult<Vec<CashbackTransaction>> {
        let tables = read(&self.rewards)?;
        Ok(tables
            .cashback
            .iter()
            .rev()
            .filter(|tx| &tx.user == user)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn append_event(&self, event: &LedgerEvent) -> StoreResult<bool> {
        self.check_fault(FaultPoint::EventAppend)?;
        let mut table = write(&self.events)?;
        if !table.ids.insert(event.id) {
            return Ok(false);
        }
        table.rows.push(event.clone());
        Ok(true)
    }

    async fn events_for(&self, coupon: CouponId) -> StoreResult<Vec<LedgerEvent>> {
        Ok(read(&self.events)?
            .rows
            .iter()
            .filter(|e| e.coupon_id == coupon)
            .cloned()
            .collect())
    }
}
