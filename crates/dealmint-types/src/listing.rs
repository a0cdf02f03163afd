//! Resale marketplace types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CouponId, ListingId, TxProof, WalletId};

/// An offer to resell an owned coupon.
///
/// At most one listing per coupon is active at any time. A listing only
/// ever moves active → inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResaleListing {
    pub id: ListingId,
    pub coupon_id: CouponId,
    pub seller: WalletId,
    /// Ask price in minor units.
    pub ask_price: u64,
    pub active: bool,
    pub listed_at: DateTime<Utc>,
    /// Set when the listing closes through a sale.
    pub buyer: Option<WalletId>,
    pub sold_at: Option<DateTime<Utc>>,
}

impl ResaleListing {
    #[must_use]
    pub fn new(coupon_id: CouponId, seller: WalletId, ask_price: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: ListingId::new(),
            coupon_id,
            seller,
            ask_price,
            active: true,
            listed_at: now,
            buyer: None,
            sold_at: None,
        }
    }
}

/// A completed resale. Written once per listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResaleSale {
    pub listing_id: ListingId,
    pub coupon_id: CouponId,
    pub seller: WalletId,
    pub buyer: WalletId,
    pub price: u64,
    pub seller_proceeds: u64,
    pub platform_fee: u64,
    pub proof: TxProof,
    pub sold_at: DateTime<Utc>,
}

/// Sort order for browsing active listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

/// Filter for browsing active listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub min_price: Option<u64>,
    #[serde(default)]
    pub max_price: Option<u64>,
    #[serde(default)]
    pub sort: ListingSort,
    #[serde(default = "default_listing_limit")]
    pub limit: usize,
}

fn default_listing_limit() -> usize {
    crate::constants::DEFAULT_LISTING_PAGE_SIZE
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            min_price: None,
            max_price: None,
            sort: ListingSort::Newest,
            limit: default_listing_limit(),
        }
    }
}

impl ListingQuery {
    /// Whether an active listing passes the price filters.
    #[must_use]
    pub fn matches(&self, listing: &ResaleListing) -> bool {
        listing.active
            && self.min_price.is_none_or(|min| listing.ask_price >= min)
            && self.max_price.is_none_or(|max| listing.ask_price <= max)
    }

    /// Sort and truncate a filtered result set in place.
    pub fn apply_order(&self, listings: &mut Vec<ResaleListing>) {
        match self.sort {
            ListingSort::Newest => listings.sort_by(|a, b| {
                b.listed_at.cmp(&a.listed_at).then_with(|| b.id.cmp(&a.id))
            }),
            ListingSort::PriceAsc => {
                listings.sort_by(|a, b| a.ask_price.cmp(&b.ask_price).then_with(|| a.id.cmp(&b.id)));
            }
            ListingSort::PriceDesc => {
                listings.sort_by(|a, b| b.ask_price.cmp(&a.ask_price).then_with(|| a.id.cmp(&b.id)));
            }
        }
        listings.truncate(self.limit);
    }
}
