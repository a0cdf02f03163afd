//! Store-level errors.

use dealmint_types::{CouponId, CouponState, DealmintError, ListingId, RedemptionId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Insert hit the coupon-id or proof unique index on redemptions.
    #[error("redemption unique index violated by existing record {existing}")]
    DuplicateRedemption { existing: RedemptionId },

    /// Insert hit the partial unique index on active listings.
    #[error("coupon {coupon} already has active listing {existing}")]
    ActiveListingExists {
        coupon: CouponId,
        existing: ListingId,
    },

    /// The payment proof already closed another listing.
    #[error("proof already settled listing {listing}")]
    ProofAlreadySettled { listing: ListingId },

    /// Optimistic-lock version mismatch.
    #[error("version conflict on {entity}")]
    VersionConflict { entity: String },

    /// Mirror update would move a coupon backwards.
    #[error("stale coupon transition for {coupon}: {from} -> {to}")]
    StaleTransition {
        coupon: CouponId,
        from: CouponState,
        to: CouponState,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether repeating the same write may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::VersionConflict { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for DealmintError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateRedemption { existing } => Self::AlreadyRedeemed { existing },
            StoreError::ActiveListingExists { coupon, existing } => {
                Self::AlreadyListed { coupon, existing }
            }
            StoreError::ProofAlreadySettled { listing } => Self::InvalidProof {
                reason: format!("proof already settled listing {listing}"),
            },
            StoreError::VersionConflict { entity } => Self::StoreConflict { entity },
            StoreError::StaleTransition { coupon, from, to } => {
                Self::InvalidTransition { coupon, from, to }
            }
            StoreError::NotFound { .. } | StoreError::Backend(_) => Self::Store(err.to_string()),
        }
    }
}
