//! Error types for the DealMint settlement engine.
//!
//! All errors use the `DM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Coupon / escrow errors
//! - 2xx: Funds and arithmetic errors
//! - 3xx: Ledger errors
//! - 4xx: Marketplace errors
//! - 5xx: Redemption errors
//! - 6xx: Reward errors
//! - 7xx: Record store errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{ActivityKind, CouponId, CouponState, ListingId, RedemptionId, WalletId};

/// Central error enum for all DealMint operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DealmintError {
    // =================================================================
    // Coupon / Escrow Errors (1xx)
    // =================================================================
    #[error("DM_ERR_100: Coupon not found: {0}")]
    CouponNotFound(CouponId),

    /// Issuance terms failed validation.
    #[error("DM_ERR_101: Invalid coupon terms: {reason}")]
    InvalidTerms { reason: String },

    #[error("DM_ERR_102: Coupon is not active: {0}")]
    CouponInactive(CouponId),

    #[error("DM_ERR_103: Coupon expired: {0}")]
    CouponExpired(CouponId),

    /// Claim attempted on a coupon with a price.
    #[error("DM_ERR_104: Coupon {0} is not free, purchase it instead")]
    NotFreeCoupon(CouponId),

    /// Purchase attempted on a free coupon.
    #[error("DM_ERR_105: Coupon {0} is free, claim it instead")]
    NotPaidCoupon(CouponId),

    /// The token already left escrow to another holder.
    #[error("DM_ERR_106: Coupon {0} is no longer in escrow")]
    NotInEscrow(CouponId),

    /// The requester already holds the token. Signals a landed retry.
    #[error("DM_ERR_107: Coupon {0} already claimed by requester")]
    AlreadyClaimed(CouponId),

    #[error("DM_ERR_108: Invalid coupon transition for {coupon}: {from} -> {to}")]
    InvalidTransition {
        coupon: CouponId,
        from: CouponState,
        to: CouponState,
    },

    #[error("DM_ERR_109: Invalid wallet address: {0:?}")]
    InvalidWallet(WalletId),

    // =================================================================
    // Funds Errors (2xx)
    // =================================================================
    #[error("DM_ERR_200: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// A monetary computation left the representable range.
    #[error("DM_ERR_201: Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("DM_ERR_202: Amount must be greater than zero")]
    InvalidAmount,

    // =================================================================
    // Ledger Errors (3xx)
    // =================================================================
    #[error("DM_ERR_300: Ledger rejected transaction: {reason}")]
    LedgerRejected { reason: String },

    /// Confirmation did not arrive in time. The transfer may have landed.
    #[error("DM_ERR_301: Ledger confirmation timed out during {op}")]
    LedgerTimeout { op: String },

    #[error("DM_ERR_302: Invalid ledger proof: {reason}")]
    InvalidProof { reason: String },

    // =================================================================
    // Marketplace Errors (4xx)
    // =================================================================
    /// The listing is missing, sold or cancelled.
    #[error("DM_ERR_400: Listing no longer available: {0}")]
    ListingGone(ListingId),

    #[error("DM_ERR_401: Self-trade prevented: buyer is the seller")]
    SelfTrade,

    #[error("DM_ERR_402: Coupon {coupon} already has active listing {existing}")]
    AlreadyListed {
        coupon: CouponId,
        existing: ListingId,
    },

    #[error("DM_ERR_403: Wallet does not own the coupon or listing")]
    NotOwner,

    #[error("DM_ERR_404: Ask price must be greater than zero")]
    InvalidPrice,

    // =================================================================
    // Redemption Errors (5xx)
    // =================================================================
    #[error("DM_ERR_500: Coupon already redeemed (record {existing})")]
    AlreadyRedeemed { existing: RedemptionId },

    /// The transaction proof was already used by another redemption.
    #[error("DM_ERR_501: Duplicate submission (record {existing})")]
    DuplicateSubmission { existing: RedemptionId },

    #[error("DM_ERR_502: Coupon {0} is redeemed and cannot be traded")]
    CouponRedeemed(CouponId),

    // =================================================================
    // Reward Errors (6xx)
    // =================================================================
    #[error("DM_ERR_600: No stake")]
    NoStake,

    #[error("DM_ERR_601: No rewards to claim")]
    NoRewards,

    /// Redemptions are counted by the redemption path only.
    #[error("DM_ERR_602: Activity {0:?} cannot be recorded directly")]
    ActivityNotRecordable(ActivityKind),

    // =================================================================
    // Store Errors (7xx)
    // =================================================================
    /// Optimistic-lock conflict. Retryable.
    #[error("DM_ERR_700: Store write conflict on {entity}")]
    StoreConflict { entity: String },

    #[error("DM_ERR_701: Store error: {0}")]
    Store(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// A retryable operation failed on every attempt.
    #[error("DM_ERR_900: {op} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        op: String,
        attempts: u32,
        last: String,
    },

    #[error("DM_ERR_901: Internal error: {0}")]
    Internal(String),

    #[error("DM_ERR_902: Serialization error: {0}")]
    Serialization(String),

    #[error("DM_ERR_903: Configuration error: {0}")]
    Configuration(String),
}

impl DealmintError {
    /// Whether the operation that produced this error may be retried as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerTimeout { .. } | Self::StoreConflict { .. })
    }

    /// The `DM_ERR_xxx` code of this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CouponNotFound(_) => "DM_ERR_100",
            Self::InvalidTerms { .. } => "DM_ERR_101",
            Self::CouponInactive(_) => "DM_ERR_102",
            Self::CouponExpired(_) => "DM_ERR_103",
            Self::NotFreeCoupon(_) => "DM_ERR_104",
            Self::NotPaidCoupon(_) => "DM_ERR_105",
            Self::NotInEscrow(_) => "DM_ERR_106",
            Self::AlreadyClaimed(_) => "DM_ERR_107",
            Self::InvalidTransition { .. } => "DM_ERR_108",
            Self::InvalidWallet(_) => "DM_ERR_109",
            Self::InsufficientFunds { .. } => "DM_ERR_200",
            Self::ArithmeticOverflow => "DM_ERR_201",
            Self::InvalidAmount => "DM_ERR_202",
            Self::LedgerRejected { .. } => "DM_ERR_300",
            Self::LedgerTimeout { .. } => "DM_ERR_301",
            Self::InvalidProof { .. } => "DM_ERR_302",
            Self::ListingGone(_) => "DM_ERR_400",
            Self::SelfTrade => "DM_ERR_401",
            Self::AlreadyListed { .. } => "DM_ERR_402",
            Self::NotOwner => "DM_ERR_403",
            Self::InvalidPrice => "DM_ERR_404",
            Self::AlreadyRedeemed { .. } => "DM_ERR_500",
            Self::DuplicateSubmission { .. } => "DM_ERR_501",
            Self::CouponRedeemed(_) => "DM_ERR_502",
            Self::NoStake => "DM_ERR_600",
            Self::NoRewards => "DM_ERR_601",
            Self::ActivityNotRecordable(_) => "DM_ERR_602",
            Self::StoreConflict { .. } => "DM_ERR_700",
            Self::Store(_) => "DM_ERR_701",
            Self::RetriesExhausted { .. } => "DM_ERR_900",
            Self::Internal(_) => "DM_ERR_901",
            Self::Serialization(_) => "DM_ERR_902",
            Self::Configuration(_) => "DM_ERR_903",
        }
    }

    /// ID of the conflicting record, where one exists.
    #[must_use]
    pub fn reference_id(&self) -> Option<String> {
        match self {
            Self::AlreadyRedeemed { existing } | Self::DuplicateSubmission { existing } => {
                Some(existing.to_string())
            }
            Self::AlreadyListed { existing, .. } => Some(existing.to_string()),
            _ => None,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, DealmintError>;

impl From<serde_json::Error> for DealmintError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
