//! Globally unique identifiers used throughout DealMint.
//!
//! Record IDs use UUIDv7 for time-ordered lexicographic sorting. Wallets
//! and ledger transaction proofs are opaque strings owned by the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// CouponId
// ---------------------------------------------------------------------------

uuid_id! {
    /// Token identity of a coupon. One token = one redeemable unit.
    CouponId
}

impl CouponId {
    /// The custodial escrow account that holds this coupon between mint and
    /// first release.
    #[must_use]
    pub fn escrow_account(&self) -> WalletId {
        WalletId(format!("escrow:{}", self.0))
    }
}

// ---------------------------------------------------------------------------
// Record identifiers
// ---------------------------------------------------------------------------

uuid_id! {
    /// Identifier of a resale listing.
    ListingId
}

uuid_id! {
    /// Identifier of a committed redemption record.
    RedemptionId
}

uuid_id! {
    /// Identifier of an appended cashback transaction.
    CashbackTxId
}

uuid_id! {
    /// Identifier of an outbox event row. Appends are idempotent by this ID.
    EventId
}

// ---------------------------------------------------------------------------
// WalletId
// ---------------------------------------------------------------------------

/// A ledger account address: end user, merchant, platform or escrow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub String);

impl WalletId {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a program-controlled escrow account.
    #[must_use]
    pub fn is_escrow(&self) -> bool {
        self.0.starts_with("escrow:")
    }

    /// Addresses must be non-empty and free of whitespace.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl WalletId {
    /// Random wallet address for tests.
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(format!("wallet:{}", hex::encode(bytes)))
    }
}

// ---------------------------------------------------------------------------
// TxProof
// ---------------------------------------------------------------------------

/// A ledger transaction proof (the hex-encoded signature the ledger issued
/// on confirmation). Globally unique per confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxProof(pub String);

impl TxProof {
    #[must_use]
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl fmt::Display for TxProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
