//! Types exchanged with the external ledger.
//!
//! The ledger is authoritative for token custody and native balances. Every
//! confirmed transaction yields a [`TxProof`] that can later be looked up as
//! a [`ConfirmedTransfer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CouponId, TxProof, WalletId};

/// One credit leg of an atomic payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaySplit {
    pub recipient: WalletId,
    pub amount: u64,
}

impl PaySplit {
    #[must_use]
    pub fn new(recipient: WalletId, amount: u64) -> Self {
        Self { recipient, amount }
    }
}

/// A custody move of a singleton token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMove {
    pub token: CouponId,
    pub from: WalletId,
    pub to: WalletId,
}

/// What the ledger recorded for a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTransfer {
    pub proof: TxProof,
    /// Token moved by this transaction, if any.
    pub token_move: Option<TokenMove>,
    /// Payer debited for `splits`, if any.
    pub payer: Option<WalletId>,
    pub splits: Vec<PaySplit>,
    pub confirmed_at: DateTime<Utc>,
}

impl ConfirmedTransfer {
    /// Total credited to `recipient` by this transaction.
    #[must_use]
    pub fn paid_to(&self, recipient: &WalletId) -> u64 {
        self.splits
            .iter()
            .filter(|s| &s.recipient == recipient)
            .fold(0u64, |acc, s| acc.saturating_add(s.amount))
    }

    /// Whether this transaction moved `token` from `from` to `to`.
    #[must_use]
    pub fn moved(&self, token: CouponId, from: &WalletId, to: &WalletId) -> bool {
        self.token_move
            .as_ref()
            .is_some_and(|m| m.token == token && &m.from == from && &m.to == to)
    }
}
