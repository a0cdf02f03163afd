//! The ledger client seam.

use std::sync::Arc;

use async_trait::async_trait;
use dealmint_types::{ConfirmedTransfer, CouponId, PaySplit, Result, TokenMove, TxProof, WalletId};

/// Access to the authoritative external ledger.
///
/// Every mutating call returns only once the transaction is confirmed, and
/// yields the proof the ledger signed for it. Implementations must apply each
/// call atomically: either every leg lands or none does.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Mint the singleton token for `token` into its escrow account.
    ///
    /// Rejected if the token already has supply.
    async fn mint_to_escrow(&self, token: CouponId) -> Result<TxProof>;

    /// Move the token from `from` to `to`, creating the receiving account if
    /// absent. Rejected if `from` does not hold it.
    async fn transfer_custody(
        &self,
        token: CouponId,
        from: &WalletId,
        to: &WalletId,
    ) -> Result<TxProof>;

    /// Debit `payer` by the sum of `splits`, credit each split, and apply the
    /// optional token move, as one transaction.
    async fn atomic_pay_split(
        &self,
        payer: &WalletId,
        splits: &[PaySplit],
        token_move: Option<&TokenMove>,
    ) -> Result<TxProof>;

    /// Token balance (0 or 1) of `account` for `token`.
    async fn account_balance(&self, account: &WalletId, token: CouponId) -> Result<u64>;

    /// Native currency balance in minor units.
    async fn native_balance(&self, account: &WalletId) -> Result<u64>;

    /// Look up a confirmed transaction by proof.
    ///
    /// `Ok(None)` if unknown. `InvalidProof` if the record exists but its
    /// signature does not verify.
    async fn confirmation(&self, proof: &TxProof) -> Result<Option<ConfirmedTransfer>>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn mint_to_escrow(&self, token: CouponId) -> Result<TxProof> {
        (**self).mint_to_escrow(token).await
    }

    async fn transfer_custody(
        &self,
        token: CouponId,
        from: &WalletId,
        to: &WalletId,
    ) -> Result<TxProof> {
        (**self).transfer_custody(token, from, to).await
    }

    async fn atomic_pay_split(
        &self,
        payer: &WalletId,
        splits: &[PaySplit],
        token_move: Option<&TokenMove>,
    ) -> Result<TxProof> {
        (**self).atomic_pay_split(payer, splits, token_move).await
    }

    async fn account_balance(&self, account: &WalletId, token: CouponId) -> Result<u64> {
        (**self).account_balance(account, token).await
    }

    async fn native_balance(&self, account: &WalletId) -> Result<u64> {
        (**self).native_balance(account).await
    }

    async fn confirmation(&self, proof: &TxProof) -> Result<Option<ConfirmedTransfer>> {
        (**self).confirmation(proof).await
    }
}
