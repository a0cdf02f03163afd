//! Bounded wait for ledger confirmation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dealmint_types::{
    ConfirmedTransfer, CouponId, DealmintError, PaySplit, Result, TokenMove, TxProof, WalletId,
};

use crate::LedgerClient;

/// Wraps a [`LedgerClient`] so that no call waits longer than `timeout`.
///
/// An elapsed call returns [`DealmintError::LedgerTimeout`]. The underlying
/// transaction may still have landed; callers reconcile on retry.
pub struct Confirmed<L> {
    inner: L,
    timeout: Duration,
}

impl<L: LedgerClient> Confirmed<L> {
    #[must_use]
    pub fn new(inner: L, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    #[must_use]
    pub fn inner(&self) -> &L {
        &self.inner
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        if let Ok(result) = tokio::time::timeout(self.timeout, fut).await {
            result
        } else {
            tracing::warn!(op, timeout = ?self.timeout, "ledger confirmation timed out");
            Err(DealmintError::LedgerTimeout { op: op.to_string() })
        }
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for Confirmed<L> {
    async fn mint_to_escrow(&self, token: CouponId) -> Result<TxProof> {
        self.bounded("mint_to_escrow", self.inner.mint_to_escrow(token))
            .await
    }

    async fn transfer_custody(
        &self,
        token: CouponId,
        from: &WalletId,
        to: &WalletId,
    ) -> Result<TxProof> {
        self.bounded(
            "transfer_custody",
            self.inner.transfer_custody(token, from, to),
        )
        .await
    }

    async fn atomic_pay_split(
        &self,
        payer: &WalletId,
        splits: &[PaySplit],
        token_move: Option<&TokenMove>,
    ) -> Result<TxProof> {
        self.bounded(
            "atomic_pay_split",
            self.inner.atomic_pay_split(payer, splits, token_move),
        )
        .await
    }

    async fn account_balance(&self, account: &WalletId, token: CouponId) -> Result<u64> {
        self.bounded("account_balance", self.inner.account_balance(account, token))
            .await
    }

    async fn native_balance(&self, account: &WalletId) -> Result<u64> {
        self.bounded("native_balance", self.inner.native_balance(account))
            .await
    }

    async fn confirmation(&self, proof: &TxProof) -> Result<Option<ConfirmedTransfer>> {
        self.bounded("confirmation", self.inner.confirmation(proof))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLedger;
    use std::sync::Arc;

    #[tokio::test]
    async fn timeout_after_transfer_landed() {
        let ledger = Arc::new(InMemoryLedger::new("seed"));
        let confirmed = Confirmed::new(Arc::clone(&ledger), Duration::from_millis(20));
        let token = CouponId::new();
        let alice = WalletId::random();

        confirmed.mint_to_escrow(token).await.unwrap();
        ledger.set_confirmation_delay(Duration::from_millis(200));

        let err = confirmed
            .transfer_custody(token, &token.escrow_account(), &alice)
            .await
            .unwrap_err();
        assert!(matches!(err, DealmintError::LedgerTimeout { .. }));
        assert!(err.is_retryable());

        // The transfer applied before confirmation was awaited.
        assert_eq!(confirmed.account_balance(&alice, token).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn passes_through_within_bound() {
        let ledger = InMemoryLedger::new("seed");
        let confirmed = Confirmed::new(ledger, Duration::from_secs(1));
        let token = CouponId::new();
        confirmed.mint_to_escrow(token).await.unwrap();
        assert_eq!(
            confirmed
                .inner()
                .account_balance(&token.escrow_account(), token)
                .await
                .unwrap(),
            1
        );
    }
}
