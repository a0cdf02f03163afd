//! Redemption guard. Commits each coupon's redemption at most once.
//!
//! 1. Fast path: a record for the coupon ⇒ `AlreadyRedeemed`.
//! 2. Fast path: a record for the proof ⇒ `DuplicateSubmission`, or
//!    `AlreadyRedeemed` if that record is for this same coupon.
//! 3. Insert under the store's unique indexes on coupon id and proof. A
//!    violation means a concurrent submission won ⇒ `AlreadyRedeemed`
//!    carrying the winner's id.
//!
//! The lookups are an optimisation; step 3 alone is authoritative. The store
//! is the single source of truth for redeemed / not redeemed, regardless of
//! ledger custody.

use dealmint_store::{RecordStore, RedemptionStore};
use dealmint_types::{
    DealmintError, RedemptionQuery, RedemptionRecord, RedemptionRequest, Result,
};

use crate::clock::Clock;
use std::sync::Arc;

pub struct RedemptionGuard<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore> RedemptionGuard<S> {
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn redeem(&self, request: RedemptionRequest) -> Result<RedemptionRecord> {
        if !request.user.is_valid() {
            return Err(DealmintError::InvalidWallet(request.user));
        }
        if !request.merchant.is_valid() {
            return Err(DealmintError::InvalidWallet(request.merchant));
        }

        if let Some(existing) = self.store.redemption_by_coupon(request.coupon_id).await? {
            tracing::debug!(coupon = %request.coupon_id, existing = %existing.id, "already redeemed");
            return Err(DealmintError::AlreadyRedeemed {
                existing: existing.id,
            });
        }
        if let Some(existing) = self.store.redemption_by_proof(&request.tx_proof).await? {
            return Err(if existing.coupon_id == request.coupon_id {
                DealmintError::AlreadyRedeemed {
                    existing: existing.id,
                }
            } else {
                tracing::warn!(
                    coupon = %request.coupon_id,
                    proof = request.tx_proof.short(),
                    existing = %existing.id,
                    "transaction proof reused"
                );
                DealmintError::DuplicateSubmission {
                    existing: existing.id,
                }
            });
        }

        let record = RedemptionRecord::from_request(request, self.clock.now());
        // DuplicateRedemption converts to AlreadyRedeemed { existing }.
        self.store.insert_redemption(&record).await?;

        tracing::info!(
            redemption = %record.id,
            coupon = %record.coupon_id,
            user = %record.user,
            merchant = %record.merchant,
            proof = record.tx_proof.short(),
            "coupon redeemed"
        );
        Ok(record)
    }

    pub async fn redemptions(&self, query: &RedemptionQuery) -> Result<Vec<RedemptionRecord>> {
        Ok(self.store.list_redemptions(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use dealmint_store::InMemoryStore;
    use dealmint_types::{CouponId, TxProof, WalletId};

    fn guard() -> RedemptionGuard<InMemoryStore> {
        RedemptionGuard::new(Arc::new(InMemoryStore::new()), Arc::new(SystemClock))
    }

    fn request(coupon: CouponId, proof: &str) -> RedemptionRequest {
        RedemptionRequest {
            coupon_id: coupon,
            tx_proof: TxProof::new(proof),
            user: WalletId::from("alice"),
            merchant: WalletId::from("cafe"),
            metadata: serde_json::json!({ "register": 3 }),
        }
    }

    #[tokio::test]
    async fn second_redemption_of_coupon_rejected() {
        let guard = guard();
        let coupon = CouponId::new();
        let first = guard.redeem(request(coupon, "p1")).await.unwrap();
        let err = guard.redeem(request(coupon, "p2")).await.unwrap_err();
        assert_eq!(err, DealmintError::AlreadyRedeemed { existing: first.id });
    }

    #[tokio::test]
    async fn proof_reuse_on_another_coupon_is_duplicate_submission() {
        let guard = guard();
        let first = guard.redeem(request(CouponId::new(), "p1")).await.unwrap();
        let err = guard
            .redeem(request(CouponId::new(), "p1"))
            .await
            .unwrap_err();
        assert_eq!(err, DealmintError::DuplicateSubmission { existing: first.id });
    }

    #[tokio::test]
    async fn metadata_is_kept() {
        let guard = guard();
        let record = guard.redeem(request(CouponId::new(), "p1")).await.unwrap();
        assert_eq!(record.metadata["register"], 3);
        let listed = guard
            .redemptions(&RedemptionQuery {
                merchant: Some(WalletId::from("cafe")),
                user: None,
            })
            .await
            .unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[tokio::test]
    async fn invalid_wallets_rejected() {
        let guard = guard();
        let mut req = request(CouponId::new(), "p1");
        req.user = WalletId::from("");
        assert!(matches!(
            guard.redeem(req).await,
            Err(DealmintError::InvalidWallet(_))
        ));
    }
}
