//! Escrow release: issuing coupons into custody and releasing them to a
//! claimant or buyer.
//!
//! The escrow account holds the singleton token from mint until first
//! release, so its balance is always 0 or 1. That singleton is the only
//! guard against two concurrent releases: the ledger moves it once, and the
//! loser is told who holds it now.

use dealmint_ledger::LedgerClient;
use dealmint_store::{CouponStore, RecordStore};
use dealmint_types::{
    Coupon, CouponId, CouponState, CouponTerms, DealmintError, EventKind, LedgerEvent, Result,
    TokenMove, TxProof, WalletId,
};
use serde::{Deserialize, Serialize};

use crate::context::EngineContext;
use crate::fees::FeeSplit;
use crate::outbox::OutboxJob;

/// Outcome of a claim or purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acquisition {
    pub coupon_id: CouponId,
    pub owner: WalletId,
    /// `None` when a timed-out attempt was reconciled.
    pub proof: Option<TxProof>,
    pub price: u64,
    pub platform_fee: u64,
    pub issuer_proceeds: u64,
    /// The transfer landed during an attempt whose confirmation timed out.
    pub reconciled: bool,
}

pub struct EscrowDesk<L, S> {
    ctx: EngineContext<L, S>,
}

impl<L: LedgerClient, S: RecordStore> EscrowDesk<L, S> {
    #[must_use]
    pub fn new(ctx: EngineContext<L, S>) -> Self {
        Self { ctx }
    }

    /// Validate terms, mint the token into escrow, store the coupon row.
    pub async fn issue(&self, merchant: WalletId, terms: CouponTerms) -> Result<Coupon> {
        if !merchant.is_valid() {
            return Err(DealmintError::InvalidWallet(merchant));
        }
        let now = self.ctx.now();
        terms.validate(now)?;
        let coupon = Coupon::issued(merchant, terms, now);

        let proof = self.ctx.ledger.mint_to_escrow(coupon.id).await?;
        self.ctx
            .write_or_defer(OutboxJob::InsertCoupon(coupon.clone()))
            .await;

        tracing::info!(
            coupon = %coupon.id,
            merchant = %coupon.merchant,
            price = coupon.price_or_zero(),
            proof = proof.short(),
            "coupon issued into escrow"
        );
        Ok(coupon)
    }

    /// Release a free coupon to `requester`.
    pub async fn claim(&self, coupon_id: CouponId, requester: &WalletId) -> Result<Acquisition> {
        let coupon = self.releasable(coupon_id, requester).await?;
        if !coupon.is_free() {
            return Err(DealmintError::NotFreeCoupon(coupon_id));
        }
        let escrow = coupon_id.escrow_account();
        self.ensure_in_escrow(coupon_id, &escrow, requester).await?;

        let proof = match self
            .ctx
            .ledger
            .transfer_custody(coupon_id, &escrow, requester)
            .await
        {
            Ok(proof) => proof,
            Err(DealmintError::LedgerRejected { reason }) => {
                return Err(self
                    .explain_rejection(coupon_id, &escrow, requester, reason)
                    .await);
            }
            Err(e) => return Err(e),
        };

        tracing::info!(coupon = %coupon_id, %requester, proof = proof.short(), "coupon claimed");
        let acquisition = Acquisition {
            coupon_id,
            owner: requester.clone(),
            proof: Some(proof),
            price: 0,
            platform_fee: 0,
            issuer_proceeds: 0,
            reconciled: false,
        };
        self.mirror(&acquisition).await;
        Ok(acquisition)
    }

    /// Sell a paid coupon to `requester`: one ledger transaction debits the
    /// price, credits issuer and platform, and moves the token.
    pub async fn purchase(&self, coupon_id: CouponId, requester: &WalletId) -> Result<Acquisition> {
        let coupon = self.releasable(coupon_id, requester).await?;
        if coupon.is_free() {
            return Err(DealmintError::NotPaidCoupon(coupon_id));
        }
        let escrow = coupon_id.escrow_account();
        self.ensure_in_escrow(coupon_id, &escrow, requester).await?;

        let split = FeeSplit::compute(coupon.price_or_zero(), self.ctx.config.platform_fee_bps)?;
        let available = self.ctx.ledger.native_balance(requester).await?;
        if available < split.price {
            return Err(DealmintError::InsufficientFunds {
                needed: split.price,
                available,
            });
        }

        let legs = split.legs(&coupon.merchant, &self.ctx.config.platform_wallet);
        let token_move = TokenMove {
            token: coupon_id,
            from: escrow.clone(),
            to: requester.clone(),
        };
        let proof = match self
            .ctx
            .ledger
            .atomic_pay_split(requester, &legs, Some(&token_move))
            .await
        {
            Ok(proof) => proof,
            Err(DealmintError::LedgerRejected { reason }) => {
                return Err(self
                    .explain_rejection(coupon_id, &escrow, requester, reason)
                    .await);
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            coupon = %coupon_id,
            %requester,
            price = split.price,
            fee = split.fee,
            proof = proof.short(),
            "coupon purchased"
        );
        let acquisition = Acquisition {
            coupon_id,
            owner: requester.clone(),
            proof: Some(proof),
            price: split.price,
            platform_fee: split.fee,
            issuer_proceeds: split.proceeds,
            reconciled: false,
        };
        self.mirror(&acquisition).await;
        Ok(acquisition)
    }

    /// Complete an acquisition whose ledger transfer landed while its
    /// confirmation was lost. Verifies custody before mirroring.
    pub async fn reconcile(&self, coupon_id: CouponId, requester: &WalletId) -> Result<Acquisition> {
        if self.ctx.ledger.account_balance(requester, coupon_id).await? != 1 {
            return Err(DealmintError::NotInEscrow(coupon_id));
        }
        let coupon = self.load(coupon_id).await?;
        let split = FeeSplit::compute(coupon.price_or_zero(), self.ctx.config.platform_fee_bps)?;
        let acquisition = Acquisition {
            coupon_id,
            owner: requester.clone(),
            proof: None,
            price: split.price,
            platform_fee: split.fee,
            issuer_proceeds: split.proceeds,
            reconciled: true,
        };
        tracing::info!(coupon = %coupon_id, %requester, "timed-out acquisition reconciled");
        self.mirror(&acquisition).await;
        Ok(acquisition)
    }

    async fn load(&self, coupon_id: CouponId) -> Result<Coupon> {
        self.ctx
            .store
            .get_coupon(coupon_id)
            .await?
            .ok_or(DealmintError::CouponNotFound(coupon_id))
    }

    async fn releasable(&self, coupon_id: CouponId, requester: &WalletId) -> Result<Coupon> {
        if !requester.is_valid() || requester.is_escrow() {
            return Err(DealmintError::InvalidWallet(requester.clone()));
        }
        let coupon = self.load(coupon_id).await?;
        coupon.ensure_releasable(self.ctx.now())?;
        Ok(coupon)
    }

    async fn ensure_in_escrow(
        &self,
        coupon_id: CouponId,
        escrow: &WalletId,
        requester: &WalletId,
    ) -> Result<()> {
        if self.ctx.ledger.account_balance(escrow, coupon_id).await? == 1 {
            return Ok(());
        }
        Err(self.released_to_whom(coupon_id, requester).await)
    }

    async fn released_to_whom(&self, coupon_id: CouponId, requester: &WalletId) -> DealmintError {
        match self.ctx.ledger.account_balance(requester, coupon_id).await {
            Ok(1) => DealmintError::AlreadyClaimed(coupon_id),
            Ok(_) => DealmintError::NotInEscrow(coupon_id),
            Err(e) => e,
        }
    }

    /// A rejected release may have lost a race for the token. Re-check
    /// custody to report which.
    async fn explain_rejection(
        &self,
        coupon_id: CouponId,
        escrow: &WalletId,
        requester: &WalletId,
        reason: String,
    ) -> DealmintError {
        match self.ctx.ledger.account_balance(escrow, coupon_id).await {
            Ok(0) => self.released_to_whom(coupon_id, requester).await,
            Ok(_) => DealmintError::LedgerRejected { reason },
            Err(e) => e,
        }
    }

    async fn mirror(&self, acquisition: &Acquisition) {
        let coupon_id = acquisition.coupon_id;
        let owner = acquisition.owner.clone();

        self.ctx
            .write_or_defer(OutboxJob::MirrorCoupon {
                coupon_id,
                state: CouponState::Owned,
                owner: Some(owner.clone()),
            })
            .await;

        let event = LedgerEvent::new(
            EventKind::Acquisition,
            coupon_id,
            owner,
            serde_json::json!({
                "proof": acquisition.proof,
                "price": acquisition.price,
                "platform_fee": acquisition.platform_fee,
                "reconciled": acquisition.reconciled,
            }),
            self.ctx.now(),
        );
        self.ctx
            .write_or_defer(OutboxJob::AppendEvent(event))
            .await;
    }
}
