//! Resale marketplace.
//!
//! The buyer settles payment and token transfer on the ledger directly and
//! submits the resulting proof. The marketplace verifies the proof, then
//! closes the listing with a conditional flip: of any number of concurrent
//! buyers, exactly one observes the flip. A proof closes at most one
//! listing; the store holds it under a unique index.

use dealmint_ledger::LedgerClient;
use dealmint_store::{CouponStore, ListingStore, RecordStore, RedemptionStore};
use dealmint_types::{
    ConfirmedTransfer, CouponId, CouponState, DealmintError, EventKind, LedgerEvent, ListingId,
    ListingQuery, Result, ResaleListing, ResaleSale, TxProof, WalletId,
};

use crate::context::EngineContext;
use crate::fees::FeeSplit;
use crate::outbox::OutboxJob;

pub struct Marketplace<L, S> {
    ctx: EngineContext<L, S>,
}

impl<L: LedgerClient, S: RecordStore> Marketplace<L, S> {
    #[must_use]
    pub fn new(ctx: EngineContext<L, S>) -> Self {
        Self { ctx }
    }

    pub async fn list(
        &self,
        coupon_id: CouponId,
        seller: &WalletId,
        ask_price: u64,
    ) -> Result<ResaleListing> {
        if ask_price == 0 {
            return Err(DealmintError::InvalidPrice);
        }
        let store = &self.ctx.store;
        let coupon = store
            .get_coupon(coupon_id)
            .await?
            .ok_or(DealmintError::CouponNotFound(coupon_id))?;
        if coupon.state == CouponState::Redeemed
            || store.redemption_by_coupon(coupon_id).await?.is_some()
        {
            return Err(DealmintError::CouponRedeemed(coupon_id));
        }
        if self.ctx.ledger.account_balance(seller, coupon_id).await? != 1 {
            return Err(DealmintError::NotOwner);
        }
        if let Some(existing) = store.active_listing_for(coupon_id).await? {
            return Err(DealmintError::AlreadyListed {
                coupon: coupon_id,
                existing: existing.id,
            });
        }

        let listing = ResaleListing::new(coupon_id, seller.clone(), ask_price, self.ctx.now());
        store.insert_listing(&listing).await?;

        self.ctx
            .write_or_defer(OutboxJob::MirrorCoupon {
                coupon_id,
                state: CouponState::Listed,
                owner: Some(seller.clone()),
            })
            .await;

        tracing::info!(listing = %listing.id, coupon = %coupon_id, %seller, ask_price, "coupon listed");
        Ok(listing)
    }

    pub async fn purchase(
        &self,
        listing_id: ListingId,
        buyer: &WalletId,
        proof: &TxProof,
    ) -> Result<ResaleSale> {
        let store = &self.ctx.store;
        let listing = store.get_listing(listing_id).await?;
        if listing.as_ref().is_some_and(|l| &l.seller == buyer) {
            return Err(DealmintError::SelfTrade);
        }
        let listing = match listing {
            Some(l) if l.active => l,
            _ => return Err(DealmintError::ListingGone(listing_id)),
        };
        // The listing may still be active while redemption side effects run.
        if store.redemption_by_coupon(listing.coupon_id).await?.is_some() {
            return Err(DealmintError::CouponRedeemed(listing.coupon_id));
        }

        let split = FeeSplit::compute(listing.ask_price, self.ctx.config.platform_fee_bps)?;
        self.verify_payment(&listing, buyer, proof, &split).await?;

        let now = self.ctx.now();
        if !store.sell_listing(listing_id, buyer, proof, now).await? {
            tracing::debug!(listing = %listing_id, %buyer, "lost listing flip");
            return Err(DealmintError::ListingGone(listing_id));
        }

        let sale = ResaleSale {
            listing_id,
            coupon_id: listing.coupon_id,
            seller: listing.seller.clone(),
            buyer: buyer.clone(),
            price: split.price,
            seller_proceeds: split.proceeds,
            platform_fee: split.fee,
            proof: proof.clone(),
            sold_at: now,
        };
        self.ctx
            .write_or_defer(OutboxJob::RecordSale(sale.clone()))
            .await;
        self.ctx
            .write_or_defer(OutboxJob::MirrorCoupon {
                coupon_id: listing.coupon_id,
                state: CouponState::Owned,
                owner: Some(buyer.clone()),
            })
            .await;
        let event = LedgerEvent::new(
            EventKind::Resale,
            listing.coupon_id,
            buyer.clone(),
            serde_json::json!({
                "listing_id": listing_id,
                "seller": listing.seller,
                "price": split.price,
                "proof": proof,
            }),
            now,
        );
        self.ctx
            .write_or_defer(OutboxJob::AppendEvent(event))
            .await;

        tracing::info!(
            listing = %listing_id,
            coupon = %listing.coupon_id,
            seller = %listing.seller,
            %buyer,
            price = split.price,
            "listing sold"
        );
        Ok(sale)
    }

    pub async fn cancel(&self, listing_id: ListingId, seller: &WalletId) -> Result<ResaleListing> {
        let store = &self.ctx.store;
        let listing = store
            .get_listing(listing_id)
            .await?
            .ok_or(DealmintError::ListingGone(listing_id))?;
        if &listing.seller != seller {
            return Err(DealmintError::NotOwner);
        }
        if !store.deactivate_listing(listing_id).await? {
            return Err(DealmintError::ListingGone(listing_id));
        }
        self.ctx
            .write_or_defer(OutboxJob::MirrorCoupon {
                coupon_id: listing.coupon_id,
                state: CouponState::Owned,
                owner: Some(seller.clone()),
            })
            .await;
        tracing::info!(listing = %listing_id, %seller, "listing cancelled");
        Ok(ResaleListing {
            active: false,
            ..listing
        })
    }

    pub async fn active_listings(&self, query: &ListingQuery) -> Result<Vec<ResaleListing>> {
        Ok(self.ctx.store.query_listings(query).await?)
    }

    /// The proof must be a confirmed, authentically signed transaction that
    /// moved this coupon from seller to buyer after the listing went up, was
    /// paid by the buyer, and credited seller and platform at least their
    /// shares.
    async fn verify_payment(
        &self,
        listing: &ResaleListing,
        buyer: &WalletId,
        proof: &TxProof,
        split: &FeeSplit,
    ) -> Result<ConfirmedTransfer> {
        let invalid = |reason: &str| DealmintError::InvalidProof {
            reason: reason.to_string(),
        };
        let tx = self
            .ctx
            .ledger
            .confirmation(proof)
            .await?
            .ok_or_else(|| invalid("unknown transaction"))?;
        if tx.confirmed_at < listing.listed_at {
            return Err(invalid("transaction predates the listing"));
        }
        if !tx.moved(listing.coupon_id, &listing.seller, buyer) {
            return Err(invalid("transaction does not move this coupon from seller to buyer"));
        }
        if tx.payer.as_ref() != Some(buyer) {
            return Err(invalid("transaction was not paid by the buyer"));
        }
        if tx.paid_to(&listing.seller) < split.proceeds {
            return Err(invalid("seller underpaid"));
        }
        if tx.paid_to(&self.ctx.config.platform_wallet) < split.fee {
            return Err(invalid("platform fee underpaid"));
        }
        Ok(tx)
    }
}
