//! Orchestrator. One entry point per request-surface operation.
//!
//! The engine owns no mutable state of its own: everything lives behind the
//! ledger and store seams, so one instance serves any number of concurrent
//! callers.

use std::future::Future;
use std::sync::Arc;

use dealmint_ledger::{Confirmed, LedgerClient};
use dealmint_store::{CouponStore, RecordStore};
use dealmint_types::{
    ActivityKind, Coupon, CouponId, CouponTerms, DealmintError, EngineConfig, ListingId,
    ListingQuery, RedemptionQuery, RedemptionRecord, RedemptionRequest, Result, ResaleListing,
    ResaleSale, Stake, TxProof, WalletId,
};

use crate::accrual::{RewardsClaimed, StakeInfo, StakingDesk, Unstaked};
use crate::clock::Clock;
use crate::context::EngineContext;
use crate::escrow::{Acquisition, EscrowDesk};
use crate::loyalty::{self, LoyaltyUpdate, RewardsProfile};
use crate::marketplace::Marketplace;
use crate::outbox::{spawn_outbox, OutboxHandle};
use crate::redemption::RedemptionGuard;
use crate::side_effects::{spawn_redemption_effects, SideEffects};

type Ledger<L> = Confirmed<Arc<L>>;

pub struct SettlementEngine<L, S> {
    raw_ledger: Arc<L>,
    ctx: EngineContext<Ledger<L>, S>,
    escrow: EscrowDesk<Ledger<L>, S>,
    market: Marketplace<Ledger<L>, S>,
    guard: RedemptionGuard<S>,
    staking: StakingDesk<S>,
}

impl<L, S> SettlementEngine<L, S>
where
    L: LedgerClient + 'static,
    S: RecordStore + 'static,
{
    /// Validate `config`, wrap the ledger in the confirmation timeout and
    /// start the outbox worker. Must be called inside a tokio runtime.
    pub fn new(
        ledger: Arc<L>,
        store: Arc<S>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let outbox = spawn_outbox(Arc::clone(&store), config.retry.clone());
        let ctx = EngineContext {
            ledger: Arc::new(Confirmed::new(
                Arc::clone(&ledger),
                config.ledger_confirm_timeout(),
            )),
            store: Arc::clone(&store),
            config: Arc::clone(&config),
            clock: Arc::clone(&clock),
            outbox,
        };
        tracing::info!(
            fee_bps = config.platform_fee_bps,
            apy_bps = config.staking_apy_bps,
            confirm_timeout_ms = config.ledger_confirm_timeout_ms,
            "settlement engine started"
        );
        Ok(Self {
            raw_ledger: ledger,
            escrow: EscrowDesk::new(ctx.clone()),
            market: Marketplace::new(ctx.clone()),
            guard: RedemptionGuard::new(Arc::clone(&store), Arc::clone(&clock)),
            staking: StakingDesk::new(store, Arc::clone(&config), clock),
            ctx,
        })
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// The ledger without the confirmation timeout.
    #[must_use]
    pub fn ledger(&self) -> &Arc<L> {
        &self.raw_ledger
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.ctx.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    #[must_use]
    pub fn outbox(&self) -> &OutboxHandle {
        &self.ctx.outbox
    }

    // -----------------------------------------------------------------
    // Escrow
    // -----------------------------------------------------------------

    pub async fn issue_coupon(&self, merchant: WalletId, terms: CouponTerms) -> Result<Coupon> {
        self.escrow.issue(merchant, terms).await
    }

    pub async fn coupon(&self, id: CouponId) -> Result<Coupon> {
        self.ctx
            .store
            .get_coupon(id)
            .await?
            .ok_or(DealmintError::CouponNotFound(id))
    }

    /// Claim a free coupon. A timed-out attempt is retried; if the retry
    /// finds the token already with the requester, the first attempt landed
    /// and the claim completes as reconciled.
    pub async fn claim(&self, coupon_id: CouponId, requester: &WalletId) -> Result<Acquisition> {
        self.acquire("claim", coupon_id, requester, || {
            self.escrow.claim(coupon_id, requester)
        })
        .await
    }

    /// Purchase a paid coupon out of escrow, with the same timeout handling
    /// as [`Self::claim`].
    pub async fn purchase(
        &self,
        coupon_id: CouponId,
        requester: &WalletId,
    ) -> Result<Acquisition> {
        self.acquire("purchase", coupon_id, requester, || {
            self.escrow.purchase(coupon_id, requester)
        })
        .await
    }

    async fn acquire<'a, F, Fut>(
        &'a self,
        op: &str,
        coupon_id: CouponId,
        requester: &'a WalletId,
        attempt: F,
    ) -> Result<Acquisition>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Acquisition>> + 'a,
    {
        let policy = &self.ctx.config.retry;
        let mut timed_out = false;
        let mut n = 1;
        loop {
            match attempt().await {
                Ok(acquisition) => return Ok(acquisition),
                Err(DealmintError::AlreadyClaimed(_)) if timed_out => {
                    return self.escrow.reconcile(coupon_id, requester).await;
                }
                Err(e @ DealmintError::LedgerTimeout { .. }) => {
                    timed_out = true;
                    if n >= policy.max_attempts {
                        tracing::warn!(op, coupon = %coupon_id, attempts = n, "acquisition retries exhausted");
                        return Err(DealmintError::RetriesExhausted {
                            op: op.to_string(),
                            attempts: n,
                            last: e.to_string(),
                        });
                    }
                    let delay = policy.delay_for(n);
                    tracing::info!(op, coupon = %coupon_id, attempt = n, ?delay, "ledger timeout, retrying");
                    tokio::time::sleep(delay).await;
                    n += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -----------------------------------------------------------------
    // Marketplace
    // -----------------------------------------------------------------

    pub async fn list_coupon(
        &self,
        coupon_id: CouponId,
        seller: &WalletId,
        ask_price: u64,
    ) -> Result<ResaleListing> {
        self.market.list(coupon_id, seller, ask_price).await
    }

    pub async fn purchase_listing(
        &self,
        listing_id: ListingId,
        buyer: &WalletId,
        proof: &TxProof,
    ) -> Result<ResaleSale> {
        self.market.purchase(listing_id, buyer, proof).await
    }

    pub async fn cancel_listing(
        &self,
        listing_id: ListingId,
        seller: &WalletId,
    ) -> Result<ResaleListing> {
        self.market.cancel(listing_id, seller).await
    }

    pub async fn active_listings(&self, query: &ListingQuery) -> Result<Vec<ResaleListing>> {
        self.market.active_listings(query).await
    }

    // -----------------------------------------------------------------
    // Redemption
    // -----------------------------------------------------------------

    /// Commit a redemption and start its side effects. The record is final
    /// as soon as this returns; the side effects finish in the background.
    pub async fn redeem(
        &self,
        request: RedemptionRequest,
    ) -> Result<(RedemptionRecord, SideEffects)> {
        let record = self.guard.redeem(request).await?;
        let effects = spawn_redemption_effects(
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.ctx.config),
            &record,
            self.ctx.now(),
        );
        Ok((record, effects))
    }

    pub async fn redemptions(&self, query: &RedemptionQuery) -> Result<Vec<RedemptionRecord>> {
        self.guard.redemptions(query).await
    }

    // -----------------------------------------------------------------
    // Rewards
    // -----------------------------------------------------------------

    pub async fn stake(&self, user: &WalletId, amount: u64) -> Result<Stake> {
        self.staking.stake(user, amount).await
    }

    pub async fn unstake(&self, user: &WalletId) -> Result<Unstaked> {
        self.staking.unstake(user).await
    }

    pub async fn claim_rewards(&self, user: &WalletId) -> Result<RewardsClaimed> {
        self.staking.claim_rewards(user).await
    }

    pub async fn stake_info(&self, user: &WalletId) -> Result<StakeInfo> {
        self.staking.stake_info(user).await
    }

    /// Count a referral, review or upvote. Redemptions are counted only by
    /// [`Self::redeem`].
    pub async fn record_activity(
        &self,
        user: &WalletId,
        kind: ActivityKind,
    ) -> Result<LoyaltyUpdate> {
        if kind == ActivityKind::Redemptions {
            return Err(DealmintError::ActivityNotRecordable(kind));
        }
        if !user.is_valid() {
            return Err(DealmintError::InvalidWallet(user.clone()));
        }
        Ok(loyalty::record(
            self.ctx.store.as_ref(),
            &self.ctx.config.retry,
            user,
            kind,
            self.ctx.now(),
        )
        .await?)
    }

    pub async fn rewards_profile(&self, user: &WalletId) -> Result<RewardsProfile> {
        Ok(loyalty::rewards_profile(self.ctx.store.as_ref(), user).await?)
    }
}
