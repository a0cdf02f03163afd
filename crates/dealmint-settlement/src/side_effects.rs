//! Post-commit redemption side effects.
//!
//! Once a redemption record is committed the response goes back at once.
//! Three independent tasks then run on the runtime, each with its own
//! backoff and no ordering among them:
//!
//! - loyalty: redemption counter once, then tier and badges
//! - cashback at the user's current tier
//! - mark the coupon `Redeemed` and close any active listing for it
//!
//! Failures are logged and dropped. The redemption itself never rolls back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dealmint_store::{CouponStore, ListingStore, RecordStore, RewardStore, StoreError};
use dealmint_types::{
    CashbackTransaction, CouponState, EngineConfig, RedemptionRecord, RetryPolicy, Tier,
};
use tokio::task::JoinHandle;

use crate::cashback::{self, AwardError};
use crate::loyalty;
use crate::retry::with_backoff;

/// Handles to a redemption's side-effect tasks.
///
/// Dropping this detaches the tasks; they still run to completion.
#[derive(Debug)]
#[must_use = "drop to detach, or await `settled` to wait for the side effects"]
pub struct SideEffects {
    tasks: Vec<JoinHandle<()>>,
}

impl SideEffects {
    /// Wait for every task to finish.
    pub async fn settled(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "side-effect task panicked");
            }
        }
    }
}

pub(crate) fn spawn_redemption_effects<S: RecordStore + 'static>(
    store: Arc<S>,
    config: Arc<EngineConfig>,
    record: &RedemptionRecord,
    now: DateTime<Utc>,
) -> SideEffects {
    let record = Arc::new(record.clone());
    let tasks = vec![
        tokio::spawn(loyalty_task(
            Arc::clone(&store),
            config.retry.clone(),
            Arc::clone(&record),
            now,
        )),
        tokio::spawn(cashback_task(
            Arc::clone(&store),
            Arc::clone(&config),
            Arc::clone(&record),
            now,
        )),
        tokio::spawn(coupon_task(store, config.retry.clone(), record)),
    ];
    SideEffects { tasks }
}

async fn loyalty_task<S: RecordStore>(
    store: Arc<S>,
    policy: RetryPolicy,
    record: Arc<RedemptionRecord>,
    now: DateTime<Utc>,
) {
    let result = loyalty::apply_redemption(store.as_ref(), &policy, &record.user, now).await;
    if let Err(e) = result {
        tracing::warn!(redemption = %record.id, user = %record.user, error = %e, "loyalty update failed");
    }
}

async fn cashback_task<S: RecordStore>(
    store: Arc<S>,
    config: Arc<EngineConfig>,
    record: Arc<RedemptionRecord>,
    now: DateTime<Utc>,
) {
    let result: Result<Option<CashbackTransaction>, AwardError> =
        with_backoff(&config.retry, "cashback", || async {
            let Some(coupon) = store.get_coupon(record.coupon_id).await? else {
                return Ok(None);
            };
            let tier = store
                .get_profile(&record.user)
                .await?
                .map_or(Tier::Bronze, |p| p.tier);
            cashback::award(store.as_ref(), &config, &record.user, &coupon, tier, now)
                .await
                .map(Some)
        })
        .await;

    match result {
        Ok(Some(tx)) => {
            tracing::info!(redemption = %record.id, user = %record.user, amount = tx.amount, tier = %tx.tier, "cashback awarded");
        }
        Ok(None) => {
            tracing::warn!(redemption = %record.id, coupon = %record.coupon_id, "coupon row missing, no cashback");
        }
        Err(e) => {
            tracing::warn!(redemption = %record.id, user = %record.user, error = %e, "cashback award failed");
        }
    }
}

async fn coupon_task<S: RecordStore>(store: Arc<S>, policy: RetryPolicy, record: Arc<RedemptionRecord>) {
    let coupon_id = record.coupon_id;
    let marked = with_backoff(&policy, "mark_redeemed", || {
        store.transition_coupon(coupon_id, CouponState::Redeemed, Some(record.user.clone()))
    })
    .await;
    if let Err(e) = marked {
        tracing::warn!(coupon = %coupon_id, error = %e, "could not mark coupon redeemed");
    }

    let closed = with_backoff(&policy, "close_listing", || async {
        match store.active_listing_for(coupon_id).await? {
            Some(listing) => store.deactivate_listing(listing.id).await,
            None => Ok::<_, StoreError>(false),
        }
    })
    .await;
    match closed {
        Ok(true) => tracing::info!(coupon = %coupon_id, "active listing closed on redemption"),
        Ok(false) => {}
        Err(e) => tracing::warn!(coupon = %coupon_id, error = %e, "could not close listing"),
    }
}
