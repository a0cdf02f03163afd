//! Shared dependencies handed to every settlement component.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dealmint_ledger::LedgerClient;
use dealmint_store::RecordStore;
use dealmint_types::EngineConfig;

use crate::clock::Clock;
use crate::outbox::{OutboxHandle, OutboxJob};

pub struct EngineContext<L, S> {
    pub ledger: Arc<L>,
    pub store: Arc<S>,
    pub config: Arc<EngineConfig>,
    pub clock: Arc<dyn Clock>,
    pub outbox: OutboxHandle,
}

impl<L, S> Clone for EngineContext<L, S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
            outbox: self.outbox.clone(),
        }
    }
}

impl<L: LedgerClient, S: RecordStore> EngineContext<L, S> {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Attempt a mirror write once; on failure hand `job` to the outbox.
    ///
    /// A coupon with writes already queued gets this one queued behind them,
    /// so its mirror writes land in the order they were issued.
    pub(crate) async fn write_or_defer(&self, job: OutboxJob) {
        let coupon = job.coupon_id();
        if self.outbox.is_queued(coupon) {
            tracing::debug!(%coupon, job = job.name(), "coupon has queued writes, deferring");
            self.outbox.enqueue(job).await;
            return;
        }
        if let Err(e) = job.apply(self.store.as_ref()).await {
            tracing::warn!(%coupon, job = job.name(), error = %e, "inline store write failed");
            self.outbox.enqueue(job).await;
        }
    }
}
