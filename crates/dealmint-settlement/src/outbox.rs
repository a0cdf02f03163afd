//! Outbox worker: retries store writes that mirror ledger facts.
//!
//! The ledger is authoritative for custody. When the inline store write that
//! mirrors a landed ledger transaction fails, the write is queued here and
//! retried with backoff so the caller's response never waits on the store.
//! Jobs that exhaust their retries land in an inspectable dead-letter list.
//!
//! Jobs for one coupon run one at a time in arrival order; different coupons
//! run concurrently.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dealmint_store::{RecordStore, StoreError, StoreResult};
use dealmint_types::{
    constants, Coupon, CouponId, CouponState, LedgerEvent, ResaleSale, RetryPolicy, WalletId,
};
use tokio::sync::{mpsc, Notify, Semaphore};

use crate::retry::with_backoff;

/// Concurrent jobs in flight.
const OUTBOX_CONCURRENCY: usize = 8;

/// A deferred store write.
#[derive(Debug, Clone)]
pub enum OutboxJob {
    InsertCoupon(Coupon),
    MirrorCoupon {
        coupon_id: CouponId,
        state: CouponState,
        owner: Option<WalletId>,
    },
    AppendEvent(LedgerEvent),
    RecordSale(ResaleSale),
}

impl OutboxJob {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::InsertCoupon(_) => "insert_coupon",
            Self::MirrorCoupon { .. } => "mirror_coupon",
            Self::AppendEvent(_) => "append_event",
            Self::RecordSale(_) => "record_sale",
        }
    }

    /// The coupon whose lane this job runs in.
    #[must_use]
    pub fn coupon_id(&self) -> CouponId {
        match self {
            Self::InsertCoupon(coupon) => coupon.id,
            Self::MirrorCoupon { coupon_id, .. } => *coupon_id,
            Self::AppendEvent(event) => event.coupon_id,
            Self::RecordSale(sale) => sale.coupon_id,
        }
    }

    pub(crate) async fn apply<S: RecordStore + ?Sized>(&self, store: &S) -> StoreResult<()> {
        match self {
            Self::InsertCoupon(coupon) => store.insert_coupon(coupon).await,
            Self::MirrorCoupon {
                coupon_id,
                state,
                owner,
            } => store
                .transition_coupon(*coupon_id, *state, owner.clone())
                .await
                .map(|_| ()),
            Self::AppendEvent(event) => store.append_event(event).await.map(|_| ()),
            Self::RecordSale(sale) => store.record_sale(sale).await,
        }
    }
}

/// How far along the lifecycle a state sits.
fn depth(state: CouponState) -> u8 {
    match state {
        CouponState::Escrowed => 0,
        CouponState::Owned | CouponState::Listed => 1,
        CouponState::Redeemed | CouponState::Expired => 2,
    }
}

fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A job that failed on every attempt.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: OutboxJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Cloneable handle for enqueueing jobs and inspecting the worker.
#[derive(Clone)]
pub struct OutboxHandle {
    tx: mpsc::Sender<OutboxJob>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
    pending: Arc<AtomicUsize>,
    /// Jobs queued or in flight, per coupon.
    queued: Arc<Mutex<HashMap<CouponId, usize>>>,
    idle: Arc<Notify>,
}

impl OutboxHandle {
    /// Queue a job. Never fails the caller; a closed queue dead-letters it.
    pub async fn enqueue(&self, job: OutboxJob) {
        let coupon = job.coupon_id();
        tracing::info!(%coupon, job = job.name(), "store write deferred to outbox");
        self.pending.fetch_add(1, Ordering::SeqCst);
        *guard(&self.queued).entry(coupon).or_default() += 1;
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job).await {
            tracing::error!(job = job.name(), "outbox closed, dead-lettering job");
            self.dead_letter(job, "outbox closed".into());
            self.finish_one(coupon);
        }
    }

    /// Whether `coupon` has jobs queued or in flight.
    #[must_use]
    pub fn is_queued(&self, coupon: CouponId) -> bool {
        guard(&self.queued).contains_key(&coupon)
    }

    /// Jobs that exhausted their retries.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        guard(&self.dead_letters).clone()
    }

    /// Jobs queued or in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolve once every queued job has landed or been dead-lettered.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn dead_letter(&self, job: OutboxJob, error: String) {
        guard(&self.dead_letters).push(DeadLetter {
            job,
            error,
            failed_at: Utc::now(),
        });
    }

    fn finish_one(&self, coupon: CouponId) {
        {
            let mut queued = guard(&self.queued);
            if let Entry::Occupied(mut slot) = queued.entry(coupon) {
                *slot.get_mut() -= 1;
                if *slot.get() == 0 {
                    slot.remove();
                }
            }
        }
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Spawn the outbox worker on the current tokio runtime.
pub fn spawn_outbox<S>(store: Arc<S>, policy: RetryPolicy) -> OutboxHandle
where
    S: RecordStore + 'static,
{
    let (tx, rx) = mpsc::channel(constants::OUTBOX_QUEUE_CAPACITY);
    let handle = OutboxHandle {
        tx,
        dead_letters: Arc::new(Mutex::new(Vec::new())),
        pending: Arc::new(AtomicUsize::new(0)),
        queued: Arc::new(Mutex::new(HashMap::new())),
        idle: Arc::new(Notify::new()),
    };
    let worker = OutboxWorker {
        store,
        policy,
        handle: handle.clone(),
        semaphore: Arc::new(Semaphore::new(OUTBOX_CONCURRENCY)),
        lanes: Mutex::new(HashMap::new()),
    };
    tokio::spawn(worker.run(rx));
    handle
}

struct OutboxWorker<S> {
    store: Arc<S>,
    policy: RetryPolicy,
    handle: OutboxHandle,
    semaphore: Arc<Semaphore>,
    /// Coupons with a job in flight, and the jobs waiting behind it.
    lanes: Mutex<HashMap<CouponId, VecDeque<OutboxJob>>>,
}

impl<S: RecordStore + 'static> OutboxWorker<S> {
    async fn run(self, mut rx: mpsc::Receiver<OutboxJob>) {
        tracing::info!(concurrency = OUTBOX_CONCURRENCY, "outbox worker started");
        let worker = Arc::new(self);
        while let Some(job) = rx.recv().await {
            let Some(job) = worker.join_lane(job) else {
                continue;
            };
            let Ok(permit) = Arc::clone(&worker.semaphore).acquire_owned().await else {
                break;
            };
            let w = Arc::clone(&worker);
            tokio::spawn(async move {
                w.drain(job).await;
                drop(permit);
            });
        }
        tracing::info!("outbox channel closed, worker shutting down");
    }

    /// Queue `job` behind its coupon's in-flight job, or hand it back when
    /// the lane was idle and the caller should start it.
    fn join_lane(&self, job: OutboxJob) -> Option<OutboxJob> {
        match guard(&self.lanes).entry(job.coupon_id()) {
            Entry::Occupied(mut lane) => {
                lane.get_mut().push_back(job);
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                Some(job)
            }
        }
    }

    /// Next job for `coupon`; closes the lane when none is waiting.
    fn next_in_lane(&self, coupon: CouponId) -> Option<OutboxJob> {
        let mut lanes = guard(&self.lanes);
        let next = lanes.get_mut(&coupon).and_then(VecDeque::pop_front);
        if next.is_none() {
            lanes.remove(&coupon);
        }
        next
    }

    async fn drain(&self, first: OutboxJob) {
        let coupon = first.coupon_id();
        let mut next = Some(first);
        while let Some(job) = next {
            self.process(job).await;
            next = self.next_in_lane(coupon);
        }
    }

    async fn process(&self, job: OutboxJob) {
        let name = job.name();
        let coupon = job.coupon_id();
        let store = self.store.as_ref();
        match with_backoff(&self.policy, name, || job.apply(store)).await {
            Ok(()) => tracing::debug!(job = name, %coupon, "outbox job landed"),
            Err(StoreError::StaleTransition { from, to, .. }) if depth(to) <= depth(from) => {
                // A later transition already landed.
                tracing::warn!(%coupon, %from, %to, "dropping stale coupon mirror");
            }
            Err(e) => {
                tracing::error!(job = name, %coupon, error = %e, "outbox job failed, moving to dead letters");
                self.handle.dead_letter(job, e.to_string());
            }
        }
        self.handle.finish_one(coupon);
    }
}
