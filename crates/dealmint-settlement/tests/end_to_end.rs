//! End-to-end tests through the settlement engine.
//!
//! Every test runs the engine against the in-memory ledger and store on a
//! multi-thread runtime, so the concurrent cases race for real.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dealmint_ledger::{InMemoryLedger, LedgerClient};
use dealmint_settlement::{Clock, ManualClock, SettlementEngine};
use dealmint_store::{
    EventStore, FaultPoint, InMemoryStore, ListingStore, RedemptionStore, RewardStore,
};
use dealmint_types::{
    constants, Category, CouponId, CouponState, CouponTerms, DealmintError, EngineConfig,
    EventKind, ListingId, ListingQuery, PaySplit, RedemptionRecord, RedemptionRequest,
    RetryPolicy, TokenMove, TxProof, WalletId,
};

type Engine = SettlementEngine<InMemoryLedger, InMemoryStore>;

struct Harness {
    engine: Arc<Engine>,
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
}

fn config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::immediate(5),
        ledger_confirm_timeout_ms: 100,
        ..EngineConfig::default()
    }
}

fn harness_with(config: EngineConfig) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new("end-to-end"));
    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = SettlementEngine::new(
        Arc::clone(&ledger),
        Arc::clone(&store),
        config,
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .expect("valid config");
    Harness {
        engine: Arc::new(engine),
        ledger,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(config())
}

fn wallet(name: &str) -> WalletId {
    WalletId::from(name)
}

fn terms(price: Option<u64>, category: Category) -> CouponTerms {
    CouponTerms {
        title: "10% off".into(),
        discount_percent: 10,
        price,
        category,
        expires_at: Utc::now() + chrono::Duration::days(30),
    }
}

impl Harness {
    async fn issue(&self, price: Option<u64>) -> CouponId {
        self.engine
            .issue_coupon(wallet("cafe"), terms(price, Category::FoodBeverage))
            .await
            .expect("issue")
            .id
    }

    async fn claimed_by(&self, owner: &WalletId) -> CouponId {
        let coupon = self.issue(None).await;
        self.engine.claim(coupon, owner).await.expect("claim");
        coupon
    }

    /// Settle a resale on the ledger the way a buyer's wallet would.
    async fn settle_resale(&self, listing: ListingId, buyer: &WalletId) -> TxProof {
        let listing = self
            .store
            .get_listing(listing)
            .await
            .unwrap()
            .expect("listing");
        let fee = listing.ask_price * 250 / 10_000;
        self.ledger.fund(buyer, listing.ask_price).unwrap();
        self.ledger
            .atomic_pay_split(
                buyer,
                &[
                    PaySplit::new(listing.seller.clone(), listing.ask_price - fee),
                    PaySplit::new(self.engine.config().platform_wallet.clone(), fee),
                ],
                Some(&TokenMove {
                    token: listing.coupon_id,
                    from: listing.seller.clone(),
                    to: buyer.clone(),
                }),
            )
            .await
            .expect("buyer settlement")
    }
}

fn redemption(coupon: CouponId, proof: &str, user: &WalletId) -> RedemptionRequest {
    RedemptionRequest {
        coupon_id: coupon,
        tx_proof: TxProof::new(proof),
        user: user.clone(),
        merchant: wallet("cafe"),
        metadata: serde_json::json!({ "till": 1 }),
    }
}

// ---------------------------------------------------------------------------
// Escrow
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claim_then_retry_reports_already_claimed() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.issue(None).await;

    let first = h.engine.claim(coupon, &alice).await.unwrap();
    assert!(!first.reconciled);
    assert!(first.proof.is_some());
    let tx_count = h.ledger.transaction_count().unwrap();

    let err = h.engine.claim(coupon, &alice).await.unwrap_err();
    assert_eq!(err, DealmintError::AlreadyClaimed(coupon));
    assert_eq!(h.ledger.transaction_count().unwrap(), tx_count);

    let err = h.engine.claim(coupon, &wallet("bob")).await.unwrap_err();
    assert_eq!(err, DealmintError::NotInEscrow(coupon));

    let stored = h.engine.coupon(coupon).await.unwrap();
    assert_eq!(stored.state, CouponState::Owned);
    assert_eq!(stored.owner, Some(alice));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_release_once() {
    let h = harness();
    let coupon = h.issue(None).await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let engine = Arc::clone(&h.engine);
        tasks.push(tokio::spawn(async move {
            engine.claim(coupon, &wallet(&format!("user{i}"))).await
        }));
    }
    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(DealmintError::NotInEscrow(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
    h.ledger.verify_supply().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn purchase_splits_price_and_fee() {
    let h = harness();
    let bob = wallet("bob");
    let coupon = h.issue(Some(1_000)).await;
    h.ledger.fund(&bob, 1_500).unwrap();

    let acquisition = h.engine.purchase(coupon, &bob).await.unwrap();
    assert_eq!(acquisition.price, 1_000);
    assert_eq!(acquisition.platform_fee, 25);
    assert_eq!(acquisition.issuer_proceeds, 975);

    assert_eq!(h.ledger.native_balance(&bob).await.unwrap(), 500);
    assert_eq!(h.ledger.native_balance(&wallet("cafe")).await.unwrap(), 975);
    let platform = h.engine.config().platform_wallet.clone();
    assert_eq!(h.ledger.native_balance(&platform).await.unwrap(), 25);
    assert_eq!(h.ledger.account_balance(&bob, coupon).await.unwrap(), 1);
    h.ledger.verify_supply().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn purchase_without_funds_moves_nothing() {
    let h = harness();
    let bob = wallet("bob");
    let coupon = h.issue(Some(1_000)).await;
    h.ledger.fund(&bob, 999).unwrap();

    let err = h.engine.purchase(coupon, &bob).await.unwrap_err();
    assert_eq!(
        err,
        DealmintError::InsufficientFunds {
            needed: 1_000,
            available: 999
        }
    );
    assert_eq!(
        h.ledger
            .account_balance(&coupon.escrow_account(), coupon)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claim_and_purchase_check_price() {
    let h = harness();
    let paid = h.issue(Some(10)).await;
    let free = h.issue(None).await;
    assert_eq!(
        h.engine.claim(paid, &wallet("a")).await.unwrap_err(),
        DealmintError::NotFreeCoupon(paid)
    );
    assert_eq!(
        h.engine.purchase(free, &wallet("a")).await.unwrap_err(),
        DealmintError::NotPaidCoupon(free)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_claim_is_reconciled() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.issue(None).await;
    h.ledger.set_confirmation_delay(Duration::from_millis(300));

    let acquisition = h.engine.claim(coupon, &alice).await.unwrap();
    assert!(acquisition.reconciled);
    assert_eq!(acquisition.proof, None);
    assert_eq!(h.ledger.account_balance(&alice, coupon).await.unwrap(), 1);

    let stored = h.engine.coupon(coupon).await.unwrap();
    assert_eq!(stored.state, CouponState::Owned);
    let events = h.store.events_for(coupon).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Acquisition);
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_mirror_write_lands_through_outbox() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.issue(None).await;
    h.store.fail_next(FaultPoint::CouponWrite, 2);
    h.store.fail_next(FaultPoint::EventAppend, 1);

    h.engine.claim(coupon, &alice).await.unwrap();
    h.engine.outbox().wait_idle().await;

    assert!(h.engine.outbox().dead_letters().is_empty());
    let stored = h.engine.coupon(coupon).await.unwrap();
    assert_eq!(stored.state, CouponState::Owned);
    assert_eq!(h.store.events_for(coupon).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listing_after_deferred_claim_mirror_stays_listed() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.issue(None).await;
    h.store.fail_next(FaultPoint::CouponWrite, 3);

    h.engine.claim(coupon, &alice).await.unwrap();
    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    h.engine.outbox().wait_idle().await;

    assert!(h.engine.outbox().dead_letters().is_empty());
    let stored = h.engine.coupon(coupon).await.unwrap();
    assert_eq!(stored.state, CouponState::Listed);
    assert_eq!(stored.owner, Some(alice));
    assert_eq!(
        h.store.active_listing_for(coupon).await.unwrap().map(|l| l.id),
        Some(listing.id)
    );
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resale_round_trip() {
    let h = harness();
    let alice = wallet("alice");
    let bob = wallet("bob");
    let coupon = h.claimed_by(&alice).await;

    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    assert_eq!(
        h.engine.coupon(coupon).await.unwrap().state,
        CouponState::Listed
    );
    let active = h.engine.active_listings(&ListingQuery::default()).await.unwrap();
    assert_eq!(active.len(), 1);

    let proof = h.settle_resale(listing.id, &bob).await;
    let sale = h
        .engine
        .purchase_listing(listing.id, &bob, &proof)
        .await
        .unwrap();
    assert_eq!(sale.platform_fee, 10);
    assert_eq!(sale.seller_proceeds, 390);

    let stored = h.engine.coupon(coupon).await.unwrap();
    assert_eq!(stored.state, CouponState::Owned);
    assert_eq!(stored.owner, Some(bob.clone()));
    assert_eq!(h.store.get_sale(listing.id).await.unwrap(), Some(sale));
    assert!(h
        .engine
        .active_listings(&ListingQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listing_purchases_have_one_winner() {
    let h = harness();
    let alice = wallet("alice");
    let bob = wallet("bob");
    let coupon = h.claimed_by(&alice).await;
    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    let proof = h.settle_resale(listing.id, &bob).await;

    let a = {
        let (engine, bob, proof) = (Arc::clone(&h.engine), bob.clone(), proof.clone());
        tokio::spawn(async move { engine.purchase_listing(listing.id, &bob, &proof).await })
    };
    let b = {
        let (engine, bob, proof) = (Arc::clone(&h.engine), bob.clone(), proof.clone());
        tokio::spawn(async move { engine.purchase_listing(listing.id, &bob, &proof).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(DealmintError::ListingGone(id)) if *id == listing.id)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn self_trade_always_rejected() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.claimed_by(&alice).await;
    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    let bogus = TxProof::new("00");

    assert_eq!(
        h.engine
            .purchase_listing(listing.id, &alice, &bogus)
            .await
            .unwrap_err(),
        DealmintError::SelfTrade
    );
    h.engine.cancel_listing(listing.id, &alice).await.unwrap();
    assert_eq!(
        h.engine
            .purchase_listing(listing.id, &alice, &bogus)
            .await
            .unwrap_err(),
        DealmintError::SelfTrade
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listing_rules() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.claimed_by(&alice).await;

    assert_eq!(
        h.engine.list_coupon(coupon, &alice, 0).await.unwrap_err(),
        DealmintError::InvalidPrice
    );
    assert_eq!(
        h.engine
            .list_coupon(coupon, &wallet("mallory"), 100)
            .await
            .unwrap_err(),
        DealmintError::NotOwner
    );
    let listing = h.engine.list_coupon(coupon, &alice, 100).await.unwrap();
    assert_eq!(
        h.engine.list_coupon(coupon, &alice, 200).await.unwrap_err(),
        DealmintError::AlreadyListed {
            coupon,
            existing: listing.id
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forged_or_underpaid_proofs_rejected() {
    let h = harness();
    let alice = wallet("alice");
    let bob = wallet("bob");
    let coupon = h.claimed_by(&alice).await;
    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();

    let err = h
        .engine
        .purchase_listing(listing.id, &bob, &TxProof::new("deadbeef"))
        .await
        .unwrap_err();
    assert!(matches!(err, DealmintError::InvalidProof { .. }));

    // Token moved but the seller got nothing.
    h.ledger.fund(&bob, 1).unwrap();
    let cheap = h
        .ledger
        .atomic_pay_split(
            &bob,
            &[PaySplit::new(wallet("elsewhere"), 1)],
            Some(&TokenMove {
                token: coupon,
                from: alice.clone(),
                to: bob.clone(),
            }),
        )
        .await
        .unwrap();
    let err = h
        .engine
        .purchase_listing(listing.id, &bob, &cheap)
        .await
        .unwrap_err();
    assert!(matches!(err, DealmintError::InvalidProof { .. }));
    assert!(h.store.get_listing(listing.id).await.unwrap().unwrap().active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn settled_proof_cannot_buy_a_later_listing() {
    let h = harness();
    let alice = wallet("alice");
    let bob = wallet("bob");
    let coupon = h.claimed_by(&alice).await;

    let first = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    let paid = h.settle_resale(first.id, &bob).await;
    h.engine.purchase_listing(first.id, &bob, &paid).await.unwrap();

    let back = h.engine.list_coupon(coupon, &bob, 400).await.unwrap();
    let returned = h.settle_resale(back.id, &alice).await;
    h.engine
        .purchase_listing(back.id, &alice, &returned)
        .await
        .unwrap();

    let third = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    let bob_funds = h.ledger.native_balance(&bob).await.unwrap();
    let err = h
        .engine
        .purchase_listing(third.id, &bob, &paid)
        .await
        .unwrap_err();
    assert!(matches!(err, DealmintError::InvalidProof { .. }), "{err:?}");

    assert!(h.store.get_listing(third.id).await.unwrap().unwrap().active);
    assert!(h.store.get_sale(third.id).await.unwrap().is_none());
    assert_eq!(h.ledger.native_balance(&bob).await.unwrap(), bob_funds);
    assert_eq!(h.ledger.account_balance(&alice, coupon).await.unwrap(), 1);
    assert_eq!(h.engine.coupon(coupon).await.unwrap().owner, Some(alice));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfer_older_than_listing_is_rejected() {
    let h = harness();
    let alice = wallet("alice");
    let bob = wallet("bob");
    let coupon = h.claimed_by(&alice).await;

    // An off-market sale and return, both before the listing exists.
    h.ledger.fund(&bob, 400).unwrap();
    let earlier = h
        .ledger
        .atomic_pay_split(
            &bob,
            &[
                PaySplit::new(alice.clone(), 390),
                PaySplit::new(h.engine.config().platform_wallet.clone(), 10),
            ],
            Some(&TokenMove {
                token: coupon,
                from: alice.clone(),
                to: bob.clone(),
            }),
        )
        .await
        .unwrap();
    h.ledger.transfer_custody(coupon, &bob, &alice).await.unwrap();

    h.clock.set(Utc::now() + chrono::Duration::minutes(1));
    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();
    let err = h
        .engine
        .purchase_listing(listing.id, &bob, &earlier)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, DealmintError::InvalidProof { reason } if reason.contains("predates")),
        "{err:?}"
    );
    assert!(h.store.get_listing(listing.id).await.unwrap().unwrap().active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redeemed_coupon_listing_cannot_be_bought() {
    let h = harness();
    let alice = wallet("alice");
    let bob = wallet("bob");
    let coupon = h.claimed_by(&alice).await;
    let listing = h.engine.list_coupon(coupon, &alice, 400).await.unwrap();

    // Committed, with the listing-closing side effect still outstanding.
    let record = RedemptionRecord::from_request(redemption(coupon, "pos-9", &alice), Utc::now());
    h.store.insert_redemption(&record).await.unwrap();

    let proof = h.settle_resale(listing.id, &bob).await;
    assert_eq!(
        h.engine
            .purchase_listing(listing.id, &bob, &proof)
            .await
            .unwrap_err(),
        DealmintError::CouponRedeemed(coupon)
    );
    assert!(h.store.get_sale(listing.id).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_redemptions_commit_once() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.claimed_by(&alice).await;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let engine = Arc::clone(&h.engine);
        let request = redemption(coupon, "pos-tx-1", &alice);
        tasks.push(tokio::spawn(async move { engine.redeem(request).await }));
    }

    let mut committed = Vec::new();
    let mut rejected = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok((record, effects)) => {
                effects.settled().await;
                committed.push(record);
            }
            Err(e) => rejected.push(e),
        }
    }

    assert_eq!(committed.len(), 1);
    assert_eq!(rejected.len(), 49);
    let winner = committed[0].id;
    assert!(rejected
        .iter()
        .all(|e| *e == DealmintError::AlreadyRedeemed { existing: winner }));

    let profile = h.store.get_profile(&alice).await.unwrap().unwrap();
    assert_eq!(profile.total_redemptions, 1);
    assert_eq!(
        h.engine.coupon(coupon).await.unwrap().state,
        CouponState::Redeemed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redemption_side_effects() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.claimed_by(&alice).await;
    let listing = h.engine.list_coupon(coupon, &alice, 300).await.unwrap();

    let (record, effects) = h
        .engine
        .redeem(redemption(coupon, "pos-tx-1", &alice))
        .await
        .unwrap();
    effects.settled().await;

    assert_eq!(record.metadata["till"], 1);
    assert!(!h.store.get_listing(listing.id).await.unwrap().unwrap().active);
    assert_eq!(
        h.engine.coupon(coupon).await.unwrap().state,
        CouponState::Redeemed
    );

    let info = h.engine.stake_info(&alice).await.unwrap();
    // Bronze, 10%, Food & Beverage: 10 × 100 × 1.0 × 5%
    assert_eq!(info.lifetime_cashback, 50);
    assert_eq!(info.recent_cashback.len(), 1);

    let standing = h.engine.rewards_profile(&alice).await.unwrap();
    assert_eq!(standing.badges.len(), 1);
    assert_eq!(standing.progress.total_redemptions, 1);

    assert!(matches!(
        h.engine.list_coupon(coupon, &alice, 300).await.unwrap_err(),
        DealmintError::CouponRedeemed(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loyalty_retry_counts_a_redemption_once() {
    let h = harness();
    let alice = wallet("alice");
    let coupon = h.claimed_by(&alice).await;
    h.store.fail_next(FaultPoint::ProfileWrite, 1);

    let (_, effects) = h
        .engine
        .redeem(redemption(coupon, "pos-tx-1", &alice))
        .await
        .unwrap();
    effects.settled().await;

    let profile = h.store.get_profile(&alice).await.unwrap().unwrap();
    assert_eq!(profile.total_redemptions, 1);
    assert_eq!(h.store.badges(&alice).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reused_proof_is_duplicate_submission() {
    let h = harness();
    let alice = wallet("alice");
    let first = h.claimed_by(&alice).await;
    let second = h.claimed_by(&alice).await;

    let (record, effects) = h
        .engine
        .redeem(redemption(first, "pos-tx-9", &alice))
        .await
        .unwrap();
    effects.settled().await;
    let err = h
        .engine
        .redeem(redemption(second, "pos-tx-9", &alice))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DealmintError::DuplicateSubmission {
            existing: record.id
        }
    );
    assert_eq!(err.reference_id(), Some(record.id.to_string()));
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

fn one_year() -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(constants::SECONDS_PER_YEAR).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stake_accrues_and_pays_out() {
    let h = harness();
    let alice = wallet("alice");
    h.engine.stake(&alice, 1_000).await.unwrap();
    h.clock.advance(one_year());

    let info = h.engine.stake_info(&alice).await.unwrap();
    assert_eq!(info.pending, 120);
    assert_eq!(info.total_rewards, 120);

    let claimed = h.engine.claim_rewards(&alice).await.unwrap();
    assert_eq!(claimed.rewards, 120);
    let info = h.engine.stake_info(&alice).await.unwrap();
    assert_eq!((info.principal, info.accrued, info.pending), (1_000, 0, 0));

    h.clock.advance(one_year());
    let out = h.engine.unstake(&alice).await.unwrap();
    assert_eq!((out.principal, out.rewards, out.total), (1_000, 120, 1_120));
    let info = h.engine.stake_info(&alice).await.unwrap();
    assert_eq!((info.principal, info.accrued), (0, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_stakes_never_double_credit() {
    let h = harness_with(EngineConfig {
        retry: RetryPolicy::immediate(1_000),
        ..config()
    });
    let alice = wallet("alice");
    h.engine.stake(&alice, 1_000).await.unwrap();
    h.clock.advance(one_year());

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let engine = Arc::clone(&h.engine);
        let alice = alice.clone();
        tasks.push(tokio::spawn(async move { engine.stake(&alice, 100).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let info = h.engine.stake_info(&alice).await.unwrap();
    assert_eq!(info.principal, 3_000);
    // One year on 1,000 folded exactly once.
    assert_eq!(info.accrued, 120);
    assert_eq!(info.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stake_conflicts_exhaust_into_retries_exhausted() {
    let h = harness_with(EngineConfig {
        retry: RetryPolicy::immediate(3),
        ..config()
    });
    let alice = wallet("alice");
    h.engine.stake(&alice, 1_000).await.unwrap();
    h.store.fail_next(FaultPoint::StakeWrite, 3);

    let err = h.engine.stake(&alice, 1).await.unwrap_err();
    assert!(matches!(
        err,
        DealmintError::RetriesExhausted { attempts: 3, .. }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn activity_counters_and_badges() {
    let h = harness();
    let bob = wallet("bob");
    for _ in 0..20 {
        h.engine
            .record_activity(&bob, dealmint_types::ActivityKind::Reviews)
            .await
            .unwrap();
    }
    let standing = h.engine.rewards_profile(&bob).await.unwrap();
    assert_eq!(standing.profile.total_reviews, 20);
    assert_eq!(
        standing.badges.iter().map(|b| b.kind).collect::<Vec<_>>(),
        vec![dealmint_types::BadgeKind::Critic]
    );
    assert!(matches!(
        h.engine
            .record_activity(&bob, dealmint_types::ActivityKind::Redemptions)
            .await,
        Err(DealmintError::ActivityNotRecordable(_))
    ));
}
