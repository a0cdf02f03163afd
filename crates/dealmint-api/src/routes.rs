//! Route table and handlers.
//!
//! Handlers are thin: decode, call the engine, wrap the result in the
//! envelope. All rules live in the settlement crate.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use dealmint_ledger::LedgerClient;
use dealmint_settlement::{
    Acquisition, LoyaltyUpdate, RewardsClaimed, RewardsProfile, SettlementEngine, StakeInfo,
    Unstaked,
};
use dealmint_store::RecordStore;
use dealmint_types::{
    constants, ActivityKind, Coupon, CouponId, CouponTerms, ListingId, ListingQuery,
    RedemptionQuery, RedemptionRecord, RedemptionRequest, ResaleListing, ResaleSale, Stake,
    TxProof, WalletId,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiResponse, ApiResult};

type Engine<L, S> = Arc<SettlementEngine<L, S>>;

/// Build the router over a running engine.
pub fn router<L, S>(engine: Engine<L, S>) -> Router
where
    L: LedgerClient + 'static,
    S: RecordStore + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/coupons", post(issue::<L, S>))
        .route("/claim", post(claim::<L, S>))
        .route("/purchase", post(purchase::<L, S>))
        .route("/resale/list", post(list::<L, S>))
        .route("/resale/purchase", post(purchase_listing::<L, S>))
        .route("/resale/cancel", post(cancel_listing::<L, S>))
        .route("/resale/listings", get(listings::<L, S>))
        .route("/redeem", post(redeem::<L, S>).get(redemptions::<L, S>))
        .route("/stake", post(stake::<L, S>))
        .route("/unstake", post(unstake::<L, S>))
        .route("/stake/claim", post(claim_rewards::<L, S>))
        .route("/stake/info", get(stake_info::<L, S>))
        .route("/rewards/profile", get(rewards_profile::<L, S>))
        .route("/rewards/activity", post(record_activity::<L, S>))
        .with_state(engine)
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IssueBody {
    pub merchant: WalletId,
    #[serde(flatten)]
    pub terms: CouponTerms,
}

#[derive(Debug, Deserialize)]
pub struct AcquireBody {
    pub coupon_id: CouponId,
    pub wallet: WalletId,
}

#[derive(Debug, Deserialize)]
pub struct ListBody {
    pub coupon_id: CouponId,
    pub seller: WalletId,
    pub ask_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseListingBody {
    pub listing_id: ListingId,
    pub buyer: WalletId,
    pub tx_proof: TxProof,
}

#[derive(Debug, Deserialize)]
pub struct CancelListingBody {
    pub listing_id: ListingId,
    pub seller: WalletId,
}

#[derive(Debug, Deserialize)]
pub struct StakeBody {
    pub wallet: WalletId,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct WalletBody {
    pub wallet: WalletId,
}

#[derive(Debug, Deserialize)]
pub struct ActivityBody {
    pub wallet: WalletId,
    pub kind: ActivityKind,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub engine: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<ApiResponse<Health>> {
    ApiResponse::ok(Health {
        status: "ok",
        engine: constants::ENGINE_NAME,
        version: constants::VERSION,
    })
}

async fn issue<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<IssueBody>,
) -> ApiResult<Coupon> {
    Ok(ApiResponse::ok(
        engine.issue_coupon(body.merchant, body.terms).await?,
    ))
}

async fn claim<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<AcquireBody>,
) -> ApiResult<Acquisition> {
    Ok(ApiResponse::ok(
        engine.claim(body.coupon_id, &body.wallet).await?,
    ))
}

async fn purchase<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<AcquireBody>,
) -> ApiResult<Acquisition> {
    Ok(ApiResponse::ok(
        engine.purchase(body.coupon_id, &body.wallet).await?,
    ))
}

async fn list<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<ListBody>,
) -> ApiResult<ResaleListing> {
    Ok(ApiResponse::ok(
        engine
            .list_coupon(body.coupon_id, &body.seller, body.ask_price)
            .await?,
    ))
}

async fn purchase_listing<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<PurchaseListingBody>,
) -> ApiResult<ResaleSale> {
    Ok(ApiResponse::ok(
        engine
            .purchase_listing(body.listing_id, &body.buyer, &body.tx_proof)
            .await?,
    ))
}

async fn cancel_listing<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<CancelListingBody>,
) -> ApiResult<ResaleListing> {
    Ok(ApiResponse::ok(
        engine.cancel_listing(body.listing_id, &body.seller).await?,
    ))
}

async fn listings<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Vec<ResaleListing>> {
    Ok(ApiResponse::ok(engine.active_listings(&query).await?))
}

/// Side effects are detached; the response carries only the committed record.
async fn redeem<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(request): Json<RedemptionRequest>,
) -> ApiResult<RedemptionRecord> {
    let (record, _effects) = engine.redeem(request).await?;
    Ok(ApiResponse::ok(record))
}

async fn redemptions<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Query(query): Query<RedemptionQuery>,
) -> ApiResult<Vec<RedemptionRecord>> {
    Ok(ApiResponse::ok(engine.redemptions(&query).await?))
}

async fn stake<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<StakeBody>,
) -> ApiResult<Stake> {
    Ok(ApiResponse::ok(
        engine.stake(&body.wallet, body.amount).await?,
    ))
}

async fn unstake<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<WalletBody>,
) -> ApiResult<Unstaked> {
    Ok(ApiResponse::ok(engine.unstake(&body.wallet).await?))
}

async fn claim_rewards<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<WalletBody>,
) -> ApiResult<RewardsClaimed> {
    Ok(ApiResponse::ok(engine.claim_rewards(&body.wallet).await?))
}

async fn stake_info<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Query(query): Query<WalletBody>,
) -> ApiResult<StakeInfo> {
    Ok(ApiResponse::ok(engine.stake_info(&query.wallet).await?))
}

async fn rewards_profile<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Query(query): Query<WalletBody>,
) -> ApiResult<RewardsProfile> {
    Ok(ApiResponse::ok(engine.rewards_profile(&query.wallet).await?))
}

async fn record_activity<L: LedgerClient + 'static, S: RecordStore + 'static>(
    State(engine): State<Engine<L, S>>,
    Json(body): Json<ActivityBody>,
) -> ApiResult<LoyaltyUpdate> {
    Ok(ApiResponse::ok(
        engine.record_activity(&body.wallet, body.kind).await?,
    ))
}
