//! Tier recomputation and badge awards.
//!
//! Counters only grow, so tiers only rise and badges are only ever added.
//! The counter increment is the one write that must not repeat. It is
//! retried only while it has not committed; the tier and badge refresh that
//! follows is retried on its own and re-reads the stored profile each time.

use chrono::{DateTime, Utc};
use dealmint_store::{RecordStore, RewardStore, StoreResult};
use dealmint_types::{
    ActivityKind, Badge, BadgeKind, RetryPolicy, Tier, TierProgress, UserProfile, WalletId,
};
use serde::{Deserialize, Serialize};

use crate::retry::with_backoff;

/// Result of bumping one activity counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyUpdate {
    pub profile: UserProfile,
    /// Set when the tier changed.
    pub promoted_from: Option<Tier>,
    pub new_badges: Vec<Badge>,
}

/// A user's reward standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsProfile {
    pub profile: UserProfile,
    pub progress: TierProgress,
    pub badges: Vec<Badge>,
}

/// Load a user's standing. A user with no activity gets a fresh profile.
pub async fn rewards_profile<S: RecordStore + ?Sized>(
    store: &S,
    user: &WalletId,
) -> StoreResult<RewardsProfile> {
    let profile = store
        .get_profile(user)
        .await?
        .unwrap_or_else(|| UserProfile::new(user.clone()));
    let badges = store.badges(user).await?;
    Ok(RewardsProfile {
        progress: TierProgress::for_redemptions(profile.total_redemptions),
        profile,
        badges,
    })
}

/// Count a redemption, then recompute tier and badges.
pub async fn apply_redemption<S: RecordStore + ?Sized>(
    store: &S,
    policy: &RetryPolicy,
    user: &WalletId,
    now: DateTime<Utc>,
) -> StoreResult<LoyaltyUpdate> {
    record(store, policy, user, ActivityKind::Redemptions, now).await
}

/// Count one activity of `kind`, then recompute tier and badges.
pub async fn record<S: RecordStore + ?Sized>(
    store: &S,
    policy: &RetryPolicy,
    user: &WalletId,
    kind: ActivityKind,
    now: DateTime<Utc>,
) -> StoreResult<LoyaltyUpdate> {
    // A failed increment wrote nothing, so repeating it cannot double count.
    let counted = with_backoff(policy, "count_activity", || {
        store.increment_counter(user, kind)
    })
    .await?;
    let previous = counted.tier;
    with_backoff(policy, "refresh_standing", || {
        refresh(store, &counted, previous, now)
    })
    .await
}

/// Bring tier and badges up to date with the stored counters.
async fn refresh<S: RecordStore + ?Sized>(
    store: &S,
    counted: &UserProfile,
    previous: Tier,
    now: DateTime<Utc>,
) -> StoreResult<LoyaltyUpdate> {
    let user = &counted.wallet;
    let mut profile = store
        .get_profile(user)
        .await?
        .unwrap_or_else(|| counted.clone());

    let tier = Tier::for_redemptions(profile.total_redemptions);
    if tier > profile.tier {
        profile = store.set_tier(user, tier).await?;
    }
    let promoted_from = (profile.tier > previous).then_some(previous);
    if promoted_from.is_some() {
        tracing::info!(%user, from = %previous, to = %profile.tier, "tier promoted");
    }

    let new_badges = evaluate_badges(store, &profile, now).await?;
    Ok(LoyaltyUpdate {
        profile,
        promoted_from,
        new_badges,
    })
}

/// Award every badge whose threshold `profile` meets and the user lacks.
pub async fn evaluate_badges<S: RecordStore + ?Sized>(
    store: &S,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> StoreResult<Vec<Badge>> {
    let held: Vec<BadgeKind> = store
        .badges(&profile.wallet)
        .await?
        .into_iter()
        .map(|b| b.kind)
        .collect();

    let mut awarded = Vec::new();
    for kind in BadgeKind::ALL {
        let (counter, threshold) = kind.requirement();
        if held.contains(&kind) || profile.counter(counter) < threshold {
            continue;
        }
        let badge = Badge {
            user: profile.wallet.clone(),
            kind,
            mint_ref: format!("badge:{}", uuid::Uuid::now_v7()),
            earned_at: now,
        };
        // A concurrent evaluation may have won; that one keeps its mint ref.
        if store.award_badge(&badge).await? {
            tracing::info!(user = %profile.wallet, badge = kind.display_name(), "badge earned");
            awarded.push(badge);
        }
    }
    Ok(awarded)
}
