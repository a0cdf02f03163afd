//! Staking desk: principal, continuous interest, claims.
//!
//! Each mutation reads the user's stake row, folds pending interest at the
//! current checkpoint, applies its change, and writes back with a version
//! compare-and-swap. A lost race surfaces as `StoreConflict` and the whole
//! read-compute-write is repeated, so interest is never folded twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dealmint_store::{RecordStore, RewardStore, StakeStore};
use dealmint_types::{
    constants, CashbackTransaction, DealmintError, EngineConfig, Result, Stake, WalletId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::retry::retrying;

/// Read-only view of a user's stake and cashback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
    pub wallet: WalletId,
    pub principal: u64,
    pub checkpoint: Option<DateTime<Utc>>,
    pub accrued: u64,
    pub pending: u64,
    pub total_rewards: u64,
    pub apy_bps: u32,
    pub apy_percent: Decimal,
    pub lifetime_cashback: u64,
    pub recent_cashback: Vec<CashbackTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unstaked {
    pub wallet: WalletId,
    pub principal: u64,
    pub rewards: u64,
    /// `principal + rewards`.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsClaimed {
    pub wallet: WalletId,
    pub rewards: u64,
    /// Principal left staked.
    pub principal: u64,
}

pub struct StakingDesk<S> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
}

impl<S: RecordStore> StakingDesk<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: Arc<EngineConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    fn rate(&self) -> u32 {
        self.config.staking_apy_bps
    }

    /// Add `amount` to the user's principal, folding interest earned so far.
    pub async fn stake(&self, user: &WalletId, amount: u64) -> Result<Stake> {
        if amount == 0 {
            return Err(DealmintError::InvalidAmount);
        }
        if !user.is_valid() {
            return Err(DealmintError::InvalidWallet(user.clone()));
        }
        let stake = retrying(&self.config.retry, "stake", || async {
            let now = self.clock.now();
            match self.store.get_stake(user).await? {
                None => Ok(self
                    .store
                    .insert_stake(&Stake::new(user.clone(), amount, now))
                    .await?),
                Some(mut stake) => {
                    let expected = stake.version;
                    stake.fold(self.rate(), now);
                    stake.principal = stake
                        .principal
                        .checked_add(amount)
                        .ok_or(DealmintError::ArithmeticOverflow)?;
                    Ok(self.store.compare_and_swap_stake(&stake, expected).await?)
                }
            }
        })
        .await?;

        tracing::info!(%user, amount, principal = stake.principal, accrued = stake.accrued, "staked");
        Ok(stake)
    }

    /// Return principal plus all rewards and zero the row.
    pub async fn unstake(&self, user: &WalletId) -> Result<Unstaked> {
        let out = retrying(&self.config.retry, "unstake", || async {
            let mut stake = self
                .store
                .get_stake(user)
                .await?
                .filter(|s| s.principal > 0)
                .ok_or(DealmintError::NoStake)?;
            let expected = stake.version;
            let now = self.clock.now();
            stake.fold(self.rate(), now);
            let principal = stake.principal;
            let rewards = stake.accrued;
            let total = principal
                .checked_add(rewards)
                .ok_or(DealmintError::ArithmeticOverflow)?;
            stake.principal = 0;
            stake.accrued = 0;
            self.store.compare_and_swap_stake(&stake, expected).await?;
            Ok(Unstaked {
                wallet: user.clone(),
                principal,
                rewards,
                total,
            })
        })
        .await?;

        tracing::info!(%user, principal = out.principal, rewards = out.rewards, "unstaked");
        Ok(out)
    }

    /// Pay out accrued and pending interest, leaving principal staked.
    pub async fn claim_rewards(&self, user: &WalletId) -> Result<RewardsClaimed> {
        let out = retrying(&self.config.retry, "claim_rewards", || async {
            let mut stake = self
                .store
                .get_stake(user)
                .await?
                .ok_or(DealmintError::NoStake)?;
            let now = self.clock.now();
            if stake.total_rewards(self.rate(), now) == 0 {
                return Err(DealmintError::NoRewards);
            }
            let expected = stake.version;
            stake.fold(self.rate(), now);
            let rewards = stake.accrued;
            stake.accrued = 0;
            let stored = self.store.compare_and_swap_stake(&stake, expected).await?;
            Ok(RewardsClaimed {
                wallet: user.clone(),
                rewards,
                principal: stored.principal,
            })
        })
        .await?;

        tracing::info!(%user, rewards = out.rewards, "rewards claimed");
        Ok(out)
    }

    /// Zeroes when the user never staked.
    pub async fn stake_info(&self, user: &WalletId) -> Result<StakeInfo> {
        let now = self.clock.now();
        let rate = self.rate();
        let stake = self.store.get_stake(user).await?;
        let lifetime_cashback = self
            .store
            .get_profile(user)
            .await?
            .map_or(0, |p| p.lifetime_cashback);
        let recent_cashback = self
            .store
            .recent_cashback(user, constants::RECENT_CASHBACK_LIMIT)
            .await?;

        let (principal, checkpoint, accrued, pending) = match &stake {
            Some(s) => (
                s.principal,
                Some(s.checkpoint),
                s.accrued,
                s.pending_interest(rate, now),
            ),
            None => (0, None, 0, 0),
        };
        Ok(StakeInfo {
            wallet: user.clone(),
            principal,
            checkpoint,
            accrued,
            pending,
            total_rewards: accrued.saturating_add(pending),
            apy_bps: rate,
            apy_percent: Decimal::new(i64::from(rate), 2),
            lifetime_cashback,
            recent_cashback,
        })
    }
}
