//! Engine configuration: fees, rates and retry policy.
//!
//! Loaded from JSON with camelCase keys. Every key has a default, so an empty
//! object is a valid configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, Category, DealmintError, Result, Tier, WalletId};

/// Backoff policy for retryable operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: constants::DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: constants::DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time,
    /// capped at `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// No backoff, single retry budget. For tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Settlement engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Platform fee on purchases and resales, in basis points.
    pub platform_fee_bps: u32,
    /// Staking APY in basis points.
    pub staking_apy_bps: u32,
    /// Cashback rate percent per tier.
    pub cashback_rate_by_tier: BTreeMap<Tier, u32>,
    /// Deal-value multiplier per category.
    pub category_multiplier: BTreeMap<Category, Decimal>,
    /// Minor units per discount percent when valuing a deal.
    pub cashback_base_unit: u64,
    /// Wallet credited with platform fees.
    pub platform_wallet: WalletId,
    pub ledger_confirm_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cashback_rate_by_tier = BTreeMap::from([
            (Tier::Bronze, 5),
            (Tier::Silver, 8),
            (Tier::Gold, 12),
            (Tier::Platinum, 15),
        ]);
        let category_multiplier = BTreeMap::from([
            (Category::FoodBeverage, Decimal::ONE),
            (Category::Retail, Decimal::new(15, 1)),
            (Category::Services, Decimal::new(12, 1)),
            (Category::Travel, Decimal::TWO),
            (Category::Entertainment, Decimal::new(13, 1)),
            (Category::Other, Decimal::ONE),
        ]);
        Self {
            platform_fee_bps: constants::DEFAULT_PLATFORM_FEE_BPS,
            staking_apy_bps: constants::DEFAULT_STAKING_APY_BPS,
            cashback_rate_by_tier,
            category_multiplier,
            cashback_base_unit: constants::DEFAULT_CASHBACK_BASE_UNIT,
            platform_wallet: WalletId::from(constants::DEFAULT_PLATFORM_WALLET),
            ledger_confirm_timeout_ms: constants::DEFAULT_LEDGER_CONFIRM_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DealmintError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if u64::from(self.platform_fee_bps) > constants::BPS_DENOMINATOR {
            return Err(DealmintError::Configuration(format!(
                "platformFeeBps must be <= {}, got {}",
                constants::BPS_DENOMINATOR,
                self.platform_fee_bps
            )));
        }
        if let Some(missing) = Tier::ALL
            .iter()
            .find(|t| !self.cashback_rate_by_tier.contains_key(t))
        {
            return Err(DealmintError::Configuration(format!(
                "cashbackRateByTier is missing {missing}"
            )));
        }
        if let Some(missing) = Category::ALL
            .iter()
            .find(|c| !self.category_multiplier.contains_key(c))
        {
            return Err(DealmintError::Configuration(format!(
                "categoryMultiplier is missing {missing}"
            )));
        }
        if self.category_multiplier.values().any(Decimal::is_sign_negative) {
            return Err(DealmintError::Configuration(
                "categoryMultiplier values must be non-negative".into(),
            ));
        }
        if !self.platform_wallet.is_valid() {
            return Err(DealmintError::Configuration(
                "platformWallet must be a valid address".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(DealmintError::Configuration(
                "retry.maxAttempts must be positive".into(),
            ));
        }
        if self.ledger_confirm_timeout_ms == 0 {
            return Err(DealmintError::Configuration(
                "ledgerConfirmTimeoutMs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Cashback rate percent for `tier`.
    #[must_use]
    pub fn cashback_rate(&self, tier: Tier) -> u32 {
        self.cashback_rate_by_tier.get(&tier).copied().unwrap_or(0)
    }

    /// Deal-value multiplier for `category`.
    #[must_use]
    pub fn multiplier(&self, category: Category) -> Decimal {
        self.category_multiplier
            .get(&category)
            .copied()
            .unwrap_or(Decimal::ONE)
    }

    #[must_use]
    pub fn ledger_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_confirm_timeout_ms)
    }
}
