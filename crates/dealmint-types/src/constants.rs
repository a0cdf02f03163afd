//! System-wide constants for the DealMint settlement engine.

/// Seconds in a 365-day year. Accrual is linear over this period.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Basis points in one whole.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Default platform fee on purchases and resales (2.5%).
pub const DEFAULT_PLATFORM_FEE_BPS: u32 = 250;

/// Default staking APY (12%).
pub const DEFAULT_STAKING_APY_BPS: u32 = 1_200;

/// Default minor-unit multiplier applied to a discount percent when valuing
/// a deal for cashback.
pub const DEFAULT_CASHBACK_BASE_UNIT: u64 = 100;

/// Default platform fee wallet.
pub const DEFAULT_PLATFORM_WALLET: &str = "platform:treasury";

/// Default bound on waiting for ledger confirmation, in milliseconds.
pub const DEFAULT_LEDGER_CONFIRM_TIMEOUT_MS: u64 = 30_000;

/// Default attempts for a retryable operation, including the first.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Default first backoff delay in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 50;

/// Default backoff ceiling in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

/// Default page size when browsing resale listings.
pub const DEFAULT_LISTING_PAGE_SIZE: usize = 50;

/// Number of recent cashback transactions returned with stake info.
pub const RECENT_CASHBACK_LIMIT: usize = 10;

/// Capacity of the outbox worker queue.
pub const OUTBOX_QUEUE_CAPACITY: usize = 1_024;

/// Default API listen port.
pub const DEFAULT_API_PORT: u16 = 8080;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "DealMint";
