//! # dealmint-store
//!
//! The local record store: authoritative for redemption state and all reward
//! bookkeeping, and a mirror of ledger custody.
//!
//! - **Seams**: [`CouponStore`], [`ListingStore`], [`RedemptionStore`],
//!   [`StakeStore`], [`RewardStore`], [`EventStore`], unioned as [`RecordStore`]
//! - **Errors**: [`StoreError`], convertible into `DealmintError`
//! - **In-memory backend**: [`InMemoryStore`] with unique indexes,
//!   conditional listing flip, versioned stake CAS and fault injection

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{FaultPoint, InMemoryStore};
pub use traits::*;
