//! # dealmint-ledger
//!
//! The engine's view of the authoritative external ledger.
//!
//! - [`LedgerClient`]: async seam for custody transfers, atomic payment
//!   splits, balance queries and signed confirmations
//! - [`InMemoryLedger`]: single-process implementation with ed25519-signed
//!   proofs and fault hooks for tests
//! - [`Confirmed`]: wrapper bounding every call by a confirmation timeout

pub mod client;
pub mod confirmed;
pub mod memory;

pub use client::LedgerClient;
pub use confirmed::Confirmed;
pub use memory::InMemoryLedger;
