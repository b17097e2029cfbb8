//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the ledger (clock, token balances, storage)
//! sits behind a trait. This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically, including injected failures
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod oracle;
pub mod store;

pub use clock::NullClock;
pub use oracle::NullBalanceOracle;
pub use store::NullGovernanceStore;
