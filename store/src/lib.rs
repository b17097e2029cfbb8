//! Abstract storage traits for the delegated governance ledger.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The governance crate depends only on the traits and hands them
//! pre-serialised records; backends never interpret record bytes.

pub mod error;
pub mod governance;
pub mod meta;

pub use error::StoreError;
pub use governance::{GovernanceBatch, GovernanceStore, StoredEvent, StoredVoteCast};
pub use meta::MetaStore;
