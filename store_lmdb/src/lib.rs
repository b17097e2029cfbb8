//! LMDB storage backend for the delegated governance ledger.
//!
//! Implements the traits from `dgov-store` using the `heed` LMDB bindings.
//! Each logical table maps to one named LMDB database within a single
//! environment, so one ledger operation is one LMDB write transaction.

pub mod balance_book;
pub mod environment;
pub mod error;
pub mod governance;
pub mod meta;
pub mod migration;
pub mod write_batch;

pub use balance_book::LmdbBalanceBook;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use governance::LmdbGovernanceStore;
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
pub use write_batch::WriteBatch;
