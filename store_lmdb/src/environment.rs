//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use dgov_store::StoreError;
use dgov_types::Address;

use crate::balance_book::{BalanceTables, LmdbBalanceBook};
use crate::governance::{GovernanceTables, LmdbGovernanceStore};
use crate::write_batch::WriteBatch;
use crate::LmdbError;

/// Named databases opened in every environment.
const DATABASE_NAMES: [&str; 8] = [
    "delegations",
    "delegatees",
    "proposals",
    "vote_casts",
    "events",
    "meta",
    "balances",
    "allowances",
];

/// Default map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    pub(crate) delegations_db: Database<Bytes, Bytes>,
    pub(crate) delegatees_db: Database<Bytes, Bytes>,
    pub(crate) proposals_db: Database<Bytes, Bytes>,
    pub(crate) vote_casts_db: Database<Bytes, Bytes>,
    pub(crate) events_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
    pub(crate) balances_db: Database<Bytes, Bytes>,
    pub(crate) allowances_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    ///
    /// `max_dbs` must be at least the number of named databases (8).
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create {}: {e}", path.display())))?;

        // SAFETY: the environment is opened once per process for this path and
        // never concurrently mapped by another `Env` with different options.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs.max(DATABASE_NAMES.len() as u32))
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let mut dbs = Vec::with_capacity(DATABASE_NAMES.len());
        for name in DATABASE_NAMES {
            let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(name))?;
            dbs.push(db);
        }
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env: Arc::new(env),
            delegations_db: dbs[0],
            delegatees_db: dbs[1],
            proposals_db: dbs[2],
            vote_casts_db: dbs[3],
            events_db: dbs[4],
            meta_db: dbs[5],
            balances_db: dbs[6],
            allowances_db: dbs[7],
        })
    }

    /// Underlying heed environment.
    pub fn env(&self) -> &Env {
        &self.env
    }

    pub(crate) fn tables(&self) -> GovernanceTables {
        GovernanceTables {
            delegations: self.delegations_db,
            delegatees: self.delegatees_db,
            proposals: self.proposals_db,
            vote_casts: self.vote_casts_db,
            events: self.events_db,
            meta: self.meta_db,
        }
    }

    fn balance_tables(&self, custody: Address) -> BalanceTables {
        BalanceTables {
            balances: self.balances_db,
            allowances: self.allowances_db,
            custody,
        }
    }

    /// Begin a write batch spanning every governance table.
    pub fn write_batch(&self) -> Result<WriteBatch<'_>, StoreError> {
        WriteBatch::new(&self.env, self.tables(), None)
    }

    /// Begin a write batch that can also move funds of `custody`.
    pub fn escrow_write_batch(&self, custody: Address) -> Result<WriteBatch<'_>, StoreError> {
        WriteBatch::new(&self.env, self.tables(), Some(self.balance_tables(custody)))
    }

    /// Governance store view over this environment. Token balances live
    /// elsewhere; the ledger moves custody funds through its oracle.
    pub fn governance_store(&self) -> LmdbGovernanceStore {
        LmdbGovernanceStore {
            env: Arc::clone(&self.env),
            tables: self.tables(),
            escrow: None,
        }
    }

    /// Governance store whose batches move custody funds in the balance
    /// tables of this environment. Pair it with [`Self::balance_book`] for
    /// the same `custody`: every custody transfer then commits in the same
    /// transaction as the ledger records.
    pub fn custody_store(&self, custody: Address) -> LmdbGovernanceStore {
        LmdbGovernanceStore {
            env: Arc::clone(&self.env),
            tables: self.tables(),
            escrow: Some(self.balance_tables(custody)),
        }
    }

    /// Persisted balance book whose custody account is `custody`.
    pub fn balance_book(&self, custody: Address) -> LmdbBalanceBook {
        LmdbBalanceBook {
            env: Arc::clone(&self.env),
            tables: self.balance_tables(custody),
        }
    }
}
