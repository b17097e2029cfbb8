//! Write batching: groups every write of one ledger operation into a single
//! LMDB write transaction, so the operation is durable all at once or not at
//! all.
//!
//! # Usage
//!
//! ```ignore
//! let mut batch = env.write_batch()?;
//! batch.put_delegation(&delegator, &record_bytes)?;
//! batch.put_delegatee(&delegatee, &delegatee_bytes)?;
//! batch.put_meta("totals", &totals_bytes)?;
//! batch.commit()?;
//! ```
//!
//! If the batch is dropped without calling [`WriteBatch::commit`], all
//! operations are rolled back (the underlying LMDB transaction is aborted).
//!
//! A batch opened with balance tables attached also stages custody
//! transfers, so the token move of an operation is rolled back or committed
//! together with its records.

use heed::{Env, RwTxn};

use dgov_store::{GovernanceBatch, StoreError, StoredEvent, StoredVoteCast};
use dgov_token::EscrowTransfer;
use dgov_types::{Address, ProposalId};

use crate::balance_book::BalanceTables;
use crate::governance::{vote_cast_key, GovernanceTables};
use crate::LmdbError;

/// A write batch over the governance tables.
pub struct WriteBatch<'a> {
    txn: RwTxn<'a>,
    tables: GovernanceTables,
    escrow: Option<BalanceTables>,
}

impl<'a> WriteBatch<'a> {
    /// Begin a new write batch.
    pub(crate) fn new(
        env: &'a Env,
        tables: GovernanceTables,
        escrow: Option<BalanceTables>,
    ) -> Result<Self, StoreError> {
        let txn = env.write_txn().map_err(LmdbError::from)?;
        Ok(Self {
            txn,
            tables,
            escrow,
        })
    }
}

impl GovernanceBatch for WriteBatch<'_> {
    // ── Delegation graph ────────────────────────────────────────────────

    fn put_delegation(&mut self, delegator: &Address, data: &[u8]) -> Result<(), StoreError> {
        self.tables
            .delegations
            .put(&mut self.txn, delegator.as_bytes(), data)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete_delegation(&mut self, delegator: &Address) -> Result<(), StoreError> {
        self.tables
            .delegations
            .delete(&mut self.txn, delegator.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_delegatee(&mut self, delegatee: &Address, data: &[u8]) -> Result<(), StoreError> {
        self.tables
            .delegatees
            .put(&mut self.txn, delegatee.as_bytes(), data)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete_delegatee(&mut self, delegatee: &Address) -> Result<(), StoreError> {
        self.tables
            .delegatees
            .delete(&mut self.txn, delegatee.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Proposals and votes ─────────────────────────────────────────────

    fn put_proposal(&mut self, id: ProposalId, data: &[u8]) -> Result<(), StoreError> {
        self.tables
            .proposals
            .put(&mut self.txn, &id.to_key(), data)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_vote_cast(&mut self, cast: &StoredVoteCast) -> Result<(), StoreError> {
        let key = vote_cast_key(&cast.voter, cast.proposal);
        if cast.weight.is_zero() {
            self.tables
                .vote_casts
                .delete(&mut self.txn, &key)
                .map_err(LmdbError::from)?;
        } else {
            self.tables
                .vote_casts
                .put(&mut self.txn, &key, &cast.weight.raw().to_be_bytes())
                .map_err(LmdbError::from)?;
        }
        Ok(())
    }

    // ── Event log and meta ──────────────────────────────────────────────

    fn append_event(&mut self, event: &StoredEvent) -> Result<(), StoreError> {
        let key = event.seq.to_be_bytes();
        if self
            .tables
            .events
            .get(&self.txn, &key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("event {}", event.seq)));
        }
        self.tables
            .events
            .put(&mut self.txn, &key, &event.data)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.tables
            .meta
            .put(&mut self.txn, key.as_bytes(), value)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Custody funds ───────────────────────────────────────────────────

    fn stage_escrow(&mut self, transfer: &EscrowTransfer) -> Result<(), StoreError> {
        let Some(book) = self.escrow else {
            return Err(StoreError::Backend(
                "write batch has no balance tables attached".into(),
            ));
        };
        book.stage(&mut self.txn, transfer)
            .map_err(StoreError::Escrow)?;
        tracing::trace!(?transfer, "escrow staged");
        Ok(())
    }

    // ── Commit / rollback ───────────────────────────────────────────────

    /// Commit all batched operations in a single write transaction.
    ///
    /// This is the only fsync of the whole operation.
    fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
