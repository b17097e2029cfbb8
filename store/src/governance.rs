//! Governance storage traits.
//!
//! The ledger keeps its whole working set in memory and persists every
//! accepted operation as one [`GovernanceBatch`]. A batch that is dropped
//! without [`GovernanceBatch::commit`] leaves the store untouched.
//!
//! A backend that also keeps the token balances reports its custody account
//! through [`GovernanceStore::escrow_custody`]. The ledger then stages the
//! operation's custody transfer into the same batch, so funds and records
//! move together.

use crate::meta::MetaStore;
use crate::StoreError;
use dgov_token::EscrowTransfer;
use dgov_types::{Address, ProposalId, VoteWeight};

/// A persisted per-(voter, proposal) cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredVoteCast {
    pub voter: Address,
    pub proposal: ProposalId,
    pub weight: VoteWeight,
}

/// A persisted event-log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEvent {
    /// Position in the append-only log, starting at 1.
    pub seq: u64,
    pub data: Vec<u8>,
}

/// Read side of the governance store plus the entry point for atomic writes.
pub trait GovernanceStore: MetaStore {
    type Batch<'a>: GovernanceBatch
    where
        Self: 'a;

    /// Begin a write batch. Only one batch should be open at a time.
    fn begin_batch(&self) -> Result<Self::Batch<'_>, StoreError>;

    /// All delegation records, keyed by delegator.
    fn iter_delegations(&self) -> Result<Vec<(Address, Vec<u8>)>, StoreError>;

    /// All delegatee records, keyed by delegatee.
    fn iter_delegatees(&self) -> Result<Vec<(Address, Vec<u8>)>, StoreError>;

    /// All proposals in ascending id order.
    fn iter_proposals(&self) -> Result<Vec<(ProposalId, Vec<u8>)>, StoreError>;

    /// Get a single proposal.
    fn get_proposal(&self, id: ProposalId) -> Result<Option<Vec<u8>>, StoreError>;

    /// All non-zero vote casts.
    fn iter_vote_casts(&self) -> Result<Vec<StoredVoteCast>, StoreError>;

    /// Up to `limit` events with `seq >= from`, in log order.
    fn events_from(&self, from: u64, limit: usize) -> Result<Vec<StoredEvent>, StoreError>;

    /// Sequence number of the last appended event (0 if the log is empty).
    fn last_event_seq(&self) -> Result<u64, StoreError>;

    /// Custody account whose balances this store keeps, if any. When set,
    /// batches accept [`GovernanceBatch::stage_escrow`].
    fn escrow_custody(&self) -> Option<Address> {
        None
    }
}

/// Staged writes that become visible together on commit.
pub trait GovernanceBatch {
    fn put_delegation(&mut self, delegator: &Address, data: &[u8]) -> Result<(), StoreError>;

    fn delete_delegation(&mut self, delegator: &Address) -> Result<(), StoreError>;

    fn put_delegatee(&mut self, delegatee: &Address, data: &[u8]) -> Result<(), StoreError>;

    fn delete_delegatee(&mut self, delegatee: &Address) -> Result<(), StoreError>;

    fn put_proposal(&mut self, id: ProposalId, data: &[u8]) -> Result<(), StoreError>;

    /// Store a cast; a zero weight deletes the entry.
    fn put_vote_cast(&mut self, cast: &StoredVoteCast) -> Result<(), StoreError>;

    fn append_event(&mut self, event: &StoredEvent) -> Result<(), StoreError>;

    fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Move custody funds as part of this batch.
    fn stage_escrow(&mut self, transfer: &EscrowTransfer) -> Result<(), StoreError> {
        Err(StoreError::Backend(format!(
            "backend keeps no token balances, cannot stage {transfer:?}"
        )))
    }

    /// Make every staged write durable in one step.
    fn commit(self) -> Result<(), StoreError>;
}
