//! LMDB implementation of GovernanceStore.

use std::ops::Bound;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use dgov_store::{GovernanceStore, StoreError, StoredEvent, StoredVoteCast};
use dgov_types::{Address, ProposalId, VoteWeight};

use crate::balance_book::BalanceTables;
use crate::write_batch::WriteBatch;
use crate::LmdbError;

/// Handles of the governance tables inside one environment.
#[derive(Clone, Copy)]
pub(crate) struct GovernanceTables {
    pub(crate) delegations: Database<Bytes, Bytes>,
    pub(crate) delegatees: Database<Bytes, Bytes>,
    pub(crate) proposals: Database<Bytes, Bytes>,
    pub(crate) vote_casts: Database<Bytes, Bytes>,
    pub(crate) events: Database<Bytes, Bytes>,
    pub(crate) meta: Database<Bytes, Bytes>,
}

pub struct LmdbGovernanceStore {
    pub(crate) env: Arc<Env>,
    pub(crate) tables: GovernanceTables,
    /// Set when batches stage custody transfers themselves.
    pub(crate) escrow: Option<BalanceTables>,
}

/// Composite key: 20-byte voter followed by the big-endian proposal id.
pub(crate) fn vote_cast_key(voter: &Address, id: ProposalId) -> [u8; 28] {
    let mut key = [0u8; 28];
    key[..20].copy_from_slice(voter.as_bytes());
    key[20..].copy_from_slice(&id.to_key());
    key
}

fn address_key(key: &[u8]) -> Result<Address, StoreError> {
    Address::from_slice(key).map_err(|e| StoreError::Corruption(e.to_string()))
}

impl LmdbGovernanceStore {
    fn iter_address_table(
        &self,
        db: Database<Bytes, Bytes>,
    ) -> Result<Vec<(Address, Vec<u8>)>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, val) = entry.map_err(LmdbError::from)?;
            results.push((address_key(key)?, val.to_vec()));
        }
        Ok(results)
    }
}

impl GovernanceStore for LmdbGovernanceStore {
    type Batch<'a> = WriteBatch<'a>;

    fn begin_batch(&self) -> Result<Self::Batch<'_>, StoreError> {
        WriteBatch::new(&self.env, self.tables, self.escrow)
    }

    fn iter_delegations(&self) -> Result<Vec<(Address, Vec<u8>)>, StoreError> {
        self.iter_address_table(self.tables.delegations)
    }

    fn iter_delegatees(&self) -> Result<Vec<(Address, Vec<u8>)>, StoreError> {
        self.iter_address_table(self.tables.delegatees)
    }

    fn iter_proposals(&self) -> Result<Vec<(ProposalId, Vec<u8>)>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in self.tables.proposals.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, val) = entry.map_err(LmdbError::from)?;
            let id = ProposalId::from_key(key)
                .ok_or_else(|| StoreError::Corruption("proposal key length".into()))?;
            results.push((id, val.to_vec()));
        }
        Ok(results)
    }

    fn get_proposal(&self, id: ProposalId) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .tables
            .proposals
            .get(&rtxn, &id.to_key())
            .map_err(LmdbError::from)?;
        Ok(val.map(|v| v.to_vec()))
    }

    fn iter_vote_casts(&self) -> Result<Vec<StoredVoteCast>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut results = Vec::new();
        for entry in self.tables.vote_casts.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, val) = entry.map_err(LmdbError::from)?;
            if key.len() != 28 || val.len() != 16 {
                return Err(StoreError::Corruption("vote cast entry length".into()));
            }
            let voter = address_key(&key[..20])?;
            let proposal = ProposalId::from_key(&key[20..])
                .ok_or_else(|| StoreError::Corruption("vote cast proposal key".into()))?;
            let mut buf = [0u8; 16];
            buf.copy_from_slice(val);
            results.push(StoredVoteCast {
                voter,
                proposal,
                weight: VoteWeight::new(i128::from_be_bytes(buf)),
            });
        }
        Ok(results)
    }

    fn events_from(&self, from: u64, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let start = from.to_be_bytes();
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (Bound::Included(&start[..]), Bound::Unbounded);
        let mut results = Vec::new();
        for entry in self
            .tables
            .events
            .range(&rtxn, &range)
            .map_err(LmdbError::from)?
        {
            if results.len() >= limit {
                break;
            }
            let (key, val) = entry.map_err(LmdbError::from)?;
            let seq: [u8; 8] = key
                .try_into()
                .map_err(|_| StoreError::Corruption("event key length".into()))?;
            results.push(StoredEvent {
                seq: u64::from_be_bytes(seq),
                data: val.to_vec(),
            });
        }
        Ok(results)
    }

    fn last_event_seq(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.tables.events.last(&rtxn).map_err(LmdbError::from)? {
            Some((key, _)) => {
                let seq: [u8; 8] = key
                    .try_into()
                    .map_err(|_| StoreError::Corruption("event key length".into()))?;
                Ok(u64::from_be_bytes(seq))
            }
            None => Ok(0),
        }
    }

    fn escrow_custody(&self) -> Option<Address> {
        self.escrow.map(|tables| tables.custody)
    }
}
