//! Nullable store: thread-safe in-memory governance storage for testing.

use dgov_store::{GovernanceBatch, GovernanceStore, MetaStore, StoreError, StoredEvent, StoredVoteCast};
use dgov_types::{Address, ProposalId, VoteWeight};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Tables {
    delegations: BTreeMap<Address, Vec<u8>>,
    delegatees: BTreeMap<Address, Vec<u8>>,
    proposals: BTreeMap<ProposalId, Vec<u8>>,
    vote_casts: BTreeMap<(Address, ProposalId), VoteWeight>,
    events: BTreeMap<u64, Vec<u8>>,
    meta: BTreeMap<String, Vec<u8>>,
}

/// An in-memory governance store.
///
/// Clones share the same tables, so a test can keep a handle, inject a
/// commit failure, and later reopen a ledger over the same data.
#[derive(Clone, Default)]
pub struct NullGovernanceStore {
    tables: Arc<Mutex<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
}

impl NullGovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next batch commit fail with a backend error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of stored events.
    pub fn event_count(&self) -> usize {
        self.tables().events.len()
    }
}

impl MetaStore for NullGovernanceStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.tables().meta.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tables().meta.get(key).cloned())
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.tables().meta.remove(key);
        Ok(())
    }
}

impl GovernanceStore for NullGovernanceStore {
    type Batch<'a> = NullBatch<'a>;

    fn begin_batch(&self) -> Result<Self::Batch<'_>, StoreError> {
        Ok(NullBatch {
            store: self,
            ops: Vec::new(),
        })
    }

    fn iter_delegations(&self) -> Result<Vec<(Address, Vec<u8>)>, StoreError> {
        Ok(self
            .tables()
            .delegations
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn iter_delegatees(&self) -> Result<Vec<(Address, Vec<u8>)>, StoreError> {
        Ok(self
            .tables()
            .delegatees
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn iter_proposals(&self) -> Result<Vec<(ProposalId, Vec<u8>)>, StoreError> {
        Ok(self
            .tables()
            .proposals
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn get_proposal(&self, id: ProposalId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tables().proposals.get(&id).cloned())
    }

    fn iter_vote_casts(&self) -> Result<Vec<StoredVoteCast>, StoreError> {
        Ok(self
            .tables()
            .vote_casts
            .iter()
            .map(|((voter, proposal), weight)| StoredVoteCast {
                voter: *voter,
                proposal: *proposal,
                weight: *weight,
            })
            .collect())
    }

    fn events_from(&self, from: u64, limit: usize) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(self
            .tables()
            .events
            .range(from..)
            .take(limit)
            .map(|(seq, data)| StoredEvent {
                seq: *seq,
                data: data.clone(),
            })
            .collect())
    }

    fn last_event_seq(&self) -> Result<u64, StoreError> {
        Ok(self
            .tables()
            .events
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }
}

enum Op {
    PutDelegation(Address, Vec<u8>),
    DeleteDelegation(Address),
    PutDelegatee(Address, Vec<u8>),
    DeleteDelegatee(Address),
    PutProposal(ProposalId, Vec<u8>),
    PutVoteCast(StoredVoteCast),
    AppendEvent(StoredEvent),
    PutMeta(String, Vec<u8>),
}

/// Staged writes against a [`NullGovernanceStore`]; nothing is visible until
/// commit.
pub struct NullBatch<'a> {
    store: &'a NullGovernanceStore,
    ops: Vec<Op>,
}

impl GovernanceBatch for NullBatch<'_> {
    fn put_delegation(&mut self, delegator: &Address, data: &[u8]) -> Result<(), StoreError> {
        self.ops.push(Op::PutDelegation(*delegator, data.to_vec()));
        Ok(())
    }

    fn delete_delegation(&mut self, delegator: &Address) -> Result<(), StoreError> {
        self.ops.push(Op::DeleteDelegation(*delegator));
        Ok(())
    }

    fn put_delegatee(&mut self, delegatee: &Address, data: &[u8]) -> Result<(), StoreError> {
        self.ops.push(Op::PutDelegatee(*delegatee, data.to_vec()));
        Ok(())
    }

    fn delete_delegatee(&mut self, delegatee: &Address) -> Result<(), StoreError> {
        self.ops.push(Op::DeleteDelegatee(*delegatee));
        Ok(())
    }

    fn put_proposal(&mut self, id: ProposalId, data: &[u8]) -> Result<(), StoreError> {
        self.ops.push(Op::PutProposal(id, data.to_vec()));
        Ok(())
    }

    fn put_vote_cast(&mut self, cast: &StoredVoteCast) -> Result<(), StoreError> {
        self.ops.push(Op::PutVoteCast(*cast));
        Ok(())
    }

    fn append_event(&mut self, event: &StoredEvent) -> Result<(), StoreError> {
        self.ops.push(Op::AppendEvent(event.clone()));
        Ok(())
    }

    fn put_meta(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.ops.push(Op::PutMeta(key.to_string(), value.to_vec()));
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".into()));
        }

        let mut tables = self.store.tables();
        for op in &self.ops {
            if let Op::AppendEvent(event) = op {
                if tables.events.contains_key(&event.seq) {
                    return Err(StoreError::Duplicate(format!("event {}", event.seq)));
                }
            }
        }
        for op in self.ops {
            match op {
                Op::PutDelegation(k, v) => {
                    tables.delegations.insert(k, v);
                }
                Op::DeleteDelegation(k) => {
                    tables.delegations.remove(&k);
                }
                Op::PutDelegatee(k, v) => {
                    tables.delegatees.insert(k, v);
                }
                Op::DeleteDelegatee(k) => {
                    tables.delegatees.remove(&k);
                }
                Op::PutProposal(id, v) => {
                    tables.proposals.insert(id, v);
                }
                Op::PutVoteCast(cast) => {
                    let key = (cast.voter, cast.proposal);
                    if cast.weight.is_zero() {
                        tables.vote_casts.remove(&key);
                    } else {
                        tables.vote_casts.insert(key, cast.weight);
                    }
                }
                Op::AppendEvent(event) => {
                    tables.events.insert(event.seq, event.data);
                }
                Op::PutMeta(k, v) => {
                    tables.meta.insert(k, v);
                }
            }
        }
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let store = NullGovernanceStore::new();
        let mut batch = store.begin_batch().unwrap();
        batch.put_delegation(&addr(1), b"edge").unwrap();
        assert!(store.iter_delegations().unwrap().is_empty());

        batch.commit().unwrap();
        assert_eq!(store.iter_delegations().unwrap().len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn injected_failure_discards_batch() {
        let store = NullGovernanceStore::new();
        store.fail_next_commit();

        let mut batch = store.begin_batch().unwrap();
        batch.put_proposal(ProposalId::new(1), b"p").unwrap();
        assert!(batch.commit().is_err());
        assert_eq!(store.get_proposal(ProposalId::new(1)).unwrap(), None);

        let mut batch = store.begin_batch().unwrap();
        batch.put_proposal(ProposalId::new(1), b"p").unwrap();
        batch.commit().unwrap();
        assert!(store.get_proposal(ProposalId::new(1)).unwrap().is_some());
    }

    #[test]
    fn clones_share_tables() {
        let store = NullGovernanceStore::new();
        let other = store.clone();
        store.put_meta("k", b"v").unwrap();
        assert_eq!(other.get_meta("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn events_from_and_last_seq() {
        let store = NullGovernanceStore::new();
        let mut batch = store.begin_batch().unwrap();
        for seq in 1..=5 {
            batch
                .append_event(&StoredEvent { seq, data: vec![] })
                .unwrap();
        }
        batch.commit().unwrap();

        assert_eq!(store.last_event_seq().unwrap(), 5);
        let seqs: Vec<u64> = store.events_from(2, 2).unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
    }
}
