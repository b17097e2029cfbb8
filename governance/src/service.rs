//! Exclusive-access boundary around a [`GovernanceLedger`].
//!
//! The ledger itself is a plain single-writer state machine. `SharedLedger`
//! puts it behind one mutex so callers on any thread observe operations in a
//! total order, each applied completely or not at all.

use crate::error::GovernanceError;
use crate::ledger::GovernanceLedger;
use crate::proposal::{NewProposal, ProposalStatus};
use dgov_store::GovernanceStore;
use dgov_token::BalanceOracle;
use dgov_types::{Address, Clock, ProposalId, TokenAmount, VoteWeight};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct SharedLedger<S, O, C> {
    inner: Arc<Mutex<GovernanceLedger<S, O, C>>>,
}

impl<S, O, C> Clone for SharedLedger<S, O, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, O, C> SharedLedger<S, O, C>
where
    S: GovernanceStore,
    O: BalanceOracle,
    C: Clock,
{
    pub fn new(ledger: GovernanceLedger<S, O, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, GovernanceLedger<S, O, C>>, GovernanceError> {
        self.inner.lock().map_err(|_| GovernanceError::LedgerPoisoned)
    }

    /// Run `f` with exclusive access to the ledger.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut GovernanceLedger<S, O, C>) -> Result<R, GovernanceError>,
    ) -> Result<R, GovernanceError> {
        let mut ledger = self.lock()?;
        f(&mut ledger)
    }

    /// Run a read-only query.
    pub fn read<R>(
        &self,
        f: impl FnOnce(&GovernanceLedger<S, O, C>) -> R,
    ) -> Result<R, GovernanceError> {
        let ledger = self.lock()?;
        Ok(f(&ledger))
    }

    pub fn delegate(
        &self,
        caller: &Address,
        delegatee: &Address,
    ) -> Result<TokenAmount, GovernanceError> {
        self.with(|l| l.delegate(caller, delegatee))
    }

    pub fn undelegate(&self, caller: &Address) -> Result<TokenAmount, GovernanceError> {
        self.with(|l| l.undelegate(caller))
    }

    pub fn create_proposal(
        &self,
        caller: &Address,
        draft: NewProposal,
    ) -> Result<ProposalId, GovernanceError> {
        self.with(|l| l.create_proposal(caller, draft))
    }

    pub fn up_vote(&self, caller: &Address, id: ProposalId) -> Result<VoteWeight, GovernanceError> {
        self.with(|l| l.up_vote(caller, id))
    }

    pub fn down_vote(
        &self,
        caller: &Address,
        id: ProposalId,
    ) -> Result<VoteWeight, GovernanceError> {
        self.with(|l| l.down_vote(caller, id))
    }

    pub fn finalize_proposal(
        &self,
        caller: &Address,
        id: ProposalId,
    ) -> Result<ProposalStatus, GovernanceError> {
        self.with(|l| l.finalize_proposal(caller, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgov_nullables::{NullBalanceOracle, NullClock, NullGovernanceStore};
    use dgov_types::GovernanceParams;
    use std::thread;

    type TestLedger = SharedLedger<NullGovernanceStore, Arc<NullBalanceOracle>, Arc<NullClock>>;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    fn setup(voters: u8) -> (TestLedger, Arc<NullBalanceOracle>) {
        let oracle = Arc::new(NullBalanceOracle::new(addr(0xCC)));
        oracle.set_balance(&addr(0xCC), TokenAmount::new(1_000_000));
        for v in 1..=voters {
            oracle.set_balance(&addr(v), TokenAmount::new(1_000));
        }
        let ledger = GovernanceLedger::open(
            NullGovernanceStore::new(),
            Arc::clone(&oracle),
            Arc::new(NullClock::new(1_000)),
            GovernanceParams::default(),
        )
        .unwrap();
        (SharedLedger::new(ledger), oracle)
    }

    #[test]
    fn concurrent_votes_are_serialized() {
        let (shared, _oracle) = setup(16);
        let id = shared
            .create_proposal(
                &addr(1),
                NewProposal {
                    title: "Grants".into(),
                    description: String::new(),
                    amount: TokenAmount::new(10),
                    recipient: addr(0xEE),
                },
            )
            .unwrap();

        let handles: Vec<_> = (1..=16u8)
            .map(|v| {
                let shared = shared.clone();
                thread::spawn(move || {
                    if v % 2 == 0 {
                        shared.up_vote(&addr(v), id)
                    } else {
                        shared.down_vote(&addr(v), id)
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        let votes = shared.read(|l| l.proposal(id).map(|p| p.votes)).unwrap();
        assert_eq!(votes, Some(VoteWeight::ZERO));
        assert_eq!(shared.read(|l| l.last_event_seq()).unwrap(), 17);
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let (shared, _oracle) = setup(1);
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the ledger lock");
        })
        .join();

        let err = shared.undelegate(&addr(1)).unwrap_err();
        assert!(matches!(err, GovernanceError::LedgerPoisoned));
    }
}
