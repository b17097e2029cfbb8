//! Single-hop delegation of voting weight.
//!
//! A delegator escrows its whole balance with the ledger and hands the
//! corresponding weight to exactly one delegatee. A member is either a pure
//! delegator, a pure delegatee, or neither; chains are rejected.
//!
//! Mutations are split in two steps: `plan_*` validates against the current
//! graph and computes the resulting values without touching `self`, and
//! [`DelegationLedger::apply`] performs the O(1) update once the plan has been
//! persisted.

use crate::error::GovernanceError;
use crate::indexed_set::IndexedSet;
use dgov_store::StoreError;
use dgov_types::{Address, Timestamp, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An active delegation edge, keyed by its delegator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegatee: Address,
    /// Balance escrowed when the delegation was made.
    pub balance: TokenAmount,
    pub delegated_at: Timestamp,
}

/// Current delegators of one delegatee and the weight they hand over.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DelegateeRecord {
    delegators: IndexedSet<Address>,
    votes_received: TokenAmount,
}

impl DelegateeRecord {
    pub fn delegators(&self) -> &[Address] {
        self.delegators.as_slice()
    }

    pub fn delegator_count(&self) -> usize {
        self.delegators.len()
    }

    pub fn votes_received(&self) -> TokenAmount {
        self.votes_received
    }

    pub fn summary(&self) -> DelegateeSummary {
        DelegateeSummary {
            votes_received: self.votes_received,
            delegator_count: self.delegators.len() as u64,
        }
    }
}

/// Persisted form of a delegatee record. The delegator set is rebuilt from the
/// delegation edges on load and checked against this summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateeSummary {
    pub votes_received: TokenAmount,
    pub delegator_count: u64,
}

/// Read-only view of a delegatee for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegateeStanding {
    pub delegatee: Address,
    pub votes_received: TokenAmount,
    pub delegator_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeChange {
    Link,
    Unlink,
}

/// Validated effect of one delegate or undelegate call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegationPlan {
    pub change: EdgeChange,
    pub delegator: Address,
    /// The edge being created or removed.
    pub delegation: Delegation,
    /// The delegatee's record after the change.
    pub delegatee_after: DelegateeSummary,
    pub total_after: TokenAmount,
}

/// Balances the membership checks of a delegate call are made against.
#[derive(Clone, Copy, Debug)]
pub struct DelegateRequest {
    pub delegator: Address,
    pub delegatee: Address,
    pub delegator_balance: TokenAmount,
    pub delegatee_balance: TokenAmount,
    pub now: Timestamp,
}

/// Delegation graph plus aggregated weights.
#[derive(Debug, Default)]
pub struct DelegationLedger {
    delegations: HashMap<Address, Delegation>,
    delegatees: HashMap<Address, DelegateeRecord>,
    total_delegated: TokenAmount,
}

impl DelegationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted edges and delegatee summaries.
    pub fn from_records(
        edges: impl IntoIterator<Item = (Address, Delegation)>,
        summaries: impl IntoIterator<Item = (Address, DelegateeSummary)>,
    ) -> Result<Self, GovernanceError> {
        let mut ledger = Self::new();
        for (delegator, delegation) in edges {
            let record = ledger.delegatees.entry(delegation.delegatee).or_default();
            record.delegators.insert(delegator);
            record.votes_received = record
                .votes_received
                .checked_add(delegation.balance)
                .ok_or(GovernanceError::ArithmeticOverflow("votes received"))?;
            ledger.total_delegated = ledger
                .total_delegated
                .checked_add(delegation.balance)
                .ok_or(GovernanceError::ArithmeticOverflow("total delegated"))?;
            ledger.delegations.insert(delegator, delegation);
        }

        let summaries: HashMap<Address, DelegateeSummary> = summaries.into_iter().collect();
        if summaries.len() != ledger.delegatees.len() {
            return Err(corrupt(format!(
                "{} delegatee summaries for {} delegatees",
                summaries.len(),
                ledger.delegatees.len()
            )));
        }
        for (delegatee, record) in &ledger.delegatees {
            if summaries.get(delegatee) != Some(&record.summary()) {
                return Err(corrupt(format!("delegatee {delegatee} summary mismatch")));
            }
        }
        ledger.audit().map_err(corrupt)?;
        Ok(ledger)
    }

    pub fn delegation(&self, delegator: &Address) -> Option<&Delegation> {
        self.delegations.get(delegator)
    }

    /// Delegatee of `delegator`, or [`Address::ZERO`] if it has none.
    pub fn delegatee_of(&self, delegator: &Address) -> Address {
        self.delegations
            .get(delegator)
            .map(|d| d.delegatee)
            .unwrap_or(Address::ZERO)
    }

    /// Escrowed balance of `delegator` (zero if not delegating).
    pub fn delegator_balance(&self, delegator: &Address) -> TokenAmount {
        self.delegations
            .get(delegator)
            .map(|d| d.balance)
            .unwrap_or_default()
    }

    pub fn votes_received(&self, delegatee: &Address) -> TokenAmount {
        self.delegatees
            .get(delegatee)
            .map(|r| r.votes_received)
            .unwrap_or_default()
    }

    pub fn delegator_count(&self, delegatee: &Address) -> usize {
        self.delegatees
            .get(delegatee)
            .map(|r| r.delegator_count())
            .unwrap_or(0)
    }

    pub fn delegators(&self, delegatee: &Address) -> &[Address] {
        self.delegatees
            .get(delegatee)
            .map(|r| r.delegators())
            .unwrap_or(&[])
    }

    pub fn is_delegator(&self, address: &Address) -> bool {
        self.delegations.contains_key(address)
    }

    pub fn is_delegatee(&self, address: &Address) -> bool {
        self.delegator_count(address) > 0
    }

    pub fn total_delegated(&self) -> TokenAmount {
        self.total_delegated
    }

    pub fn delegation_count(&self) -> usize {
        self.delegations.len()
    }

    /// Current delegatees, most votes received first.
    pub fn delegatees_by_votes(&self) -> Vec<DelegateeStanding> {
        let mut standings: Vec<DelegateeStanding> = self
            .delegatees
            .iter()
            .map(|(delegatee, record)| DelegateeStanding {
                delegatee: *delegatee,
                votes_received: record.votes_received,
                delegator_count: record.delegator_count(),
            })
            .collect();
        standings.sort_by(|a, b| {
            b.votes_received
                .cmp(&a.votes_received)
                .then_with(|| a.delegatee.cmp(&b.delegatee))
        });
        standings
    }

    /// Validate a delegation of the delegator's whole balance.
    ///
    /// Checks run in a fixed order so a call violating several preconditions
    /// always reports the same one.
    pub fn plan_delegate(&self, req: &DelegateRequest) -> Result<DelegationPlan, GovernanceError> {
        let DelegateRequest {
            delegator,
            delegatee,
            delegator_balance,
            delegatee_balance,
            now,
        } = *req;

        if delegator_balance.is_zero() {
            return Err(GovernanceError::NotAMember(delegator));
        }
        if delegatee == delegator {
            return Err(GovernanceError::SelfDelegation);
        }
        if delegatee.is_zero() {
            return Err(GovernanceError::InvalidDelegatee);
        }
        let received = self.votes_received(&delegatee);
        if delegatee_balance.is_zero() && received.is_zero() {
            return Err(GovernanceError::DelegateeNotAMember(delegatee));
        }
        if self.is_delegator(&delegatee) {
            return Err(GovernanceError::ChainedDelegation(delegatee));
        }
        if self.is_delegatee(&delegator) {
            return Err(GovernanceError::ChainedDelegation(delegator));
        }
        if let Some(existing) = self.delegations.get(&delegator) {
            return Err(GovernanceError::AlreadyDelegated {
                delegator,
                delegatee: existing.delegatee,
            });
        }

        let votes_received = received
            .checked_add(delegator_balance)
            .ok_or(GovernanceError::ArithmeticOverflow("votes received"))?;
        let total_after = self
            .total_delegated
            .checked_add(delegator_balance)
            .ok_or(GovernanceError::ArithmeticOverflow("total delegated"))?;

        Ok(DelegationPlan {
            change: EdgeChange::Link,
            delegator,
            delegation: Delegation {
                delegatee,
                balance: delegator_balance,
                delegated_at: now,
            },
            delegatee_after: DelegateeSummary {
                votes_received,
                delegator_count: self.delegator_count(&delegatee) as u64 + 1,
            },
            total_after,
        })
    }

    /// Validate removal of `delegator`'s edge.
    pub fn plan_undelegate(&self, delegator: &Address) -> Result<DelegationPlan, GovernanceError> {
        let delegation = *self
            .delegations
            .get(delegator)
            .ok_or(GovernanceError::NotDelegated(*delegator))?;

        let votes_received = self
            .votes_received(&delegation.delegatee)
            .checked_sub(delegation.balance)
            .ok_or(GovernanceError::ArithmeticOverflow("votes received"))?;
        let total_after = self
            .total_delegated
            .checked_sub(delegation.balance)
            .ok_or(GovernanceError::ArithmeticOverflow("total delegated"))?;
        let delegator_count = (self.delegator_count(&delegation.delegatee) as u64)
            .checked_sub(1)
            .ok_or(GovernanceError::ArithmeticOverflow("delegator count"))?;

        Ok(DelegationPlan {
            change: EdgeChange::Unlink,
            delegator: *delegator,
            delegation,
            delegatee_after: DelegateeSummary {
                votes_received,
                delegator_count,
            },
            total_after,
        })
    }

    /// Apply a plan produced by this ledger's current state.
    pub(crate) fn apply(&mut self, plan: &DelegationPlan) {
        let delegatee = plan.delegation.delegatee;
        match plan.change {
            EdgeChange::Link => {
                self.delegations.insert(plan.delegator, plan.delegation);
                let record = self.delegatees.entry(delegatee).or_default();
                record.delegators.insert(plan.delegator);
                record.votes_received = plan.delegatee_after.votes_received;
            }
            EdgeChange::Unlink => {
                self.delegations.remove(&plan.delegator);
                if let Some(record) = self.delegatees.get_mut(&delegatee) {
                    record.delegators.remove(&plan.delegator);
                    record.votes_received = plan.delegatee_after.votes_received;
                    if record.delegators.is_empty() {
                        self.delegatees.remove(&delegatee);
                    }
                }
            }
        }
        self.total_delegated = plan.total_after;
    }

    /// Check every structural invariant of the graph.
    pub fn audit(&self) -> Result<(), String> {
        let mut sum_balances = TokenAmount::ZERO;
        for (delegator, delegation) in &self.delegations {
            if delegation.delegatee.is_zero() {
                return Err(format!("{delegator} delegates to the zero address"));
            }
            if self.delegations.contains_key(&delegation.delegatee) {
                return Err(format!("{delegator} delegates to delegator {}", delegation.delegatee));
            }
            if self.is_delegatee(delegator) {
                return Err(format!("{delegator} is both delegator and delegatee"));
            }
            let listed = self
                .delegatees
                .get(&delegation.delegatee)
                .is_some_and(|r| r.delegators.contains(delegator));
            if !listed {
                return Err(format!("{delegator} missing from its delegatee's set"));
            }
            sum_balances = sum_balances
                .checked_add(delegation.balance)
                .ok_or("delegated balances overflow")?;
        }

        let mut sum_received = TokenAmount::ZERO;
        for (delegatee, record) in &self.delegatees {
            let mut expected = TokenAmount::ZERO;
            for delegator in record.delegators() {
                match self.delegations.get(delegator) {
                    Some(d) if d.delegatee == *delegatee => {
                        expected = expected
                            .checked_add(d.balance)
                            .ok_or("votes received overflow")?;
                    }
                    _ => return Err(format!("{delegatee} lists stale delegator {delegator}")),
                }
            }
            if expected != record.votes_received {
                return Err(format!(
                    "{delegatee} votes received {} != delegated {expected}",
                    record.votes_received
                ));
            }
            sum_received = sum_received
                .checked_add(record.votes_received)
                .ok_or("votes received overflow")?;
        }

        if sum_balances != self.total_delegated || sum_received != self.total_delegated {
            return Err(format!(
                "total delegated {} != balances {sum_balances} / received {sum_received}",
                self.total_delegated
            ));
        }
        Ok(())
    }
}

fn corrupt(msg: String) -> GovernanceError {
    GovernanceError::Store(StoreError::Corruption(msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    fn request(delegator: u8, delegatee: u8, balance: u128) -> DelegateRequest {
        DelegateRequest {
            delegator: addr(delegator),
            delegatee: addr(delegatee),
            delegator_balance: TokenAmount::new(balance),
            delegatee_balance: TokenAmount::new(100_000),
            now: Timestamp::new(10),
        }
    }

    fn link(ledger: &mut DelegationLedger, delegator: u8, delegatee: u8, balance: u128) {
        let plan = ledger.plan_delegate(&request(delegator, delegatee, balance)).unwrap();
        ledger.apply(&plan);
    }

    #[test]
    fn delegate_aggregates_weight() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 9, 100_000);
        link(&mut ledger, 2, 9, 50_000);

        assert_eq!(ledger.delegatee_of(&addr(1)), addr(9));
        assert_eq!(ledger.delegator_balance(&addr(2)), TokenAmount::new(50_000));
        assert_eq!(ledger.votes_received(&addr(9)), TokenAmount::new(150_000));
        assert_eq!(ledger.delegator_count(&addr(9)), 2);
        assert_eq!(ledger.total_delegated(), TokenAmount::new(150_000));
        ledger.audit().unwrap();
    }

    #[test]
    fn undelegate_restores_previous_state() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 9, 100_000);
        link(&mut ledger, 2, 9, 50_000);

        let plan = ledger.plan_undelegate(&addr(1)).unwrap();
        assert_eq!(plan.delegation.balance, TokenAmount::new(100_000));
        ledger.apply(&plan);

        assert_eq!(ledger.delegatee_of(&addr(1)), Address::ZERO);
        assert_eq!(ledger.delegator_balance(&addr(1)), TokenAmount::ZERO);
        assert_eq!(ledger.votes_received(&addr(9)), TokenAmount::new(50_000));
        assert_eq!(ledger.delegators(&addr(9)), &[addr(2)]);
        ledger.audit().unwrap();

        ledger.apply(&ledger.plan_undelegate(&addr(2)).unwrap());
        assert!(!ledger.is_delegatee(&addr(9)));
        assert_eq!(ledger.total_delegated(), TokenAmount::ZERO);
        ledger.audit().unwrap();
    }

    #[test]
    fn precondition_errors() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 9, 100);

        let err = ledger.plan_delegate(&request(2, 9, 0)).unwrap_err();
        assert!(matches!(err, GovernanceError::NotAMember(_)));

        let err = ledger.plan_delegate(&request(2, 2, 10)).unwrap_err();
        assert!(matches!(err, GovernanceError::SelfDelegation));

        let mut zero = request(2, 0, 10);
        zero.delegatee = Address::ZERO;
        let err = ledger.plan_delegate(&zero).unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidDelegatee));

        let mut poor = request(2, 3, 10);
        poor.delegatee_balance = TokenAmount::ZERO;
        let err = ledger.plan_delegate(&poor).unwrap_err();
        assert!(matches!(err, GovernanceError::DelegateeNotAMember(a) if a == addr(3)));

        // 1 is a delegator, so nobody may delegate to it.
        let err = ledger.plan_delegate(&request(2, 1, 10)).unwrap_err();
        assert!(matches!(err, GovernanceError::ChainedDelegation(a) if a == addr(1)));

        // 9 is a delegatee, so it may not delegate onwards.
        let err = ledger.plan_delegate(&request(9, 3, 10)).unwrap_err();
        assert!(matches!(err, GovernanceError::ChainedDelegation(a) if a == addr(9)));

        let err = ledger.plan_delegate(&request(1, 3, 10)).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::AlreadyDelegated { delegatee, .. } if delegatee == addr(9)
        ));

        let err = ledger.plan_undelegate(&addr(4)).unwrap_err();
        assert!(matches!(err, GovernanceError::NotDelegated(_)));
    }

    #[test]
    fn delegatee_with_received_votes_but_no_balance_is_a_member() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 9, 100);

        let mut req = request(2, 9, 10);
        req.delegatee_balance = TokenAmount::ZERO;
        assert!(ledger.plan_delegate(&req).is_ok());
    }

    #[test]
    fn planning_does_not_mutate() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 9, 100);
        let _ = ledger.plan_delegate(&request(2, 9, 10)).unwrap();
        let _ = ledger.plan_undelegate(&addr(1)).unwrap();

        assert_eq!(ledger.votes_received(&addr(9)), TokenAmount::new(100));
        assert_eq!(ledger.delegation_count(), 1);
    }

    #[test]
    fn delegatees_ranked_by_votes() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 8, 10);
        link(&mut ledger, 2, 9, 30);
        link(&mut ledger, 3, 8, 5);

        let ranked: Vec<(Address, u128)> = ledger
            .delegatees_by_votes()
            .iter()
            .map(|s| (s.delegatee, s.votes_received.raw()))
            .collect();
        assert_eq!(ranked, vec![(addr(9), 30), (addr(8), 15)]);
    }

    #[test]
    fn from_records_rebuilds_and_checks_summaries() {
        let mut ledger = DelegationLedger::new();
        link(&mut ledger, 1, 9, 100);
        link(&mut ledger, 2, 9, 50);

        let edges: Vec<(Address, Delegation)> = [addr(1), addr(2)]
            .iter()
            .map(|a| (*a, *ledger.delegation(a).unwrap()))
            .collect();
        let summary = DelegateeSummary {
            votes_received: TokenAmount::new(150),
            delegator_count: 2,
        };

        let rebuilt =
            DelegationLedger::from_records(edges.clone(), vec![(addr(9), summary)]).unwrap();
        assert_eq!(rebuilt.votes_received(&addr(9)), TokenAmount::new(150));
        assert_eq!(rebuilt.total_delegated(), TokenAmount::new(150));

        let wrong = DelegateeSummary {
            votes_received: TokenAmount::new(149),
            ..summary
        };
        let err = DelegationLedger::from_records(edges, vec![(addr(9), wrong)]).unwrap_err();
        assert!(matches!(err, GovernanceError::Store(StoreError::Corruption(_))));
    }
}
