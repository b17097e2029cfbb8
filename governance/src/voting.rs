//! Vote casts, voting weight, and live-vote propagation.
//!
//! A cast is the signed weight a voter contributed to one proposal. Besides
//! the casts themselves the book indexes, per voter, the Active proposals it
//! holds a non-zero cast on. Delegation changes only need to revisit that set.

use crate::error::GovernanceError;
use crate::proposal::{Proposal, ProposalStore};
use dgov_types::{Address, ProposalId, TokenAmount, VoteWeight};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    /// The signed cast for `weight` in this direction.
    pub fn cast(&self, weight: TokenAmount) -> Result<VoteWeight, GovernanceError> {
        let w = weight
            .to_weight()
            .ok_or(GovernanceError::ArithmeticOverflow("vote weight"))?;
        Ok(match self {
            VoteDirection::Up => w,
            VoteDirection::Down => -w,
        })
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteDirection::Up => f.write_str("up"),
            VoteDirection::Down => f.write_str("down"),
        }
    }
}

/// Final value of one cast after an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CastUpdate {
    pub voter: Address,
    pub proposal: ProposalId,
    pub weight: VoteWeight,
}

/// Weight a caller votes with: its own spendable balance plus what its
/// delegators handed over. A current delegator has no say.
pub fn voting_weight(
    is_delegator: bool,
    balance: TokenAmount,
    votes_received: TokenAmount,
) -> Result<TokenAmount, GovernanceError> {
    if is_delegator {
        return Ok(TokenAmount::ZERO);
    }
    balance
        .checked_add(votes_received)
        .ok_or(GovernanceError::ArithmeticOverflow("voting weight"))
}

#[derive(Debug, Default)]
pub struct VoteBook {
    casts: HashMap<(Address, ProposalId), VoteWeight>,
    /// voter → Active proposals it holds a non-zero cast on.
    live_by_voter: HashMap<Address, BTreeSet<ProposalId>>,
    /// Active proposal → voters with a non-zero cast, for closing.
    live_by_proposal: HashMap<ProposalId, BTreeSet<Address>>,
}

impl VoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted casts. Only casts on Active proposals enter the
    /// live index.
    pub fn from_casts(
        casts: impl IntoIterator<Item = CastUpdate>,
        proposals: &ProposalStore,
    ) -> Self {
        let mut book = Self::new();
        for cast in casts {
            let live = proposals.get(cast.proposal).is_some_and(Proposal::is_active);
            book.set(cast, live);
        }
        book
    }

    /// The voter's cast on `proposal` (zero if it has not voted).
    pub fn cast(&self, voter: &Address, proposal: ProposalId) -> VoteWeight {
        self.casts
            .get(&(*voter, proposal))
            .copied()
            .unwrap_or_default()
    }

    pub fn has_voted(&self, voter: &Address, proposal: ProposalId) -> bool {
        !self.cast(voter, proposal).is_zero()
    }

    /// Active proposals `voter` currently holds a non-zero cast on.
    pub fn live_votes(&self, voter: &Address) -> impl Iterator<Item = ProposalId> + '_ {
        self.live_by_voter
            .get(voter)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    pub fn live_voter_count(&self, proposal: ProposalId) -> usize {
        self.live_by_proposal.get(&proposal).map_or(0, |v| v.len())
    }

    /// Retroactively move `delegatee`'s casts by its delegator's `amount`.
    ///
    /// For each Active proposal the delegatee holds a cast on, the cast and the
    /// proposal's tally both move by `sign(cast) * amount`, added when
    /// `joining` and subtracted otherwise. Returns the updated casts and the
    /// updated proposal records; nothing is mutated.
    pub fn plan_propagation(
        &self,
        delegatee: &Address,
        amount: TokenAmount,
        joining: bool,
        proposals: &ProposalStore,
    ) -> Result<(Vec<CastUpdate>, Vec<Proposal>), GovernanceError> {
        let mut casts = Vec::new();
        let mut updated = Vec::new();
        for id in self.live_votes(delegatee) {
            let Some(proposal) = proposals.get(id).filter(|p| p.is_active()) else {
                continue;
            };
            let cast = self.cast(delegatee, id);
            let delta = cast
                .directed(amount)
                .ok_or(GovernanceError::ArithmeticOverflow("propagation delta"))?;
            let (new_cast, new_votes) = if joining {
                (cast.checked_add(delta), proposal.votes.checked_add(delta))
            } else {
                (cast.checked_sub(delta), proposal.votes.checked_sub(delta))
            };
            let new_cast = new_cast.ok_or(GovernanceError::ArithmeticOverflow("vote cast"))?;
            let new_votes =
                new_votes.ok_or(GovernanceError::ArithmeticOverflow("proposal votes"))?;

            tracing::trace!(
                %delegatee,
                proposal = %id,
                %delta,
                joining,
                votes = %new_votes,
                "propagating delegation change"
            );

            casts.push(CastUpdate {
                voter: *delegatee,
                proposal: id,
                weight: new_cast,
            });
            updated.push(Proposal {
                votes: new_votes,
                ..proposal.clone()
            });
        }
        Ok((casts, updated))
    }

    /// Store a cast. A zero cast is dropped from the book, which makes the
    /// voter eligible to vote on that proposal again.
    pub(crate) fn set(&mut self, update: CastUpdate, live: bool) {
        let key = (update.voter, update.proposal);
        if update.weight.is_zero() {
            self.casts.remove(&key);
            self.unlink(&update.voter, update.proposal);
            return;
        }
        self.casts.insert(key, update.weight);
        if live {
            self.live_by_voter
                .entry(update.voter)
                .or_default()
                .insert(update.proposal);
            self.live_by_proposal
                .entry(update.proposal)
                .or_default()
                .insert(update.voter);
        }
    }

    /// Drop a proposal that left the Active state from the live index. Casts
    /// stay recorded.
    pub(crate) fn close(&mut self, proposal: ProposalId) {
        let Some(voters) = self.live_by_proposal.remove(&proposal) else {
            return;
        };
        for voter in voters {
            if let Some(ids) = self.live_by_voter.get_mut(&voter) {
                ids.remove(&proposal);
                if ids.is_empty() {
                    self.live_by_voter.remove(&voter);
                }
            }
        }
    }

    fn unlink(&mut self, voter: &Address, proposal: ProposalId) {
        if let Some(ids) = self.live_by_voter.get_mut(voter) {
            ids.remove(&proposal);
            if ids.is_empty() {
                self.live_by_voter.remove(voter);
            }
        }
        if let Some(voters) = self.live_by_proposal.get_mut(&proposal) {
            voters.remove(voter);
            if voters.is_empty() {
                self.live_by_proposal.remove(&proposal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::ProposalStatus;
    use dgov_types::Timestamp;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    fn store_with(votes: &[(u64, i128, ProposalStatus)]) -> ProposalStore {
        ProposalStore::from_records(votes.iter().map(|(id, v, status)| Proposal {
            id: ProposalId::new(*id),
            title: String::new(),
            description: String::new(),
            amount: TokenAmount::new(1),
            recipient: addr(7),
            proposer: addr(1),
            votes: VoteWeight::new(*v),
            status: *status,
            created_at: Timestamp::new(0),
            finalized_at: None,
        }))
    }

    fn cast(voter: u8, id: u64, weight: i128) -> CastUpdate {
        CastUpdate {
            voter: addr(voter),
            proposal: ProposalId::new(id),
            weight: VoteWeight::new(weight),
        }
    }

    #[test]
    fn weight_excludes_delegators() {
        let w = voting_weight(false, TokenAmount::new(5), TokenAmount::new(7)).unwrap();
        assert_eq!(w, TokenAmount::new(12));
        let w = voting_weight(true, TokenAmount::new(5), TokenAmount::ZERO).unwrap();
        assert_eq!(w, TokenAmount::ZERO);
    }

    #[test]
    fn direction_signs_the_cast() {
        let w = TokenAmount::new(300);
        assert_eq!(VoteDirection::Up.cast(w).unwrap(), VoteWeight::new(300));
        assert_eq!(VoteDirection::Down.cast(w).unwrap(), VoteWeight::new(-300));
    }

    #[test]
    fn propagation_follows_cast_sign() {
        let proposals = store_with(&[
            (1, 200, ProposalStatus::Active),
            (2, -50, ProposalStatus::Active),
        ]);
        let mut book = VoteBook::new();
        book.set(cast(9, 1, 200), true);
        book.set(cast(9, 2, -50), true);

        let (casts, updated) = book
            .plan_propagation(&addr(9), TokenAmount::new(100), true, &proposals)
            .unwrap();
        assert_eq!(casts, vec![cast(9, 1, 300), cast(9, 2, -150)]);
        assert_eq!(updated[0].votes, VoteWeight::new(300));
        assert_eq!(updated[1].votes, VoteWeight::new(-150));

        let (casts, _) = book
            .plan_propagation(&addr(9), TokenAmount::new(50), false, &proposals)
            .unwrap();
        assert_eq!(casts, vec![cast(9, 1, 150), cast(9, 2, 0)]);
    }

    #[test]
    fn closed_proposals_are_not_revisited() {
        let proposals = store_with(&[(1, 200, ProposalStatus::Passed)]);
        let mut book = VoteBook::new();
        book.set(cast(9, 1, 200), true);
        book.close(ProposalId::new(1));

        assert_eq!(book.live_votes(&addr(9)).count(), 0);
        assert_eq!(book.cast(&addr(9), ProposalId::new(1)), VoteWeight::new(200));
        let (casts, updated) = book
            .plan_propagation(&addr(9), TokenAmount::new(1), true, &proposals)
            .unwrap();
        assert!(casts.is_empty() && updated.is_empty());
    }

    #[test]
    fn zero_cast_clears_vote() {
        let mut book = VoteBook::new();
        book.set(cast(9, 1, 100), true);
        assert!(book.has_voted(&addr(9), ProposalId::new(1)));
        assert_eq!(book.live_voter_count(ProposalId::new(1)), 1);

        book.set(cast(9, 1, 0), true);
        assert!(!book.has_voted(&addr(9), ProposalId::new(1)));
        assert_eq!(book.live_voter_count(ProposalId::new(1)), 0);
        assert_eq!(book.live_votes(&addr(9)).count(), 0);
    }

    #[test]
    fn from_casts_indexes_only_active() {
        let proposals = store_with(&[
            (1, 10, ProposalStatus::Active),
            (2, 10, ProposalStatus::Failed),
        ]);
        let book = VoteBook::from_casts(vec![cast(9, 1, 10), cast(9, 2, 10)], &proposals);
        let live: Vec<ProposalId> = book.live_votes(&addr(9)).collect();
        assert_eq!(live, vec![ProposalId::new(1)]);
        assert!(book.has_voted(&addr(9), ProposalId::new(2)));
    }
}
