//! Treasury proposals and the proposal table.

use dgov_types::{Address, ProposalId, Timestamp, TokenAmount, VoteWeight};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a proposal. `Passed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    Active,
    Passed,
    Failed,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Active)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Caller-supplied part of a new proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    /// Amount to disburse from the treasury if the proposal passes.
    pub amount: TokenAmount,
    pub recipient: Address,
}

/// A treasury disbursement proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub amount: TokenAmount,
    pub recipient: Address,
    pub proposer: Address,
    /// Net signed, weighted tally. May be negative.
    pub votes: VoteWeight,
    pub status: ProposalStatus,
    pub created_at: Timestamp,
    pub finalized_at: Option<Timestamp>,
}

impl Proposal {
    pub fn is_active(&self) -> bool {
        self.status == ProposalStatus::Active
    }

    /// Last instant at which the proposal can still pass.
    pub fn deadline(&self, voting_period_secs: u64) -> Timestamp {
        self.created_at.saturating_add_secs(voting_period_secs)
    }

    /// Whether `now` is inside the voting window (the deadline itself included).
    pub fn within_window(&self, now: Timestamp, voting_period_secs: u64) -> bool {
        now <= self.deadline(voting_period_secs)
    }
}

/// All proposals by id plus the id sequence.
#[derive(Debug)]
pub struct ProposalStore {
    proposals: BTreeMap<ProposalId, Proposal>,
    next_id: ProposalId,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self {
            proposals: BTreeMap::new(),
            next_id: ProposalId::FIRST,
        }
    }

    /// Rebuild from persisted records. The id sequence resumes after the
    /// highest stored id.
    pub fn from_records(records: impl IntoIterator<Item = Proposal>) -> Self {
        let proposals: BTreeMap<ProposalId, Proposal> =
            records.into_iter().map(|p| (p.id, p)).collect();
        let next_id = proposals
            .keys()
            .next_back()
            .and_then(|id| id.next())
            .unwrap_or(ProposalId::FIRST);
        Self { proposals, next_id }
    }

    pub fn get(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    /// Number of proposals ever created.
    pub fn count(&self) -> u64 {
        self.next_id.raw() - 1
    }

    /// Id the next created proposal will receive.
    pub fn next_id(&self) -> ProposalId {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &Proposal> {
        self.iter().filter(|p| p.is_active())
    }

    pub fn finalized(&self) -> impl Iterator<Item = &Proposal> {
        self.iter().filter(|p| p.status.is_terminal())
    }

    /// Insert or replace a record, advancing the id sequence past it.
    pub(crate) fn put(&mut self, proposal: Proposal) {
        if proposal.id >= self.next_id {
            if let Some(next) = proposal.id.next() {
                self.next_id = next;
            }
        }
        self.proposals.insert(proposal.id, proposal);
    }
}

impl Default for ProposalStore {
    fn default() -> Self {
        Self::new()
    }
}
