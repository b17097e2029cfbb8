//! Span constructors for the public ledger operations.
//!
//! Every operation runs inside one of these so that accept/reject events
//! carry the caller and target without repeating them.

use crate::voting::VoteDirection;
use dgov_types::{Address, ProposalId};
use tracing::{info_span, Span};

pub fn delegate_span(delegator: &Address, delegatee: &Address) -> Span {
    info_span!("delegate", %delegator, %delegatee)
}

pub fn undelegate_span(delegator: &Address) -> Span {
    info_span!("undelegate", %delegator)
}

pub fn create_proposal_span(proposer: &Address) -> Span {
    info_span!("create_proposal", %proposer)
}

pub fn vote_span(voter: &Address, proposal: ProposalId, direction: VoteDirection) -> Span {
    info_span!("vote", %voter, %proposal, %direction)
}

pub fn finalize_span(caller: &Address, proposal: ProposalId) -> Span {
    info_span!("finalize_proposal", %caller, %proposal)
}
