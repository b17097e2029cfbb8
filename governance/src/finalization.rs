//! Quorum/deadline decision for closing a proposal.

use crate::error::GovernanceError;
use crate::proposal::{Proposal, ProposalStatus};
use dgov_types::{GovernanceParams, Timestamp};

/// Decide the terminal status of an Active proposal at `now`.
///
/// Inside the voting window (deadline included) a proposal can only be
/// closed early by passing; without quorum the call is refused. After the
/// deadline it fails whatever its tally.
pub fn evaluate(
    proposal: &Proposal,
    params: &GovernanceParams,
    now: Timestamp,
) -> Result<ProposalStatus, GovernanceError> {
    if !proposal.is_active() {
        return Err(GovernanceError::ProposalNotActive {
            id: proposal.id,
            status: proposal.status,
        });
    }
    if !proposal.within_window(now, params.voting_period_secs) {
        return Ok(ProposalStatus::Failed);
    }
    if proposal.votes.meets(params.quorum) {
        Ok(ProposalStatus::Passed)
    } else {
        Err(GovernanceError::QuorumNotMet {
            votes: proposal.votes,
            quorum: params.quorum,
        })
    }
}
