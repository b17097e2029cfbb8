//! Staged effects of one ledger operation.
//!
//! An operation validates everything up front and describes its result as a
//! [`Changeset`]: the final value of every record it touches, the escrow
//! transfer it needs and the events it emits. The ledger then moves the funds,
//! writes the changeset in one store batch and only then applies it in memory.
//! When the store holds the token balances, the transfer is staged into that
//! same batch instead.

use crate::delegation::{DelegationPlan, EdgeChange};
use crate::error::GovernanceError;
use crate::event::{GovernanceEvent, RecordedEvent};
use crate::proposal::Proposal;
use crate::voting::CastUpdate;
use dgov_store::{GovernanceBatch, StoredEvent, StoredVoteCast};
pub use dgov_token::EscrowTransfer;
use dgov_types::ProposalId;

/// Meta key holding the total escrowed by active delegations.
pub const TOTAL_DELEGATED_KEY: &str = "total_delegated";

#[derive(Debug, Default)]
pub struct Changeset {
    pub delegation: Option<DelegationPlan>,
    /// Final records of every proposal the operation touched.
    pub proposals: Vec<Proposal>,
    pub casts: Vec<CastUpdate>,
    /// A proposal leaving the Active state.
    pub closed: Option<ProposalId>,
    pub events: Vec<GovernanceEvent>,
    pub escrow: Option<EscrowTransfer>,
}

impl Changeset {
    /// Stage every write into `batch`. Events are numbered from `first_seq`.
    pub fn write<B: GovernanceBatch>(
        &self,
        batch: &mut B,
        first_seq: u64,
    ) -> Result<Vec<RecordedEvent>, GovernanceError> {
        if let Some(plan) = &self.delegation {
            match plan.change {
                EdgeChange::Link => {
                    batch.put_delegation(&plan.delegator, &bincode::serialize(&plan.delegation)?)?
                }
                EdgeChange::Unlink => batch.delete_delegation(&plan.delegator)?,
            }
            let delegatee = plan.delegation.delegatee;
            if plan.delegatee_after.delegator_count == 0 {
                batch.delete_delegatee(&delegatee)?;
            } else {
                batch.put_delegatee(&delegatee, &bincode::serialize(&plan.delegatee_after)?)?;
            }
            batch.put_meta(TOTAL_DELEGATED_KEY, &plan.total_after.raw().to_be_bytes())?;
        }

        for proposal in &self.proposals {
            batch.put_proposal(proposal.id, &bincode::serialize(proposal)?)?;
        }

        for cast in &self.casts {
            batch.put_vote_cast(&StoredVoteCast {
                voter: cast.voter,
                proposal: cast.proposal,
                weight: cast.weight,
            })?;
        }

        let mut recorded = Vec::with_capacity(self.events.len());
        for (offset, event) in self.events.iter().enumerate() {
            let seq = first_seq + offset as u64;
            batch.append_event(&StoredEvent {
                seq,
                data: bincode::serialize(event)?,
            })?;
            recorded.push(RecordedEvent {
                seq,
                event: event.clone(),
            });
        }
        Ok(recorded)
    }
}
