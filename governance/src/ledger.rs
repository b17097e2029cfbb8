//! The governance ledger: the operation surface over delegation, proposals,
//! voting and finalization.
//!
//! Every mutating call follows the same path:
//! 1. validate all preconditions against in-memory state and the oracle,
//! 2. build a [`Changeset`],
//! 3. move the escrowed funds, if any,
//! 4. write the changeset in one store batch,
//! 5. apply the changeset in memory and notify subscribers.
//!
//! When the store keeps the token balances itself (see
//! [`GovernanceStore::escrow_custody`]) the transfer is staged into the same
//! batch and both commit together. Otherwise the transfer runs through the
//! oracle first and is compensated if the write fails.
//!
//! A call that fails at any step leaves no trace in the ledger.
//!
//! The custody account is never a member: it cannot vote, propose, finalize,
//! delegate, receive a delegation or be paid by a proposal.

use crate::changeset::{Changeset, EscrowTransfer, TOTAL_DELEGATED_KEY};
use crate::delegation::{
    DelegateRequest, DelegateeStanding, DelegateeSummary, Delegation, DelegationLedger,
};
use crate::error::GovernanceError;
use crate::event::{EventBus, GovernanceEvent, RecordedEvent};
use crate::finalization;
use crate::proposal::{NewProposal, Proposal, ProposalStatus, ProposalStore};
use crate::spans;
use crate::voting::{self, CastUpdate, VoteBook, VoteDirection};
use dgov_store::{GovernanceBatch, GovernanceStore, StoreError};
use dgov_token::BalanceOracle;
use dgov_types::{Address, Clock, GovernanceParams, ProposalId, TokenAmount, VoteWeight};

/// Meta key holding the bincode-encoded [`GovernanceParams`].
pub const PARAMS_KEY: &str = "governance_params";

pub struct GovernanceLedger<S, O, C> {
    store: S,
    oracle: O,
    clock: C,
    params: GovernanceParams,
    delegations: DelegationLedger,
    proposals: ProposalStore,
    votes: VoteBook,
    next_event_seq: u64,
    bus: EventBus,
}

impl<S, O, C> GovernanceLedger<S, O, C>
where
    S: GovernanceStore,
    O: BalanceOracle,
    C: Clock,
{
    /// Open a ledger over `store`, loading every persisted entity.
    ///
    /// `params` is recorded on first open. A store that already carries
    /// parameters keeps them; differing configured values are ignored with a
    /// warning.
    pub fn open(
        store: S,
        oracle: O,
        clock: C,
        params: GovernanceParams,
    ) -> Result<Self, GovernanceError> {
        if let Some(custody) = store.escrow_custody() {
            if custody != oracle.custody() {
                return Err(StoreError::Backend(format!(
                    "store escrows into {custody} but the oracle's custody is {}",
                    oracle.custody()
                ))
                .into());
            }
        }
        let params = load_params(&store, params)?;

        let edges = store
            .iter_delegations()?
            .into_iter()
            .map(|(delegator, bytes)| -> Result<_, GovernanceError> {
                Ok((delegator, bincode::deserialize::<Delegation>(&bytes)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let summaries = store
            .iter_delegatees()?
            .into_iter()
            .map(|(delegatee, bytes)| -> Result<_, GovernanceError> {
                Ok((delegatee, bincode::deserialize::<DelegateeSummary>(&bytes)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delegations = DelegationLedger::from_records(edges, summaries)?;

        if let Some(bytes) = store.get_meta(TOTAL_DELEGATED_KEY)? {
            let raw: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                StoreError::Corruption("total_delegated has unexpected byte length".into())
            })?;
            let stored = TokenAmount::new(u128::from_be_bytes(raw));
            if stored != delegations.total_delegated() {
                return Err(StoreError::Corruption(format!(
                    "total_delegated {stored} != sum of delegations {}",
                    delegations.total_delegated()
                ))
                .into());
            }
        }

        let mut records = Vec::new();
        for (id, bytes) in store.iter_proposals()? {
            let proposal: Proposal = bincode::deserialize(&bytes)?;
            if proposal.id != id {
                return Err(StoreError::Corruption(format!(
                    "proposal stored under {id} has id {}",
                    proposal.id
                ))
                .into());
            }
            records.push(proposal);
        }
        let proposals = ProposalStore::from_records(records);

        let casts = store.iter_vote_casts()?.into_iter().map(|c| CastUpdate {
            voter: c.voter,
            proposal: c.proposal,
            weight: c.weight,
        });
        let votes = VoteBook::from_casts(casts, &proposals);

        let next_event_seq = store.last_event_seq()? + 1;

        tracing::info!(
            quorum = %params.quorum,
            voting_period_secs = params.voting_period_secs,
            delegations = delegations.delegation_count(),
            proposals = proposals.count(),
            events = next_event_seq - 1,
            "governance ledger opened"
        );

        Ok(Self {
            store,
            oracle,
            clock,
            params,
            delegations,
            proposals,
            votes,
            next_event_seq,
            bus: EventBus::new(),
        })
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Delegate the caller's whole balance to `delegatee`. Returns the
    /// escrowed amount.
    pub fn delegate(
        &mut self,
        caller: &Address,
        delegatee: &Address,
    ) -> Result<TokenAmount, GovernanceError> {
        let span = spans::delegate_span(caller, delegatee);
        let _guard = span.enter();
        let result = self.try_delegate(caller, delegatee);
        report(result)
    }

    fn try_delegate(
        &mut self,
        caller: &Address,
        delegatee: &Address,
    ) -> Result<TokenAmount, GovernanceError> {
        let now = self.clock.now();
        let request = DelegateRequest {
            delegator: *caller,
            delegatee: *delegatee,
            delegator_balance: self.member_balance(caller)?,
            delegatee_balance: self.member_balance(delegatee)?,
            now,
        };
        let plan = self.delegations.plan_delegate(&request)?;
        let amount = plan.delegation.balance;
        let (casts, proposals) =
            self.votes
                .plan_propagation(delegatee, amount, true, &self.proposals)?;
        let touched = proposals.len();

        self.commit(Changeset {
            delegation: Some(plan),
            proposals,
            casts,
            events: vec![GovernanceEvent::Delegate {
                delegator: *caller,
                delegatee: *delegatee,
                amount,
                timestamp: now,
            }],
            escrow: Some(EscrowTransfer::Pull {
                from: *caller,
                amount,
            }),
            ..Changeset::default()
        })?;

        tracing::info!(%amount, live_proposals = touched, "delegated");
        Ok(amount)
    }

    /// Withdraw the caller's delegation. Returns the amount released from
    /// escrow.
    pub fn undelegate(&mut self, caller: &Address) -> Result<TokenAmount, GovernanceError> {
        let span = spans::undelegate_span(caller);
        let _guard = span.enter();
        let result = self.try_undelegate(caller);
        report(result)
    }

    fn try_undelegate(&mut self, caller: &Address) -> Result<TokenAmount, GovernanceError> {
        let now = self.clock.now();
        let plan = self.delegations.plan_undelegate(caller)?;
        let delegatee = plan.delegation.delegatee;
        let amount = plan.delegation.balance;
        let (casts, proposals) =
            self.votes
                .plan_propagation(&delegatee, amount, false, &self.proposals)?;
        let touched = proposals.len();

        self.commit(Changeset {
            delegation: Some(plan),
            proposals,
            casts,
            events: vec![GovernanceEvent::Undelegate {
                delegator: *caller,
                delegatee,
                amount,
                timestamp: now,
            }],
            escrow: Some(EscrowTransfer::Push {
                to: *caller,
                amount,
            }),
            ..Changeset::default()
        })?;

        tracing::info!(%delegatee, %amount, live_proposals = touched, "undelegated");
        Ok(amount)
    }

    /// Open a new treasury proposal. Returns its id.
    pub fn create_proposal(
        &mut self,
        caller: &Address,
        draft: NewProposal,
    ) -> Result<ProposalId, GovernanceError> {
        let span = spans::create_proposal_span(caller);
        let _guard = span.enter();
        let result = self.try_create_proposal(caller, draft);
        report(result)
    }

    fn try_create_proposal(
        &mut self,
        caller: &Address,
        draft: NewProposal,
    ) -> Result<ProposalId, GovernanceError> {
        let balance = self.member_balance(caller)?;
        if balance.is_zero() && self.delegations.votes_received(caller).is_zero() {
            return Err(GovernanceError::NotAMember(*caller));
        }
        if draft.recipient.is_zero() || draft.recipient == self.oracle.custody() {
            return Err(GovernanceError::InvalidRecipient);
        }
        let available = self.treasury_balance()?;
        if draft.amount > available {
            return Err(GovernanceError::InsufficientTreasury {
                requested: draft.amount,
                available,
            });
        }

        let id = self.proposals.next_id();
        let proposal = Proposal {
            id,
            title: draft.title,
            description: draft.description,
            amount: draft.amount,
            recipient: draft.recipient,
            proposer: *caller,
            votes: VoteWeight::ZERO,
            status: ProposalStatus::Active,
            created_at: self.clock.now(),
            finalized_at: None,
        };
        let event = GovernanceEvent::Propose {
            id,
            proposer: *caller,
            amount: proposal.amount,
            recipient: proposal.recipient,
        };

        self.commit(Changeset {
            proposals: vec![proposal],
            events: vec![event],
            ..Changeset::default()
        })?;

        tracing::info!(proposal = %id, amount = %draft.amount, "proposal created");
        Ok(id)
    }

    pub fn up_vote(
        &mut self,
        caller: &Address,
        id: ProposalId,
    ) -> Result<VoteWeight, GovernanceError> {
        self.vote(caller, id, VoteDirection::Up)
    }

    pub fn down_vote(
        &mut self,
        caller: &Address,
        id: ProposalId,
    ) -> Result<VoteWeight, GovernanceError> {
        self.vote(caller, id, VoteDirection::Down)
    }

    /// Cast the caller's full weight on `id`. Returns the signed cast.
    pub fn vote(
        &mut self,
        caller: &Address,
        id: ProposalId,
        direction: VoteDirection,
    ) -> Result<VoteWeight, GovernanceError> {
        let span = spans::vote_span(caller, id, direction);
        let _guard = span.enter();
        let result = self.try_vote(caller, id, direction);
        report(result)
    }

    fn try_vote(
        &mut self,
        caller: &Address,
        id: ProposalId,
        direction: VoteDirection,
    ) -> Result<VoteWeight, GovernanceError> {
        let proposal = self.active_proposal(id)?;
        let weight = self.voting_weight(caller)?;
        if weight.is_zero() {
            return Err(GovernanceError::NoVotingPower(*caller));
        }
        if self.votes.has_voted(caller, id) {
            return Err(GovernanceError::AlreadyVoted {
                voter: *caller,
                proposal: id,
            });
        }

        let cast = direction.cast(weight)?;
        let votes = proposal
            .votes
            .checked_add(cast)
            .ok_or(GovernanceError::ArithmeticOverflow("proposal votes"))?;
        let updated = Proposal {
            votes,
            ..proposal.clone()
        };
        let event = match direction {
            VoteDirection::Up => GovernanceEvent::UpVote { id, voter: *caller },
            VoteDirection::Down => GovernanceEvent::DownVote { id, voter: *caller },
        };

        self.commit(Changeset {
            proposals: vec![updated],
            casts: vec![CastUpdate {
                voter: *caller,
                proposal: id,
                weight: cast,
            }],
            events: vec![event],
            ..Changeset::default()
        })?;

        tracing::info!(%cast, %votes, "vote recorded");
        Ok(cast)
    }

    /// Close an Active proposal. Returns the terminal status.
    pub fn finalize_proposal(
        &mut self,
        caller: &Address,
        id: ProposalId,
    ) -> Result<ProposalStatus, GovernanceError> {
        let span = spans::finalize_span(caller, id);
        let _guard = span.enter();
        let result = self.try_finalize(caller, id);
        report(result)
    }

    fn try_finalize(
        &mut self,
        caller: &Address,
        id: ProposalId,
    ) -> Result<ProposalStatus, GovernanceError> {
        let proposal = self.active_proposal(id)?;
        if !self.is_member(caller)? {
            return Err(GovernanceError::NotAMember(*caller));
        }

        let now = self.clock.now();
        let status = finalization::evaluate(proposal, &self.params, now)?;
        let escrow = if status == ProposalStatus::Passed && !proposal.amount.is_zero() {
            let available = self.treasury_balance()?;
            if proposal.amount > available {
                return Err(GovernanceError::InsufficientTreasury {
                    requested: proposal.amount,
                    available,
                });
            }
            Some(EscrowTransfer::Push {
                to: proposal.recipient,
                amount: proposal.amount,
            })
        } else {
            None
        };

        let updated = Proposal {
            status,
            finalized_at: Some(now),
            ..proposal.clone()
        };
        let event = GovernanceEvent::Finalize {
            id,
            recipient: proposal.recipient,
            status,
        };
        let votes = proposal.votes;

        self.commit(Changeset {
            proposals: vec![updated],
            closed: Some(id),
            events: vec![event],
            escrow,
            ..Changeset::default()
        })?;

        tracing::info!(%status, %votes, "proposal finalized");
        Ok(status)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Delegatee of `delegator`, [`Address::ZERO`] if none.
    pub fn delegator_delegatee(&self, delegator: &Address) -> Address {
        self.delegations.delegatee_of(delegator)
    }

    pub fn delegator_balance(&self, delegator: &Address) -> TokenAmount {
        self.delegations.delegator_balance(delegator)
    }

    pub fn delegation(&self, delegator: &Address) -> Option<&Delegation> {
        self.delegations.delegation(delegator)
    }

    pub fn delegatee_votes_received(&self, delegatee: &Address) -> TokenAmount {
        self.delegations.votes_received(delegatee)
    }

    pub fn delegatee_delegator_count(&self, delegatee: &Address) -> usize {
        self.delegations.delegator_count(delegatee)
    }

    pub fn delegatee_delegators(&self, delegatee: &Address) -> &[Address] {
        self.delegations.delegators(delegatee)
    }

    pub fn delegatees_by_votes(&self) -> Vec<DelegateeStanding> {
        self.delegations.delegatees_by_votes()
    }

    pub fn total_tokens_delegated(&self) -> TokenAmount {
        self.delegations.total_delegated()
    }

    /// Signed cast of `voter` on `id` (zero if it has not voted).
    pub fn votes_cast(&self, voter: &Address, id: ProposalId) -> VoteWeight {
        self.votes.cast(voter, id)
    }

    pub fn proposal(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn proposal_count(&self) -> u64 {
        self.proposals.count()
    }

    pub fn active_proposals(&self) -> Vec<&Proposal> {
        self.proposals.active().collect()
    }

    pub fn finalized_proposals(&self) -> Vec<&Proposal> {
        self.proposals.finalized().collect()
    }

    pub fn quorum(&self) -> TokenAmount {
        self.params.quorum
    }

    /// Voting period in seconds.
    pub fn voting_period(&self) -> u64 {
        self.params.voting_period_secs
    }

    pub fn params(&self) -> &GovernanceParams {
        &self.params
    }

    /// Custody balance not owed back to delegators.
    pub fn treasury_balance(&self) -> Result<TokenAmount, GovernanceError> {
        let custody = self.oracle.custody_balance()?;
        Ok(custody.saturating_sub(self.delegations.total_delegated()))
    }

    /// Weight `address` would vote with right now.
    pub fn voting_weight(&self, address: &Address) -> Result<TokenAmount, GovernanceError> {
        voting::voting_weight(
            self.delegations.is_delegator(address),
            self.member_balance(address)?,
            self.delegations.votes_received(address),
        )
    }

    /// Any form of membership: spendable balance, received weight or an
    /// escrowed delegation.
    pub fn is_member(&self, address: &Address) -> Result<bool, GovernanceError> {
        Ok(!self.member_balance(address)?.is_zero()
            || !self.delegations.votes_received(address).is_zero()
            || !self.delegations.delegator_balance(address).is_zero())
    }

    /// Up to `limit` persisted events starting at sequence `from`.
    pub fn events_since(
        &self,
        from: u64,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, GovernanceError> {
        self.store
            .events_from(from, limit)?
            .into_iter()
            .map(|stored| -> Result<_, GovernanceError> {
                Ok(RecordedEvent {
                    seq: stored.seq,
                    event: bincode::deserialize(&stored.data)?,
                })
            })
            .collect()
    }

    /// Sequence number of the last committed event (0 if none).
    pub fn last_event_seq(&self) -> u64 {
        self.next_event_seq - 1
    }

    /// Register an in-process listener, called after each committed event.
    pub fn subscribe(&mut self, listener: Box<dyn Fn(&RecordedEvent) + Send + Sync>) {
        self.bus.subscribe(listener);
    }

    /// Check the delegation invariants and that custody covers every
    /// escrowed delegation.
    pub fn audit(&self) -> Result<(), String> {
        self.delegations.audit()?;
        let custody = self
            .oracle
            .custody_balance()
            .map_err(|e| e.to_string())?;
        if custody < self.delegations.total_delegated() {
            return Err(format!(
                "custody {custody} below escrowed total {}",
                self.delegations.total_delegated()
            ));
        }
        Ok(())
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Spendable balance that counts towards membership. Custody holds the
    /// treasury and every escrowed delegation, none of which is its own.
    fn member_balance(&self, address: &Address) -> Result<TokenAmount, GovernanceError> {
        if *address == self.oracle.custody() {
            return Ok(TokenAmount::ZERO);
        }
        Ok(self.oracle.balance_of(address)?)
    }

    fn active_proposal(&self, id: ProposalId) -> Result<&Proposal, GovernanceError> {
        let proposal = self
            .proposals
            .get(id)
            .ok_or(GovernanceError::UnknownProposal(id))?;
        if !proposal.is_active() {
            return Err(GovernanceError::ProposalNotActive {
                id,
                status: proposal.status,
            });
        }
        Ok(proposal)
    }

    fn commit(&mut self, changes: Changeset) -> Result<(), GovernanceError> {
        let staged = self.store.escrow_custody().is_some();
        if !staged {
            if let Some(transfer) = &changes.escrow {
                transfer.execute(&self.oracle)?;
            }
        }

        let recorded = match self.persist(&changes, staged) {
            Ok(recorded) => recorded,
            Err(err) => {
                if let Some(transfer) = changes.escrow.as_ref().filter(|_| !staged) {
                    match transfer.compensate(&self.oracle) {
                        Ok(()) => {
                            tracing::warn!(error = %err, "store write failed, escrow reversed")
                        }
                        Err(comp) => tracing::error!(
                            error = %err,
                            compensation = %comp,
                            ?transfer,
                            "store write failed and escrow could not be reversed"
                        ),
                    }
                }
                return Err(err);
            }
        };

        self.apply(changes);
        self.next_event_seq += recorded.len() as u64;
        for event in &recorded {
            tracing::debug!(seq = event.seq, event = event.event.name(), "event committed");
            self.bus.emit(event);
        }
        Ok(())
    }

    fn persist(
        &self,
        changes: &Changeset,
        stage_escrow: bool,
    ) -> Result<Vec<RecordedEvent>, GovernanceError> {
        let mut batch = self.store.begin_batch()?;
        if let Some(transfer) = changes.escrow.as_ref().filter(|_| stage_escrow) {
            batch.stage_escrow(transfer)?;
        }
        let recorded = changes.write(&mut batch, self.next_event_seq)?;
        batch.commit()?;
        Ok(recorded)
    }

    fn apply(&mut self, changes: Changeset) {
        if let Some(plan) = &changes.delegation {
            self.delegations.apply(plan);
        }
        for proposal in changes.proposals {
            self.proposals.put(proposal);
        }
        for cast in changes.casts {
            let live = self
                .proposals
                .get(cast.proposal)
                .is_some_and(Proposal::is_active);
            self.votes.set(cast, live);
        }
        if let Some(id) = changes.closed {
            self.votes.close(id);
        }
    }
}

fn load_params<S: GovernanceStore>(
    store: &S,
    configured: GovernanceParams,
) -> Result<GovernanceParams, GovernanceError> {
    match store.get_meta(PARAMS_KEY)? {
        Some(bytes) => {
            let stored: GovernanceParams = bincode::deserialize(&bytes)?;
            if stored != configured {
                tracing::warn!(
                    stored_quorum = %stored.quorum,
                    stored_period = stored.voting_period_secs,
                    configured_quorum = %configured.quorum,
                    configured_period = configured.voting_period_secs,
                    "governance parameters are fixed at creation; keeping stored values"
                );
            }
            Ok(stored)
        }
        None => {
            let mut batch = store.begin_batch()?;
            batch.put_meta(PARAMS_KEY, &bincode::serialize(&configured)?)?;
            batch.commit()?;
            Ok(configured)
        }
    }
}

/// Log the outcome of an operation inside its span.
fn report<T>(result: Result<T, GovernanceError>) -> Result<T, GovernanceError> {
    if let Err(err) = &result {
        if err.is_rejection() {
            tracing::debug!(kind = err.kind(), error = %err, "operation rejected");
        } else {
            tracing::warn!(kind = err.kind(), error = %err, "operation failed");
        }
    }
    result
}
