use crate::proposal::ProposalStatus;
use dgov_store::StoreError;
use dgov_token::OracleError;
use dgov_types::{Address, ProposalId, TokenAmount, VoteWeight};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("{0} is not a member")]
    NotAMember(Address),

    #[error("cannot delegate to self")]
    SelfDelegation,

    #[error("delegatee must not be the zero address")]
    InvalidDelegatee,

    #[error("delegatee {0} is not a member")]
    DelegateeNotAMember(Address),

    /// Delegation is exactly one hop: the named address is on the wrong side
    /// of an existing edge.
    #[error("delegation chains are not allowed ({0} already takes part in one)")]
    ChainedDelegation(Address),

    #[error("{delegator} already delegates to {delegatee}")]
    AlreadyDelegated {
        delegator: Address,
        delegatee: Address,
    },

    #[error("{0} has no active delegation")]
    NotDelegated(Address),

    #[error("insufficient treasury: requested {requested}, available {available}")]
    InsufficientTreasury {
        requested: TokenAmount,
        available: TokenAmount,
    },

    #[error("{0} has no voting power")]
    NoVotingPower(Address),

    #[error("{voter} has already voted on proposal {proposal}")]
    AlreadyVoted {
        voter: Address,
        proposal: ProposalId,
    },

    #[error("proposal {id} is {status}, not active")]
    ProposalNotActive {
        id: ProposalId,
        status: ProposalStatus,
    },

    #[error("quorum not met: {votes} < {quorum}")]
    QuorumNotMet {
        votes: VoteWeight,
        quorum: TokenAmount,
    },

    #[error("proposal {0} does not exist")]
    UnknownProposal(ProposalId),

    #[error("recipient must not be the zero address")]
    InvalidRecipient,

    #[error("escrow transfer failed: {0}")]
    Escrow(#[from] OracleError),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("ledger lock poisoned by an earlier panic")]
    LedgerPoisoned,
}

impl GovernanceError {
    /// Stable short name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAMember(_) => "not_a_member",
            Self::SelfDelegation => "self_delegation",
            Self::InvalidDelegatee => "invalid_delegatee",
            Self::DelegateeNotAMember(_) => "delegatee_not_a_member",
            Self::ChainedDelegation(_) => "chained_delegation",
            Self::AlreadyDelegated { .. } => "already_delegated",
            Self::NotDelegated(_) => "not_delegated",
            Self::InsufficientTreasury { .. } => "insufficient_treasury",
            Self::NoVotingPower(_) => "no_voting_power",
            Self::AlreadyVoted { .. } => "already_voted",
            Self::ProposalNotActive { .. } => "proposal_not_active",
            Self::QuorumNotMet { .. } => "quorum_not_met",
            Self::UnknownProposal(_) => "unknown_proposal",
            Self::InvalidRecipient => "invalid_recipient",
            Self::Escrow(_) => "escrow",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
            Self::ArithmeticOverflow(_) => "arithmetic_overflow",
            Self::LedgerPoisoned => "ledger_poisoned",
        }
    }

    /// Whether the error is a rejected precondition rather than an
    /// infrastructure failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::Escrow(_)
                | Self::Store(_)
                | Self::Serialization(_)
                | Self::ArithmeticOverflow(_)
                | Self::LedgerPoisoned
        )
    }
}

impl From<StoreError> for GovernanceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Escrow(oracle) => GovernanceError::Escrow(oracle),
            other => GovernanceError::Store(other),
        }
    }
}

impl From<bincode::Error> for GovernanceError {
    fn from(e: bincode::Error) -> Self {
        GovernanceError::Serialization(e.to_string())
    }
}
