//! Delegated, token-weighted governance.
//!
//! Members holding a fungible balance vote on treasury proposals directly, or
//! hand their whole balance's weight to one delegatee. Delegation is a single
//! hop and live: when a delegator joins or leaves, every Active proposal its
//! delegatee already voted on is corrected retroactively. Proposals pass by
//! reaching a fixed quorum of net signed votes before their deadline and fail
//! once the deadline has gone by.
//!
//! - [`DelegationLedger`]: delegation graph and aggregated received weight
//! - [`ProposalStore`]: proposal records and the id sequence
//! - [`VoteBook`]: per-voter casts and the live-vote index
//! - [`finalization`]: the quorum/deadline decision
//! - [`GovernanceLedger`]: the operation surface, one transaction per call
//! - [`SharedLedger`]: the single-mutex boundary for multi-threaded callers

pub mod changeset;
pub mod delegation;
pub mod error;
pub mod event;
pub mod finalization;
pub mod indexed_set;
pub mod ledger;
pub mod proposal;
pub mod service;
pub mod spans;
pub mod voting;

pub use delegation::{DelegateeStanding, Delegation, DelegationLedger};
pub use error::GovernanceError;
pub use event::{EventBus, GovernanceEvent, RecordedEvent};
pub use indexed_set::IndexedSet;
pub use ledger::GovernanceLedger;
pub use proposal::{NewProposal, Proposal, ProposalStatus, ProposalStore};
pub use service::SharedLedger;
pub use voting::{VoteBook, VoteDirection};
