//! Fundamental types for the delegated governance ledger.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! member addresses, token amounts, signed vote weights, proposal ids, timestamps,
//! and the fixed governance parameters.

pub mod address;
pub mod amount;
pub mod error;
pub mod params;
pub mod proposal_id;
pub mod time;

pub use address::Address;
pub use amount::{TokenAmount, VoteWeight};
pub use error::TypesError;
pub use params::GovernanceParams;
pub use proposal_id::ProposalId;
pub use time::{Clock, SystemClock, Timestamp};
