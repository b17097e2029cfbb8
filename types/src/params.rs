//! Governance parameters fixed when a ledger is first created.

use crate::amount::TokenAmount;
use serde::{Deserialize, Serialize};

/// Quorum and voting period of a ledger.
///
/// Both are set once at construction; there is no governance path that
/// changes them afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParams {
    /// Minimum net signed vote total for a proposal to pass.
    pub quorum: TokenAmount,

    /// Seconds from proposal creation until its deadline.
    pub voting_period_secs: u64,
}

impl GovernanceParams {
    /// Just over a quarter of a 2M token supply.
    pub const DEFAULT_QUORUM: u128 = 500_001;

    /// One hour.
    pub const DEFAULT_VOTING_PERIOD_SECS: u64 = 3600;

    pub fn new(quorum: TokenAmount, voting_period_secs: u64) -> Self {
        Self {
            quorum,
            voting_period_secs,
        }
    }
}

impl Default for GovernanceParams {
    fn default() -> Self {
        Self::new(
            TokenAmount::new(Self::DEFAULT_QUORUM),
            Self::DEFAULT_VOTING_PERIOD_SECS,
        )
    }
}
