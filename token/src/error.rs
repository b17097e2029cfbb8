use dgov_types::{Address, TokenAmount};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("insufficient balance for {owner}: need {needed}, have {available}")]
    InsufficientBalance {
        owner: Address,
        needed: TokenAmount,
        available: TokenAmount,
    },

    #[error("insufficient allowance from {owner}: need {needed}, approved {approved}")]
    InsufficientAllowance {
        owner: Address,
        needed: TokenAmount,
        approved: TokenAmount,
    },

    #[error("balance overflow for {0}")]
    Overflow(Address),

    #[error("token backend unavailable: {0}")]
    Unavailable(String),
}
