//! The fungible-token boundary of the governance ledger.
//!
//! The token itself (mint, transfer, approve) lives elsewhere. The ledger only
//! needs to read spendable balances and move funds in and out of its own
//! custody account:
//! - **escrow pull** moves a member's tokens into custody (needs the member's
//!   prior allowance),
//! - **escrow push** moves tokens out of custody to any address.
//!
//! A storage backend that keeps the balances itself can stage an
//! [`EscrowTransfer`] inside the same write as the ledger records.

pub mod error;
pub mod escrow;

pub use error::OracleError;
pub use escrow::EscrowTransfer;

use dgov_types::{Address, TokenAmount};

/// Read and escrow access to the fungible token.
pub trait BalanceOracle: Send + Sync {
    /// Spendable balance of `address`.
    fn balance_of(&self, address: &Address) -> Result<TokenAmount, OracleError>;

    /// Move `amount` from `from` into the ledger's custody.
    fn escrow_pull(&self, from: &Address, amount: TokenAmount) -> Result<(), OracleError>;

    /// Move `amount` out of the ledger's custody to `to`.
    fn escrow_push(&self, to: &Address, amount: TokenAmount) -> Result<(), OracleError>;

    /// The address holding the ledger's custody (treasury plus escrow).
    fn custody(&self) -> Address;

    /// Balance held in custody.
    fn custody_balance(&self) -> Result<TokenAmount, OracleError> {
        self.balance_of(&self.custody())
    }
}

impl<O: BalanceOracle + ?Sized> BalanceOracle for std::sync::Arc<O> {
    fn balance_of(&self, address: &Address) -> Result<TokenAmount, OracleError> {
        (**self).balance_of(address)
    }

    fn escrow_pull(&self, from: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        (**self).escrow_pull(from, amount)
    }

    fn escrow_push(&self, to: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        (**self).escrow_push(to, amount)
    }

    fn custody(&self) -> Address {
        (**self).custody()
    }
}
