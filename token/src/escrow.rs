use dgov_types::{Address, TokenAmount};

use crate::{BalanceOracle, OracleError};

/// Funds moved in or out of the ledger's custody by an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscrowTransfer {
    Pull { from: Address, amount: TokenAmount },
    Push { to: Address, amount: TokenAmount },
}

impl EscrowTransfer {
    pub fn execute<O: BalanceOracle + ?Sized>(&self, oracle: &O) -> Result<(), OracleError> {
        match *self {
            EscrowTransfer::Pull { from, amount } => oracle.escrow_pull(&from, amount),
            EscrowTransfer::Push { to, amount } => oracle.escrow_push(&to, amount),
        }
    }

    /// Undo a transfer that was executed for an operation that then failed
    /// to persist. Reversing a push needs the recipient's allowance.
    pub fn compensate<O: BalanceOracle + ?Sized>(&self, oracle: &O) -> Result<(), OracleError> {
        match *self {
            EscrowTransfer::Pull { from, amount } => oracle.escrow_push(&from, amount),
            EscrowTransfer::Push { to, amount } => oracle.escrow_pull(&to, amount),
        }
    }

    pub fn amount(&self) -> TokenAmount {
        match *self {
            EscrowTransfer::Pull { amount, .. } | EscrowTransfer::Push { amount, .. } => amount,
        }
    }
}
