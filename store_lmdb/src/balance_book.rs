//! Persisted token balances used by the daemon as its balance oracle.
//!
//! Balances are keyed by the 20-byte address; allowances by
//! `owner ++ spender`. Both values are big-endian `u128`. The only spender the
//! book tracks allowances for is the custody account.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};

use dgov_token::{BalanceOracle, EscrowTransfer, OracleError};
use dgov_types::{Address, TokenAmount};

pub struct LmdbBalanceBook {
    pub(crate) env: Arc<Env>,
    pub(crate) tables: BalanceTables,
}

/// Balance and allowance tables plus the custody account they escrow into.
///
/// Every method works inside a caller-owned transaction, so the governance
/// write batch can move funds in the same commit as its records.
#[derive(Clone, Copy)]
pub(crate) struct BalanceTables {
    pub(crate) balances: Database<Bytes, Bytes>,
    pub(crate) allowances: Database<Bytes, Bytes>,
    pub(crate) custody: Address,
}

fn unavailable(e: heed::Error) -> OracleError {
    OracleError::Unavailable(e.to_string())
}

fn decode_amount(bytes: Option<&[u8]>) -> Result<TokenAmount, OracleError> {
    match bytes {
        None => Ok(TokenAmount::ZERO),
        Some(raw) => {
            let arr: [u8; 16] = raw
                .try_into()
                .map_err(|_| OracleError::Unavailable("corrupt amount entry".into()))?;
            Ok(TokenAmount::new(u128::from_be_bytes(arr)))
        }
    }
}

fn allowance_key(owner: &Address, spender: &Address) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..20].copy_from_slice(owner.as_bytes());
    key[20..].copy_from_slice(spender.as_bytes());
    key
}

impl BalanceTables {
    fn read_balance(&self, txn: &RoTxn, address: &Address) -> Result<TokenAmount, OracleError> {
        let raw = self
            .balances
            .get(txn, address.as_bytes())
            .map_err(unavailable)?;
        decode_amount(raw)
    }

    fn write_balance(
        &self,
        txn: &mut RwTxn,
        address: &Address,
        amount: TokenAmount,
    ) -> Result<(), OracleError> {
        if amount.is_zero() {
            self.balances
                .delete(txn, address.as_bytes())
                .map_err(unavailable)?;
        } else {
            self.balances
                .put(txn, address.as_bytes(), &amount.raw().to_be_bytes())
                .map_err(unavailable)?;
        }
        Ok(())
    }

    fn read_allowance(&self, txn: &RoTxn, owner: &Address) -> Result<TokenAmount, OracleError> {
        let raw = self
            .allowances
            .get(txn, &allowance_key(owner, &self.custody))
            .map_err(unavailable)?;
        decode_amount(raw)
    }

    fn write_allowance(
        &self,
        txn: &mut RwTxn,
        owner: &Address,
        amount: TokenAmount,
    ) -> Result<(), OracleError> {
        self.allowances
            .put(
                txn,
                &allowance_key(owner, &self.custody),
                &amount.raw().to_be_bytes(),
            )
            .map_err(unavailable)?;
        Ok(())
    }

    /// Debit `from` and credit `to`. The credit re-reads `to` after the
    /// debit, so a self-transfer nets to zero.
    fn move_funds(
        &self,
        txn: &mut RwTxn,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<(), OracleError> {
        let available = self.read_balance(txn, from)?;
        let remaining = available
            .checked_sub(amount)
            .ok_or(OracleError::InsufficientBalance {
                owner: *from,
                needed: amount,
                available,
            })?;
        self.write_balance(txn, from, remaining)?;
        let credited = self
            .read_balance(txn, to)?
            .checked_add(amount)
            .ok_or(OracleError::Overflow(*to))?;
        self.write_balance(txn, to, credited)
    }

    /// Pull `amount` from `from` into custody, consuming its allowance.
    fn pull(&self, txn: &mut RwTxn, from: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        let approved = self.read_allowance(txn, from)?;
        let left = approved
            .checked_sub(amount)
            .ok_or(OracleError::InsufficientAllowance {
                owner: *from,
                needed: amount,
                approved,
            })?;
        self.move_funds(txn, from, &self.custody, amount)?;
        self.write_allowance(txn, from, left)
    }

    fn push(&self, txn: &mut RwTxn, to: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        self.move_funds(txn, &self.custody, to, amount)
    }

    /// Apply `transfer` inside `txn`. Nothing is durable until the caller
    /// commits.
    pub(crate) fn stage(
        &self,
        txn: &mut RwTxn,
        transfer: &EscrowTransfer,
    ) -> Result<(), OracleError> {
        match *transfer {
            EscrowTransfer::Pull { from, amount } => self.pull(txn, &from, amount),
            EscrowTransfer::Push { to, amount } => self.push(txn, &to, amount),
        }
    }
}

impl LmdbBalanceBook {
    /// Run `f` in one write transaction and commit it.
    fn write<T>(
        &self,
        f: impl FnOnce(&BalanceTables, &mut RwTxn) -> Result<T, OracleError>,
    ) -> Result<T, OracleError> {
        let mut wtxn = self.env.write_txn().map_err(unavailable)?;
        let out = f(&self.tables, &mut wtxn)?;
        wtxn.commit().map_err(unavailable)?;
        Ok(out)
    }

    /// Credit `amount` to `to` out of thin air. Used for genesis allocations.
    pub fn mint(&self, to: &Address, amount: TokenAmount) -> Result<TokenAmount, OracleError> {
        let balance = self.write(|tables, txn| {
            let balance = tables
                .read_balance(txn, to)?
                .checked_add(amount)
                .ok_or(OracleError::Overflow(*to))?;
            tables.write_balance(txn, to, balance)?;
            Ok(balance)
        })?;
        tracing::debug!(%to, %amount, %balance, "minted");
        Ok(balance)
    }

    /// Plain token transfer between two holders.
    pub fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<(), OracleError> {
        self.write(|tables, txn| tables.move_funds(txn, from, to, amount))
    }

    /// Set the amount the custody account may pull from `owner`.
    pub fn approve(&self, owner: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        self.write(|tables, txn| tables.write_allowance(txn, owner, amount))
    }

    /// Remaining amount the custody account may pull from `owner`.
    pub fn allowance(&self, owner: &Address) -> Result<TokenAmount, OracleError> {
        let rtxn = self.env.read_txn().map_err(unavailable)?;
        self.tables.read_allowance(&rtxn, owner)
    }
}

impl BalanceOracle for LmdbBalanceBook {
    fn balance_of(&self, address: &Address) -> Result<TokenAmount, OracleError> {
        let rtxn = self.env.read_txn().map_err(unavailable)?;
        self.tables.read_balance(&rtxn, address)
    }

    fn escrow_pull(&self, from: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        self.write(|tables, txn| tables.pull(txn, from, amount))
    }

    fn escrow_push(&self, to: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        self.write(|tables, txn| tables.push(txn, to, amount))
    }

    fn custody(&self) -> Address {
        self.tables.custody
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;

    fn addr(seed: u8) -> Address {
        Address::new([seed; 20])
    }

    fn open_book() -> (tempfile::TempDir, LmdbEnvironment, LmdbBalanceBook) {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 16, 1 << 20).unwrap();
        let book = env.balance_book(addr(0xCC));
        (dir, env, book)
    }

    #[test]
    fn mint_and_transfer() {
        let (_dir, _env, book) = open_book();
        book.mint(&addr(1), TokenAmount::new(1_000)).unwrap();
        book.transfer(&addr(1), &addr(2), TokenAmount::new(400)).unwrap();

        assert_eq!(book.balance_of(&addr(1)).unwrap(), TokenAmount::new(600));
        assert_eq!(book.balance_of(&addr(2)).unwrap(), TokenAmount::new(400));
        assert_eq!(book.balance_of(&addr(3)).unwrap(), TokenAmount::ZERO);
    }

    #[test]
    fn transfer_beyond_balance_is_rejected() {
        let (_dir, _env, book) = open_book();
        book.mint(&addr(1), TokenAmount::new(10)).unwrap();
        let err = book
            .transfer(&addr(1), &addr(2), TokenAmount::new(11))
            .unwrap_err();
        assert!(matches!(err, OracleError::InsufficientBalance { .. }));
        assert_eq!(book.balance_of(&addr(1)).unwrap(), TokenAmount::new(10));
    }

    #[test]
    fn escrow_pull_requires_allowance() {
        let (_dir, _env, book) = open_book();
        book.mint(&addr(1), TokenAmount::new(500)).unwrap();

        let err = book.escrow_pull(&addr(1), TokenAmount::new(100)).unwrap_err();
        assert!(matches!(err, OracleError::InsufficientAllowance { .. }));

        book.approve(&addr(1), TokenAmount::new(150)).unwrap();
        book.escrow_pull(&addr(1), TokenAmount::new(100)).unwrap();
        assert_eq!(book.custody_balance().unwrap(), TokenAmount::new(100));
        assert_eq!(book.balance_of(&addr(1)).unwrap(), TokenAmount::new(400));
        assert_eq!(book.allowance(&addr(1)).unwrap(), TokenAmount::new(50));
    }

    #[test]
    fn failed_pull_leaves_allowance_untouched() {
        let (_dir, _env, book) = open_book();
        book.mint(&addr(1), TokenAmount::new(50)).unwrap();
        book.approve(&addr(1), TokenAmount::new(100)).unwrap();

        let err = book.escrow_pull(&addr(1), TokenAmount::new(80)).unwrap_err();
        assert!(matches!(err, OracleError::InsufficientBalance { .. }));
        assert_eq!(book.allowance(&addr(1)).unwrap(), TokenAmount::new(100));
        assert_eq!(book.custody_balance().unwrap(), TokenAmount::ZERO);
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let (_dir, _env, book) = open_book();
        book.mint(&addr(1), TokenAmount::new(300)).unwrap();
        book.transfer(&addr(1), &addr(1), TokenAmount::new(200)).unwrap();
        assert_eq!(book.balance_of(&addr(1)).unwrap(), TokenAmount::new(300));
    }

    #[test]
    fn escrow_push_pays_out_of_custody() {
        let (_dir, _env, book) = open_book();
        book.mint(&addr(0xCC), TokenAmount::new(1_000)).unwrap();
        book.escrow_push(&addr(7), TokenAmount::new(250)).unwrap();

        assert_eq!(book.custody_balance().unwrap(), TokenAmount::new(750));
        assert_eq!(book.balance_of(&addr(7)).unwrap(), TokenAmount::new(250));
        assert!(book.escrow_push(&addr(7), TokenAmount::new(751)).is_err());
    }
}
