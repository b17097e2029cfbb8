//! Nullable balance oracle: an in-memory token with allowances.

use dgov_token::{BalanceOracle, OracleError};
use dgov_types::{Address, TokenAmount};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Book {
    balances: HashMap<Address, TokenAmount>,
    /// Amount the custody account may still pull from each owner.
    allowances: HashMap<Address, TokenAmount>,
    fail_next: Option<OracleError>,
    escrow_calls: usize,
}

impl Book {
    fn balance(&self, address: &Address) -> TokenAmount {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn move_funds(
        &mut self,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<(), OracleError> {
        let available = self.balance(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(OracleError::InsufficientBalance {
                owner: *from,
                needed: amount,
                available,
            })?;
        self.balances.insert(*from, remaining);
        let credited = match self.balance(to).checked_add(amount) {
            Some(credited) => credited,
            None => {
                self.balances.insert(*from, available);
                return Err(OracleError::Overflow(*to));
            }
        };
        self.balances.insert(*to, credited);
        Ok(())
    }
}

/// A thread-safe in-memory token.
///
/// By default every owner has an unlimited allowance towards custody, so tests
/// only need to set balances. Call [`NullBalanceOracle::require_allowances`]
/// to exercise the approve-then-pull flow.
pub struct NullBalanceOracle {
    custody: Address,
    book: Mutex<Book>,
    enforce_allowances: bool,
}

impl NullBalanceOracle {
    pub fn new(custody: Address) -> Self {
        Self {
            custody,
            book: Mutex::new(Book::default()),
            enforce_allowances: false,
        }
    }

    /// Make escrow pulls consume explicit allowances.
    pub fn require_allowances(mut self) -> Self {
        self.enforce_allowances = true;
        self
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_balance(&self, address: &Address, amount: TokenAmount) {
        self.book().balances.insert(*address, amount);
    }

    /// Plain holder-to-holder transfer.
    pub fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<(), OracleError> {
        self.book().move_funds(from, to, amount)
    }

    pub fn approve(&self, owner: &Address, amount: TokenAmount) {
        self.book().allowances.insert(*owner, amount);
    }

    pub fn allowance(&self, owner: &Address) -> TokenAmount {
        self.book().allowances.get(owner).copied().unwrap_or_default()
    }

    /// Make the next escrow call fail with `error`.
    pub fn fail_next_escrow(&self, error: OracleError) {
        self.book().fail_next = Some(error);
    }

    /// Number of escrow calls that reached the book, failed ones included.
    pub fn escrow_calls(&self) -> usize {
        self.book().escrow_calls
    }
}

impl BalanceOracle for NullBalanceOracle {
    fn balance_of(&self, address: &Address) -> Result<TokenAmount, OracleError> {
        Ok(self.book().balance(address))
    }

    fn escrow_pull(&self, from: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        let mut book = self.book();
        book.escrow_calls += 1;
        if let Some(err) = book.fail_next.take() {
            return Err(err);
        }
        let left = if self.enforce_allowances {
            let approved = book.allowances.get(from).copied().unwrap_or_default();
            Some(
                approved
                    .checked_sub(amount)
                    .ok_or(OracleError::InsufficientAllowance {
                        owner: *from,
                        needed: amount,
                        approved,
                    })?,
            )
        } else {
            None
        };
        book.move_funds(from, &self.custody, amount)?;
        if let Some(left) = left {
            book.allowances.insert(*from, left);
        }
        Ok(())
    }

    fn escrow_push(&self, to: &Address, amount: TokenAmount) -> Result<(), OracleError> {
        let mut book = self.book();
        book.escrow_calls += 1;
        if let Some(err) = book.fail_next.take() {
            return Err(err);
        }
        book.move_funds(&self.custody, to, amount)
    }

    fn custody(&self) -> Address {
        self.custody
    }
}
