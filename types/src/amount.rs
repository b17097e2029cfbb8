//! Token amounts and signed vote weights.
//!
//! Amounts are fixed-point integers in the token's smallest unit. Vote weights
//! are signed: a positive weight is an up-vote, a negative weight a down-vote.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// A non-negative token amount in raw units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// The amount as a positive vote weight, if it fits in `i128`.
    pub fn to_weight(self) -> Option<VoteWeight> {
        i128::try_from(self.0).ok().map(VoteWeight)
    }
}

impl Add for TokenAmount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TokenAmount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl From<u128> for TokenAmount {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed, weighted vote total.
///
/// Used both for a proposal's net tally and for a single voter's cast.
/// Zero on a cast means "has not voted".
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VoteWeight(i128);

impl VoteWeight {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: i128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `-1`, `0` or `1`.
    pub fn signum(&self) -> i128 {
        self.0.signum()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// `sign(self) * amount`, the weight a change of `amount` contributes to
    /// a cast that already points in this direction.
    pub fn directed(&self, amount: TokenAmount) -> Option<Self> {
        amount
            .to_weight()
            .and_then(|w| w.0.checked_mul(self.signum()))
            .map(Self)
    }

    /// Whether this tally reaches a non-negative threshold.
    pub fn meets(&self, threshold: TokenAmount) -> bool {
        self.0 >= 0 && (self.0 as u128) >= threshold.raw()
    }
}

impl Neg for VoteWeight {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl From<i128> for VoteWeight {
    fn from(raw: i128) -> Self {
        Self(raw)
    }
}

impl fmt::Display for VoteWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
