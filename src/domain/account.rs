use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default per-account cumulative transfer limits, in minor units.
pub const DEFAULT_DAILY_LIMIT: Amount = Amount::from_minor(100_000_00);
pub const DEFAULT_MONTHLY_LIMIT: Amount = Amount::from_minor(1_000_000_00);

/// A monetary value in integer minor units (e.g. centavos).
///
/// # Invariant
/// The inner value is always >= 0. Floating point never touches money;
/// signed deltas exist only at the account-store boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// Create an amount, rejecting negative values.
    pub fn new(minor: i64) -> Result<Self, LedgerError> {
        if minor < 0 {
            Err(LedgerError::InvalidAmount(format!(
                "amount must be non-negative, got {minor}"
            )))
        } else {
            Ok(Self(minor))
        }
    }

    /// Const constructor for trusted values. The caller must ensure the
    /// value is non-negative.
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Returns `None` if the result would be negative.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let result = self.0.checked_sub(other.0)?;
        if result < 0 { None } else { Some(Self(result)) }
    }

    /// Fraction of this amount expressed in basis points, truncated toward
    /// zero. 100 bps == 1%.
    pub fn basis_points(self, bps: i64) -> Self {
        Self(((self.0 as i128 * bps as i128) / 10_000) as i64)
    }

    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl TryFrom<i64> for Amount {
    type Error = LedgerError;

    fn try_from(minor: i64) -> Result<Self, Self::Error> {
        Self::new(minor)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Opaque account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
}

/// A customer account. The single source of truth for funds.
///
/// `version` is the optimistic-concurrency counter: it increments on every
/// successful mutation, and every mutation must present the version it read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub owner_id: String,
    pub balance: Amount,
    pub status: AccountStatus,
    pub daily_transfer_limit: Amount,
    pub monthly_transfer_limit: Amount,
    pub version: u64,
}

impl Account {
    pub fn new(account_id: AccountId, owner_id: impl Into<String>) -> Self {
        Self {
            account_id,
            owner_id: owner_id.into(),
            balance: Amount::ZERO,
            status: AccountStatus::Active,
            daily_transfer_limit: DEFAULT_DAILY_LIMIT,
            monthly_transfer_limit: DEFAULT_MONTHLY_LIMIT,
            version: 0,
        }
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_limits(mut self, daily: Amount, monthly: Amount) -> Self {
        self.daily_transfer_limit = daily;
        self.monthly_transfer_limit = monthly;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
