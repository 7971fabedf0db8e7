use crate::domain::account::Amount;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Which cumulative transfer limit a movement ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Daily,
    Monthly,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitScope::Daily => write!(f, "daily"),
            LimitScope::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("account {account} not found")]
    AccountNotFound { account: String },

    #[error("account {account} is frozen")]
    AccountFrozen { account: String },

    #[error("movement {movement} not found")]
    MovementNotFound { movement: Uuid },

    #[error("no challenge issued for movement {movement}")]
    ChallengeNotFound { movement: Uuid },

    #[error("insufficient funds on {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: String,
        available: Amount,
        required: Amount,
    },

    #[error("{scope} transfer limit exceeded on {account}: {spent} spent of {limit}")]
    LimitExceeded {
        account: String,
        scope: LimitScope,
        spent: Amount,
        limit: Amount,
    },

    #[error("version conflict on account {account}: expected {expected}, found {found}")]
    VersionConflict {
        account: String,
        expected: u64,
        found: u64,
    },

    #[error("commit aborted after {attempts} conflicting attempts")]
    Concurrency { attempts: u32 },

    #[error("commit failed, no balances changed: {0}")]
    CommitFailed(String),

    #[error("illegal transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("wrong code, {attempts_remaining} attempts remaining")]
    WrongCode { attempts_remaining: u8 },

    #[error("challenge expired")]
    OtpExpired,

    #[error("challenge exhausted")]
    OtpExhausted,

    #[error("challenge already verified, codes are single-use")]
    OtpAlreadyUsed,

    #[error("resend throttled until {until}")]
    ResendCooldown { until: DateTime<Utc> },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl LedgerError {
    /// Transient errors are safe to retry with a fresh read.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::VersionConflict { .. })
    }
}
