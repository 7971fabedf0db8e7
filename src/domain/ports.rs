use crate::domain::account::{Account, AccountId};
use crate::domain::challenge::{ChallengeStatus, OtpChallenge};
use crate::domain::movement::{Movement, MovementStatus};
use crate::domain::record::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// One leg of an atomic balance mutation: a signed delta in minor units,
/// guarded by the account version the caller read.
#[derive(Debug, Clone)]
pub struct DeltaLeg {
    pub account_id: AccountId,
    pub delta: i64,
    pub expected_version: u64,
}

/// Pagination window for transaction history, newest first.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            since: None,
            limit: 50,
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: Account) -> Result<()>;
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>>;
    async fn all_accounts(&self) -> Result<Vec<Account>>;

    /// The only balance mutator. Applies all legs or none: any version
    /// mismatch fails with `VersionConflict`, any balance that would go
    /// negative fails with `InsufficientFunds`, and in either case no leg
    /// is written. At most one leg per account. Returns the updated
    /// accounts in leg order, each with its version incremented.
    async fn apply_deltas(&self, legs: &[DeltaLeg]) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait MovementStore: Send + Sync {
    /// Insert-if-absent. Returns `false` when the id already exists, so a
    /// retried request can fall back to the stored movement.
    async fn insert(&self, movement: Movement) -> Result<bool>;
    async fn get(&self, movement_id: Uuid) -> Result<Option<Movement>>;

    /// Compare-and-set status transition. Fails with `InvalidTransition`
    /// unless the stored status equals `from` and `from -> to` is legal.
    /// Stamps `committed_at` when moving into `Committed`.
    async fn transition(
        &self,
        movement_id: Uuid,
        from: MovementStatus,
        to: MovementStatus,
    ) -> Result<Movement>;

    async fn list_by_status(&self, status: MovementStatus) -> Result<Vec<Movement>>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert(&self, challenge: OtpChallenge) -> Result<()>;

    /// The most recently issued challenge for a movement (resends replace
    /// older ones).
    async fn latest_for_movement(&self, movement_id: Uuid) -> Result<Option<OtpChallenge>>;

    /// Compare-and-set status transition; a challenge leaves `Pending`
    /// exactly once.
    async fn transition(
        &self,
        challenge_id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
    ) -> Result<OtpChallenge>;

    /// Atomically burn one attempt on a pending challenge, flipping it to
    /// `Exhausted` when the last attempt is spent. Returns the updated
    /// challenge, or the terminal-status error for non-pending ones.
    async fn fail_attempt(&self, challenge_id: Uuid) -> Result<OtpChallenge>;
}

#[async_trait]
pub trait TransactionLog: Send + Sync {
    async fn append(&self, record: TransactionRecord) -> Result<()>;

    /// Records for an account, newest first, restartable via `since`.
    async fn list_by_account(
        &self,
        account_id: &AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>>;

    /// Records for a movement in append order. Empty for uncommitted
    /// movements; used for idempotent commit replay.
    async fn list_by_movement(&self, movement_id: Uuid) -> Result<Vec<TransactionRecord>>;
}

/// Out-of-band delivery of the plaintext code (SMS, push, ...). The ledger
/// core never sees the code again after handing it over.
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, movement_id: Uuid, code: &str) -> Result<()>;
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type MovementStoreRef = Arc<dyn MovementStore>;
pub type ChallengeStoreRef = Arc<dyn ChallengeStore>;
pub type TransactionLogRef = Arc<dyn TransactionLog>;
pub type OtpDeliveryRef = Arc<dyn OtpDelivery>;
