use crate::domain::account::{Account, AccountId, Amount};
use crate::domain::challenge::{ChallengeStatus, OtpChallenge};
use crate::domain::movement::{Movement, MovementStatus};
use crate::domain::ports::{
    AccountStore, ChallengeStore, DeltaLeg, HistoryFilter, MovementStore, TransactionLog,
};
use crate::domain::record::TransactionRecord;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory account store.
///
/// `apply_deltas` runs check-then-write under one write lock, so all legs
/// of a movement become visible together or not at all.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.account_id.clone(), account);
        Ok(())
    }

    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account_id).cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }

    async fn apply_deltas(&self, legs: &[DeltaLeg]) -> Result<Vec<Account>> {
        let mut accounts = self.accounts.write().await;

        // check phase: no leg is written unless every leg passes
        let mut staged = Vec::with_capacity(legs.len());
        for leg in legs {
            let account =
                accounts
                    .get(&leg.account_id)
                    .ok_or_else(|| LedgerError::AccountNotFound {
                        account: leg.account_id.to_string(),
                    })?;
            if account.version != leg.expected_version {
                return Err(LedgerError::VersionConflict {
                    account: leg.account_id.to_string(),
                    expected: leg.expected_version,
                    found: account.version,
                });
            }
            let new_balance = account
                .balance
                .minor()
                .checked_add(leg.delta)
                .ok_or_else(|| LedgerError::InvalidAmount("balance overflow".to_string()))?;
            if new_balance < 0 {
                return Err(LedgerError::InsufficientFunds {
                    account: leg.account_id.to_string(),
                    available: account.balance,
                    required: Amount::from_minor(-leg.delta),
                });
            }
            staged.push((leg.account_id.clone(), new_balance));
        }

        let mut updated = Vec::with_capacity(legs.len());
        for (account_id, new_balance) in staged {
            if let Some(account) = accounts.get_mut(&account_id) {
                account.balance = Amount::from_minor(new_balance);
                account.version += 1;
                updated.push(account.clone());
            }
        }
        Ok(updated)
    }
}

/// Thread-safe in-memory movement store with compare-and-set transitions.
#[derive(Default, Clone)]
pub struct InMemoryMovementStore {
    movements: Arc<RwLock<HashMap<Uuid, Movement>>>,
}

impl InMemoryMovementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovementStore for InMemoryMovementStore {
    async fn insert(&self, movement: Movement) -> Result<bool> {
        let mut movements = self.movements.write().await;
        match movements.entry(movement.movement_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(movement);
                Ok(true)
            }
        }
    }

    async fn get(&self, movement_id: Uuid) -> Result<Option<Movement>> {
        let movements = self.movements.read().await;
        Ok(movements.get(&movement_id).cloned())
    }

    async fn transition(
        &self,
        movement_id: Uuid,
        from: MovementStatus,
        to: MovementStatus,
    ) -> Result<Movement> {
        let mut movements = self.movements.write().await;
        let movement =
            movements
                .get_mut(&movement_id)
                .ok_or(LedgerError::MovementNotFound {
                    movement: movement_id,
                })?;
        if movement.status != from || !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                entity: "movement",
                id: movement_id,
                from: movement.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        movement.status = to;
        if to == MovementStatus::Committed && movement.committed_at.is_none() {
            movement.committed_at = Some(Utc::now());
        }
        Ok(movement.clone())
    }

    async fn list_by_status(&self, status: MovementStatus) -> Result<Vec<Movement>> {
        let movements = self.movements.read().await;
        Ok(movements
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect())
    }
}

/// Thread-safe in-memory challenge store.
#[derive(Default, Clone)]
pub struct InMemoryChallengeStore {
    challenges: Arc<RwLock<HashMap<Uuid, OtpChallenge>>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn insert(&self, challenge: OtpChallenge) -> Result<()> {
        let mut challenges = self.challenges.write().await;
        challenges.insert(challenge.challenge_id, challenge);
        Ok(())
    }

    async fn latest_for_movement(&self, movement_id: Uuid) -> Result<Option<OtpChallenge>> {
        let challenges = self.challenges.read().await;
        Ok(challenges
            .values()
            .filter(|c| c.movement_id == movement_id)
            .max_by_key(|c| (c.created_at, c.resend_count))
            .cloned())
    }

    async fn transition(
        &self,
        challenge_id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
    ) -> Result<OtpChallenge> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| LedgerError::Storage(format!("challenge {challenge_id} not found")))?;
        // a challenge leaves Pending exactly once
        if challenge.status != from || from != ChallengeStatus::Pending || !to.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                entity: "challenge",
                id: challenge_id,
                from: challenge.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        challenge.status = to;
        Ok(challenge.clone())
    }

    async fn fail_attempt(&self, challenge_id: Uuid) -> Result<OtpChallenge> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .get_mut(&challenge_id)
            .ok_or_else(|| LedgerError::Storage(format!("challenge {challenge_id} not found")))?;
        match challenge.status {
            ChallengeStatus::Pending => {
                challenge.attempts_remaining = challenge.attempts_remaining.saturating_sub(1);
                if challenge.attempts_remaining == 0 {
                    challenge.status = ChallengeStatus::Exhausted;
                }
                Ok(challenge.clone())
            }
            ChallengeStatus::Expired => Err(LedgerError::OtpExpired),
            ChallengeStatus::Exhausted => Err(LedgerError::OtpExhausted),
            ChallengeStatus::Verified => Err(LedgerError::OtpAlreadyUsed),
        }
    }
}

/// Append-only in-memory transaction log. Records are pushed in commit
/// order and never touched again.
#[derive(Default, Clone)]
pub struct InMemoryTransactionLog {
    records: Arc<RwLock<Vec<TransactionRecord>>>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionLog for InMemoryTransactionLog {
    async fn append(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.account_id == *account_id)
            .filter(|r| filter.since.is_none_or(|since| r.timestamp >= since))
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn list_by_movement(&self, movement_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.movement_id == movement_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::movement::MovementKind;
    use crate::domain::record::Direction;
    use chrono::Duration;

    fn account(id: &str, balance: i64) -> Account {
        Account::new(AccountId::from(id), "owner").with_balance(Amount::from_minor(balance))
    }

    #[tokio::test]
    async fn test_apply_deltas_increments_version() {
        let store = InMemoryAccountStore::new();
        store.insert(account("ACC-1", 100_00)).await.unwrap();

        let updated = store
            .apply_deltas(&[DeltaLeg {
                account_id: AccountId::from("ACC-1"),
                delta: -40_00,
                expected_version: 0,
            }])
            .await
            .unwrap();
        assert_eq!(updated[0].balance, Amount::from_minor(60_00));
        assert_eq!(updated[0].version, 1);
    }

    #[tokio::test]
    async fn test_apply_deltas_detects_version_conflict() {
        let store = InMemoryAccountStore::new();
        store.insert(account("ACC-1", 100_00)).await.unwrap();

        let err = store
            .apply_deltas(&[DeltaLeg {
                account_id: AccountId::from("ACC-1"),
                delta: -10_00,
                expected_version: 7,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_apply_deltas_all_or_nothing() {
        let store = InMemoryAccountStore::new();
        store.insert(account("ACC-1", 100_00)).await.unwrap();
        store.insert(account("ACC-2", 0)).await.unwrap();

        // second leg would drive ACC-2 negative, so neither applies
        let err = store
            .apply_deltas(&[
                DeltaLeg {
                    account_id: AccountId::from("ACC-1"),
                    delta: 50_00,
                    expected_version: 0,
                },
                DeltaLeg {
                    account_id: AccountId::from("ACC-2"),
                    delta: -1,
                    expected_version: 0,
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let untouched = store.get(&AccountId::from("ACC-1")).await.unwrap().unwrap();
        assert_eq!(untouched.balance, Amount::from_minor(100_00));
        assert_eq!(untouched.version, 0);
    }

    #[tokio::test]
    async fn test_movement_insert_if_absent() {
        let store = InMemoryMovementStore::new();
        let movement = Movement::new(
            Uuid::new_v4(),
            MovementKind::Withdraw,
            None,
            AccountId::from("ACC-1"),
            None,
            Amount::from_minor(100_00),
            Amount::from_minor(20_00),
        )
        .unwrap();

        assert!(store.insert(movement.clone()).await.unwrap());
        assert!(!store.insert(movement).await.unwrap());
    }

    #[tokio::test]
    async fn test_movement_transition_cas() {
        let store = InMemoryMovementStore::new();
        let movement = Movement::new(
            Uuid::new_v4(),
            MovementKind::Withdraw,
            None,
            AccountId::from("ACC-1"),
            None,
            Amount::from_minor(100_00),
            Amount::from_minor(20_00),
        )
        .unwrap();
        let id = movement.movement_id;
        store.insert(movement).await.unwrap();

        store
            .transition(id, MovementStatus::Created, MovementStatus::OtpPending)
            .await
            .unwrap();

        // stale expected status loses
        let err = store
            .transition(id, MovementStatus::Created, MovementStatus::OtpPending)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        // illegal jumps lose even with the right expected status
        let err = store
            .transition(id, MovementStatus::OtpPending, MovementStatus::Committed)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_challenge_fail_attempt_exhausts() {
        let store = InMemoryChallengeStore::new();
        let challenge = OtpChallenge::new(
            Uuid::new_v4(),
            "123456",
            Duration::minutes(5),
            2,
            Duration::seconds(30),
        );
        let id = challenge.challenge_id;
        store.insert(challenge).await.unwrap();

        let first = store.fail_attempt(id).await.unwrap();
        assert_eq!(first.attempts_remaining, 1);
        assert_eq!(first.status, ChallengeStatus::Pending);

        let second = store.fail_attempt(id).await.unwrap();
        assert_eq!(second.attempts_remaining, 0);
        assert_eq!(second.status, ChallengeStatus::Exhausted);

        let err = store.fail_attempt(id).await.unwrap_err();
        assert!(matches!(err, LedgerError::OtpExhausted));
    }

    #[tokio::test]
    async fn test_log_lists_newest_first_with_limit() {
        let log = InMemoryTransactionLog::new();
        let account_id = AccountId::from("ACC-1");
        let base = Utc::now();
        for i in 0..5i64 {
            log.append(TransactionRecord::new(
                Uuid::new_v4(),
                account_id.clone(),
                Direction::Debit,
                Amount::from_minor(1_00),
                Amount::from_minor(10_00 - i * 100),
                Amount::from_minor(9_00 - i * 100),
                format!("TXN_TRANSFER_{i}_ABCDEF"),
                base + Duration::seconds(i),
            ))
            .await
            .unwrap();
        }

        let listed = log
            .list_by_account(
                &account_id,
                &HistoryFilter {
                    since: None,
                    limit: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].timestamp > listed[1].timestamp);

        let since = log
            .list_by_account(
                &account_id,
                &HistoryFilter {
                    since: Some(base + Duration::seconds(3)),
                    limit: 50,
                },
            )
            .await
            .unwrap();
        assert_eq!(since.len(), 2);
    }
}
