use crate::domain::account::{Account, AccountId, Amount};
use crate::domain::challenge::{ChallengeStatus, OtpChallenge};
use crate::domain::movement::{Movement, MovementStatus};
use crate::domain::ports::{
    AccountStore, ChallengeStore, DeltaLeg, HistoryFilter, MovementStore, TransactionLog,
};
use crate::domain::record::{Direction, TransactionRecord};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for movements.
pub const CF_MOVEMENTS: &str = "movements";
/// Column Family for OTP challenges.
pub const CF_CHALLENGES: &str = "challenges";
/// Column Family for the append-only transaction log.
pub const CF_RECORDS: &str = "records";

/// Persistent store backed by RocksDB, one column family per entity.
///
/// Read-modify-write mutations (delta application, status transitions,
/// attempt accounting) serialize through `write_gate`; multi-leg balance
/// updates land in a single `WriteBatch` so they become durable together.
///
/// `Clone` shares the underlying `Arc<DB>` and the gate.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the given path, ensuring all
    /// required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_ACCOUNTS, CF_MOVEMENTS, CF_CHALLENGES, CF_RECORDS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("column family {name} not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self.db.get_cf(handle, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let handle = self.cf(cf)?;
        self.db.put_cf(handle, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(handle, rocksdb::IteratorMode::Start) {
            let (_key, bytes) = item?;
            values.push(serde_json::from_slice(&bytes)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl AccountStore for RocksDbStore {
    async fn insert(&self, account: Account) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.put_json(CF_ACCOUNTS, account.account_id.as_str().as_bytes(), &account)
    }

    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, account_id.as_str().as_bytes())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        self.scan(CF_ACCOUNTS)
    }

    async fn apply_deltas(&self, legs: &[DeltaLeg]) -> Result<Vec<Account>> {
        let _gate = self.write_gate.lock().await;

        let mut staged = Vec::with_capacity(legs.len());
        for leg in legs {
            let account: Account = self
                .get_json(CF_ACCOUNTS, leg.account_id.as_str().as_bytes())?
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
            staged.push((account, new_balance));
        }

        let handle = self.cf(CF_ACCOUNTS)?;
        let mut batch = WriteBatch::default();
        let mut updated = Vec::with_capacity(legs.len());
        for (mut account, new_balance) in staged {
            account.balance = Amount::from_minor(new_balance);
            account.version += 1;
            batch.put_cf(
                handle,
                account.account_id.as_str().as_bytes(),
                serde_json::to_vec(&account)?,
            );
            updated.push(account);
        }
        self.db.write(batch)?;
        Ok(updated)
    }
}

#[async_trait]
impl MovementStore for RocksDbStore {
    async fn insert(&self, movement: Movement) -> Result<bool> {
        let _gate = self.write_gate.lock().await;
        let key = movement.movement_id.as_bytes().to_vec();
        if self.get_json::<Movement>(CF_MOVEMENTS, &key)?.is_some() {
            return Ok(false);
        }
        self.put_json(CF_MOVEMENTS, &key, &movement)?;
        Ok(true)
    }

    async fn get(&self, movement_id: Uuid) -> Result<Option<Movement>> {
        self.get_json(CF_MOVEMENTS, movement_id.as_bytes())
    }

    async fn transition(
        &self,
        movement_id: Uuid,
        from: MovementStatus,
        to: MovementStatus,
    ) -> Result<Movement> {
        let _gate = self.write_gate.lock().await;
        let key = movement_id.as_bytes().to_vec();
        let mut movement: Movement = self
            .get_json(CF_MOVEMENTS, &key)?
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
        self.put_json(CF_MOVEMENTS, &key, &movement)?;
        Ok(movement)
    }

    async fn list_by_status(&self, status: MovementStatus) -> Result<Vec<Movement>> {
        let movements: Vec<Movement> = self.scan(CF_MOVEMENTS)?;
        Ok(movements.into_iter().filter(|m| m.status == status).collect())
    }
}

#[async_trait]
impl ChallengeStore for RocksDbStore {
    async fn insert(&self, challenge: OtpChallenge) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.put_json(
            CF_CHALLENGES,
            challenge.challenge_id.as_bytes(),
            &challenge,
        )
    }

    async fn latest_for_movement(&self, movement_id: Uuid) -> Result<Option<OtpChallenge>> {
        let challenges: Vec<OtpChallenge> = self.scan(CF_CHALLENGES)?;
        Ok(challenges
            .into_iter()
            .filter(|c| c.movement_id == movement_id)
            .max_by_key(|c| (c.created_at, c.resend_count)))
    }

    async fn transition(
        &self,
        challenge_id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
    ) -> Result<OtpChallenge> {
        let _gate = self.write_gate.lock().await;
        let key = challenge_id.as_bytes().to_vec();
        let mut challenge: OtpChallenge = self
            .get_json(CF_CHALLENGES, &key)?
            .ok_or_else(|| LedgerError::Storage(format!("challenge {challenge_id} not found")))?;
        if challenge.status != from || from != ChallengeStatus::Pending || !to.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                entity: "challenge",
                id: challenge_id,
                from: challenge.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        challenge.status = to;
        self.put_json(CF_CHALLENGES, &key, &challenge)?;
        Ok(challenge)
    }

    async fn fail_attempt(&self, challenge_id: Uuid) -> Result<OtpChallenge> {
        let _gate = self.write_gate.lock().await;
        let key = challenge_id.as_bytes().to_vec();
        let mut challenge: OtpChallenge = self
            .get_json(CF_CHALLENGES, &key)?
            .ok_or_else(|| LedgerError::Storage(format!("challenge {challenge_id} not found")))?;
        match challenge.status {
            ChallengeStatus::Pending => {
                challenge.attempts_remaining = challenge.attempts_remaining.saturating_sub(1);
                if challenge.attempts_remaining == 0 {
                    challenge.status = ChallengeStatus::Exhausted;
                }
                self.put_json(CF_CHALLENGES, &key, &challenge)?;
                Ok(challenge)
            }
            ChallengeStatus::Expired => Err(LedgerError::OtpExpired),
            ChallengeStatus::Exhausted => Err(LedgerError::OtpExhausted),
            ChallengeStatus::Verified => Err(LedgerError::OtpAlreadyUsed),
        }
    }
}

#[async_trait]
impl TransactionLog for RocksDbStore {
    async fn append(&self, record: TransactionRecord) -> Result<()> {
        self.put_json(CF_RECORDS, record.record_id.as_bytes(), &record)
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>> {
        let mut records: Vec<TransactionRecord> = self
            .scan::<TransactionRecord>(CF_RECORDS)?
            .into_iter()
            .filter(|r| r.account_id == *account_id)
            .filter(|r| filter.since.is_none_or(|since| r.timestamp >= since))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(filter.limit);
        Ok(records)
    }

    async fn list_by_movement(&self, movement_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let mut records: Vec<TransactionRecord> = self
            .scan::<TransactionRecord>(CF_RECORDS)?
            .into_iter()
            .filter(|r| r.movement_id == movement_id)
            .collect();
        // debit leg first, matching commit order
        records.sort_by_key(|r| (r.timestamp, matches!(r.direction, Direction::Credit)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_column_families() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).expect("failed to open rocksdb");

        for name in [CF_ACCOUNTS, CF_MOVEMENTS, CF_CHALLENGES, CF_RECORDS] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_account_roundtrip_and_delta() {
        let dir = tempdir().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();

        let account = Account::new(AccountId::from("ACC-1"), "owner")
            .with_balance(Amount::from_minor(500_00));
        AccountStore::insert(&store, account.clone()).await.unwrap();

        let loaded = AccountStore::get(&store, &AccountId::from("ACC-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, account);

        let updated = store
            .apply_deltas(&[DeltaLeg {
                account_id: AccountId::from("ACC-1"),
                delta: -100_00,
                expected_version: 0,
            }])
            .await
            .unwrap();
        assert_eq!(updated[0].balance, Amount::from_minor(400_00));
        assert_eq!(updated[0].version, 1);

        let err = store
            .apply_deltas(&[DeltaLeg {
                account_id: AccountId::from("ACC-1"),
                delta: -100_00,
                expected_version: 0,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            let account = Account::new(AccountId::from("ACC-1"), "owner")
                .with_balance(Amount::from_minor(250_00));
            AccountStore::insert(&store, account).await.unwrap();
        }

        let reopened = RocksDbStore::open(dir.path()).unwrap();
        let loaded = AccountStore::get(&reopened, &AccountId::from("ACC-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.balance, Amount::from_minor(250_00));
    }
}
