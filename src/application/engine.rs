use crate::application::fees::FeeSchedule;
use crate::domain::account::{Account, AccountId, Amount};
use crate::domain::movement::{Movement, MovementKind, WithdrawChannel};
use crate::domain::ports::{AccountStoreRef, DeltaLeg, HistoryFilter, TransactionLogRef};
use crate::domain::record::{Direction, TransactionRecord, movement_reference};
use crate::error::{LedgerError, LimitScope, Result};
use chrono::{Datelike, NaiveTime, TimeZone, Utc};

/// Version conflicts are transient; after this many fresh-read retries the
/// commit surfaces `Concurrency` instead.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Pure validation plus the atomic two-leg commit.
///
/// The engine never mutates balances itself: every write goes through
/// `AccountStore::apply_deltas`, which applies all legs or none under the
/// optimistic version check. A reader can therefore never observe a debit
/// without its matching credit.
pub struct LedgerEngine {
    accounts: AccountStoreRef,
    log: TransactionLogRef,
    fees: FeeSchedule,
}

impl LedgerEngine {
    pub fn new(accounts: AccountStoreRef, log: TransactionLogRef) -> Self {
        Self {
            accounts,
            log,
            fees: FeeSchedule,
        }
    }

    pub fn quote(
        &self,
        kind: MovementKind,
        channel: Option<WithdrawChannel>,
        principal: Amount,
    ) -> Amount {
        self.fees.quote(kind, channel, principal)
    }

    /// Checks a movement against per-kind bounds, account status, current
    /// balance, and the cumulative daily/monthly limits. Nothing persists
    /// on failure.
    pub async fn validate(&self, movement: &Movement) -> Result<()> {
        self.fees.check_bounds(movement.kind, movement.principal)?;

        let source = self.load_account(&movement.source_account_id).await?;
        if !source.is_active() {
            return Err(LedgerError::AccountFrozen {
                account: source.account_id.to_string(),
            });
        }
        if let Some(dest_id) = &movement.destination_account_id
            && *dest_id != movement.source_account_id
        {
            let dest = self.load_account(dest_id).await?;
            if !dest.is_active() {
                return Err(LedgerError::AccountFrozen {
                    account: dest.account_id.to_string(),
                });
            }
        }

        if movement.total > source.balance {
            return Err(LedgerError::InsufficientFunds {
                account: source.account_id.to_string(),
                available: source.balance,
                required: movement.total,
            });
        }

        self.check_limits(&source, movement).await
    }

    /// Applies a verified movement: debit the source by `total`, credit the
    /// destination by `principal` when one exists (the fee is retained, not
    /// forwarded). Idempotent under the movement id: a replayed commit
    /// returns the original records and touches no balances.
    pub async fn commit(&self, movement: &Movement) -> Result<Vec<TransactionRecord>> {
        let replayed = self.log.list_by_movement(movement.movement_id).await?;
        if !replayed.is_empty() {
            tracing::debug!(
                movement_id = %movement.movement_id,
                "commit replay, returning original records"
            );
            return Ok(replayed);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_commit(movement).await {
                Ok(records) => return Ok(records),
                Err(e) if e.is_transient() && attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(
                        movement_id = %movement.movement_id,
                        attempt,
                        "version conflict, retrying commit with a fresh read"
                    );
                }
                Err(LedgerError::VersionConflict { .. }) => {
                    return Err(LedgerError::Concurrency { attempts: attempt });
                }
                Err(e) => return Err(as_commit_failure(e)),
            }
        }
    }

    async fn try_commit(&self, movement: &Movement) -> Result<Vec<TransactionRecord>> {
        let source = self.load_account(&movement.source_account_id).await?;
        let after_debit = source.balance.checked_sub(movement.total).ok_or_else(|| {
            LedgerError::InsufficientFunds {
                account: source.account_id.to_string(),
                available: source.balance,
                required: movement.total,
            }
        })?;

        let now = Utc::now();
        let reference = movement_reference(movement.kind, movement.movement_id, now);
        let mut records = Vec::with_capacity(2);

        match &movement.destination_account_id {
            // Linked cash-in: both legs land on one account, so a single
            // net delta (the retained fee) is applied while the ledger
            // records both sides with the intermediate balance.
            Some(dest_id) if *dest_id == movement.source_account_id => {
                let legs = [DeltaLeg {
                    account_id: source.account_id.clone(),
                    delta: -movement.fee.minor(),
                    expected_version: source.version,
                }];
                self.accounts.apply_deltas(&legs).await?;
                let after_credit =
                    after_debit
                        .checked_add(movement.principal)
                        .ok_or_else(|| {
                            LedgerError::InvalidAmount("balance overflow on credit".to_string())
                        })?;
                records.push(self.record(movement, &source.account_id, Direction::Debit,
                    movement.total, source.balance, after_debit, &reference, now));
                records.push(self.record(movement, dest_id, Direction::Credit,
                    movement.principal, after_debit, after_credit, &reference, now));
            }
            Some(dest_id) => {
                let dest = self.load_account(dest_id).await?;
                let dest_after = dest.balance.checked_add(movement.principal).ok_or_else(
                    || LedgerError::InvalidAmount("balance overflow on credit".to_string()),
                )?;
                let legs = [
                    DeltaLeg {
                        account_id: source.account_id.clone(),
                        delta: -movement.total.minor(),
                        expected_version: source.version,
                    },
                    DeltaLeg {
                        account_id: dest.account_id.clone(),
                        delta: movement.principal.minor(),
                        expected_version: dest.version,
                    },
                ];
                self.accounts.apply_deltas(&legs).await?;
                records.push(self.record(movement, &source.account_id, Direction::Debit,
                    movement.total, source.balance, after_debit, &reference, now));
                records.push(self.record(movement, dest_id, Direction::Credit,
                    movement.principal, dest.balance, dest_after, &reference, now));
            }
            None => {
                let legs = [DeltaLeg {
                    account_id: source.account_id.clone(),
                    delta: -movement.total.minor(),
                    expected_version: source.version,
                }];
                self.accounts.apply_deltas(&legs).await?;
                records.push(self.record(movement, &source.account_id, Direction::Debit,
                    movement.total, source.balance, after_debit, &reference, now));
            }
        }

        for record in &records {
            self.log.append(record.clone()).await?;
        }
        tracing::info!(
            movement_id = %movement.movement_id,
            %reference,
            kind = ?movement.kind,
            total = %movement.total,
            "movement committed"
        );
        Ok(records)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        movement: &Movement,
        account_id: &AccountId,
        direction: Direction,
        amount: Amount,
        before: Amount,
        after: Amount,
        reference: &str,
        now: chrono::DateTime<Utc>,
    ) -> TransactionRecord {
        TransactionRecord::new(
            movement.movement_id,
            account_id.clone(),
            direction,
            amount,
            before,
            after,
            reference.to_string(),
            now,
        )
    }

    async fn check_limits(&self, source: &Account, movement: &Movement) -> Result<()> {
        let now = Utc::now();
        let today = now.date_naive();
        let day_start = Utc.from_utc_datetime(&today.and_time(NaiveTime::MIN));
        let month_first = today.with_day0(0).unwrap_or(today);
        let month_start = Utc.from_utc_datetime(&month_first.and_time(NaiveTime::MIN));

        let recent = self
            .log
            .list_by_account(
                &source.account_id,
                &HistoryFilter {
                    since: Some(month_start),
                    limit: usize::MAX,
                },
            )
            .await?;

        let mut daily_spent = 0i64;
        let mut monthly_spent = 0i64;
        for record in &recent {
            if record.direction == Direction::Debit {
                monthly_spent += record.amount.minor();
                if record.timestamp >= day_start {
                    daily_spent += record.amount.minor();
                }
            }
        }

        if daily_spent + movement.total.minor() > source.daily_transfer_limit.minor() {
            return Err(LedgerError::LimitExceeded {
                account: source.account_id.to_string(),
                scope: LimitScope::Daily,
                spent: Amount::from_minor(daily_spent),
                limit: source.daily_transfer_limit,
            });
        }
        if monthly_spent + movement.total.minor() > source.monthly_transfer_limit.minor() {
            return Err(LedgerError::LimitExceeded {
                account: source.account_id.to_string(),
                scope: LimitScope::Monthly,
                spent: Amount::from_minor(monthly_spent),
                limit: source.monthly_transfer_limit,
            });
        }
        Ok(())
    }

    async fn load_account(&self, account_id: &AccountId) -> Result<Account> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound {
                account: account_id.to_string(),
            })
    }
}

/// Storage-layer failures mid-commit surface as `CommitFailed`; the atomic
/// apply guarantees no leg was written.
fn as_commit_failure(e: LedgerError) -> LedgerError {
    match e {
        LedgerError::Storage(_) | LedgerError::Serialization(_) => {
            LedgerError::CommitFailed(e.to_string())
        }
        #[cfg(feature = "storage-rocksdb")]
        LedgerError::RocksDb(_) => LedgerError::CommitFailed(e.to_string()),
        other => other,
    }
}
