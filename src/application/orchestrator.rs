use crate::application::engine::LedgerEngine;
use crate::application::otp::{OtpConfig, OtpManager};
use crate::domain::account::{Account, AccountId, Amount};
use crate::domain::challenge::OtpChallenge;
use crate::domain::movement::{Movement, MovementKind, MovementStatus, WithdrawChannel};
use crate::domain::ports::{
    AccountStoreRef, ChallengeStoreRef, HistoryFilter, MovementStoreRef, OtpDeliveryRef,
    TransactionLogRef,
};
use crate::domain::record::TransactionRecord;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A movement request as submitted by the caller. `movement_id` is the
/// idempotency key: resubmitting it returns the stored movement.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub movement_id: Uuid,
    pub kind: MovementKind,
    pub channel: Option<WithdrawChannel>,
    pub source_account_id: AccountId,
    pub destination_account_id: Option<AccountId>,
    pub principal: Amount,
}

#[derive(Debug, Clone)]
pub struct OpenAccountRequest {
    pub owner_id: String,
    pub initial_balance: Amount,
    pub daily_transfer_limit: Option<Amount>,
    pub monthly_transfer_limit: Option<Amount>,
}

/// Returned to the caller once a movement commits.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub movement_id: Uuid,
    pub reference: String,
    pub kind: MovementKind,
    pub principal: Amount,
    pub fee: Amount,
    pub total: Amount,
    pub source_balance_after: Amount,
    pub destination_balance_after: Option<Amount>,
    pub committed_at: DateTime<Utc>,
}

/// Drives a movement end to end: validate -> pending -> OTP challenge ->
/// verified -> atomic commit -> receipt. Composes the ledger engine, the
/// OTP manager, and the stores; owns the movement state machine.
pub struct MovementOrchestrator {
    accounts: AccountStoreRef,
    movements: MovementStoreRef,
    log: TransactionLogRef,
    engine: LedgerEngine,
    otp: OtpManager,
}

impl MovementOrchestrator {
    pub fn new(
        accounts: AccountStoreRef,
        movements: MovementStoreRef,
        challenges: ChallengeStoreRef,
        log: TransactionLogRef,
        delivery: OtpDeliveryRef,
    ) -> Self {
        Self::with_otp_config(
            accounts,
            movements,
            challenges,
            log,
            delivery,
            OtpConfig::default(),
        )
    }

    pub fn with_otp_config(
        accounts: AccountStoreRef,
        movements: MovementStoreRef,
        challenges: ChallengeStoreRef,
        log: TransactionLogRef,
        delivery: OtpDeliveryRef,
        otp_config: OtpConfig,
    ) -> Self {
        let engine = LedgerEngine::new(accounts.clone(), log.clone());
        let otp = OtpManager::with_config(challenges, delivery, otp_config);
        Self {
            accounts,
            movements,
            log,
            engine,
            otp,
        }
    }

    pub async fn open_account(&self, req: OpenAccountRequest) -> Result<Account> {
        let account_id = AccountId::new(format!(
            "ACC-{}",
            Uuid::new_v4().simple().to_string()[..10].to_uppercase()
        ));
        let mut account =
            Account::new(account_id, req.owner_id).with_balance(req.initial_balance);
        if let Some(daily) = req.daily_transfer_limit {
            account.daily_transfer_limit = daily;
        }
        if let Some(monthly) = req.monthly_transfer_limit {
            account.monthly_transfer_limit = monthly;
        }
        self.accounts.insert(account.clone()).await?;
        tracing::info!(account_id = %account.account_id, owner_id = %account.owner_id, "opened account");
        Ok(account)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.all_accounts().await
    }

    pub async fn account(&self, account_id: &AccountId) -> Result<Account> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound {
                account: account_id.to_string(),
            })
    }

    pub async fn movement(&self, movement_id: Uuid) -> Result<Movement> {
        self.movements
            .get(movement_id)
            .await?
            .ok_or(LedgerError::MovementNotFound {
                movement: movement_id,
            })
    }

    /// Validate the request, persist the movement, and gate it behind a
    /// fresh OTP challenge. Validation failures reach the caller before
    /// anything persists.
    pub async fn request_movement(&self, req: MovementRequest) -> Result<Movement> {
        if let Some(existing) = self.movements.get(req.movement_id).await? {
            tracing::debug!(
                movement_id = %req.movement_id,
                "duplicate request, returning stored movement"
            );
            return Ok(existing);
        }

        if req.kind == MovementKind::Transfer {
            match &req.destination_account_id {
                None => {
                    return Err(LedgerError::Validation(
                        "transfer requires a destination account".to_string(),
                    ));
                }
                Some(dest) if *dest == req.source_account_id => {
                    return Err(LedgerError::Validation(
                        "transfer destination must differ from source".to_string(),
                    ));
                }
                _ => {}
            }
        }

        let fee = self.engine.quote(req.kind, req.channel, req.principal);
        let movement = Movement::new(
            req.movement_id,
            req.kind,
            req.channel,
            req.source_account_id,
            req.destination_account_id,
            req.principal,
            fee,
        )?;
        self.engine.validate(&movement).await?;

        if !self.movements.insert(movement.clone()).await? {
            // lost a race against the same idempotency key
            return self.movement(req.movement_id).await;
        }
        self.otp.issue(movement.movement_id).await?;
        let movement = self
            .movements
            .transition(
                movement.movement_id,
                MovementStatus::Created,
                MovementStatus::OtpPending,
            )
            .await?;
        tracing::info!(
            movement_id = %movement.movement_id,
            kind = ?movement.kind,
            total = %movement.total,
            "movement awaiting otp"
        );
        Ok(movement)
    }

    /// Verify the submitted code and, on success, commit the movement and
    /// return its receipt. Retryable OTP failures leave the movement
    /// `OtpPending`; expiry and exhaustion are terminal for it.
    pub async fn confirm_movement(&self, movement_id: Uuid, submitted_code: &str) -> Result<Receipt> {
        let movement = self.movement(movement_id).await?;
        match movement.status {
            MovementStatus::OtpPending => {
                if let Err(e) = self.otp.verify(movement_id, submitted_code).await {
                    return Err(self.fail_on_terminal_otp(movement_id, e).await);
                }
                let movement = self
                    .movements
                    .transition(
                        movement_id,
                        MovementStatus::OtpPending,
                        MovementStatus::OtpVerified,
                    )
                    .await?;
                self.commit_verified(movement).await
            }
            // A crash between commit and the status flip leaves the
            // movement verified; re-entering the idempotent commit
            // finishes the job without a second OTP.
            MovementStatus::OtpVerified => self.commit_verified(movement).await,
            MovementStatus::Committed => Err(LedgerError::OtpAlreadyUsed),
            MovementStatus::Expired => Err(LedgerError::OtpExpired),
            MovementStatus::Failed | MovementStatus::Created => {
                Err(LedgerError::InvalidTransition {
                    entity: "movement",
                    id: movement_id,
                    from: movement.status.as_str().to_string(),
                    to: MovementStatus::Committed.as_str().to_string(),
                })
            }
        }
    }

    pub async fn resend_otp(&self, movement_id: Uuid) -> Result<OtpChallenge> {
        let movement = self.movement(movement_id).await?;
        if movement.status != MovementStatus::OtpPending {
            return Err(LedgerError::InvalidTransition {
                entity: "movement",
                id: movement_id,
                from: movement.status.as_str().to_string(),
                to: MovementStatus::OtpPending.as_str().to_string(),
            });
        }
        self.otp.resend(movement_id).await
    }

    pub async fn transactions(
        &self,
        account_id: &AccountId,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>> {
        self.account(account_id).await?;
        self.log.list_by_account(account_id, filter).await
    }

    /// Background sweep: movements stuck in `OtpPending` whose challenge
    /// clock ran out move to `Expired`. Returns how many were expired.
    pub async fn expire_stale(&self) -> Result<usize> {
        let pending = self
            .movements
            .list_by_status(MovementStatus::OtpPending)
            .await?;
        let mut expired = 0usize;
        for movement in pending {
            if self.otp.expire_if_stale(movement.movement_id).await?
                && self
                    .movements
                    .transition(
                        movement.movement_id,
                        MovementStatus::OtpPending,
                        MovementStatus::Expired,
                    )
                    .await
                    .is_ok()
            {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired stale movements");
        }
        Ok(expired)
    }

    async fn fail_on_terminal_otp(&self, movement_id: Uuid, err: LedgerError) -> LedgerError {
        match &err {
            LedgerError::OtpExpired => {
                let _ = self
                    .movements
                    .transition(
                        movement_id,
                        MovementStatus::OtpPending,
                        MovementStatus::Expired,
                    )
                    .await;
                tracing::info!(%movement_id, "movement expired: otp challenge timed out");
            }
            LedgerError::OtpExhausted => {
                let _ = self
                    .movements
                    .transition(
                        movement_id,
                        MovementStatus::OtpPending,
                        MovementStatus::Failed,
                    )
                    .await;
                tracing::warn!(%movement_id, "movement failed: otp challenge exhausted");
            }
            _ => {}
        }
        err
    }

    async fn commit_verified(&self, movement: Movement) -> Result<Receipt> {
        match self.engine.commit(&movement).await {
            Ok(records) => {
                let movement = match self
                    .movements
                    .transition(
                        movement.movement_id,
                        MovementStatus::OtpVerified,
                        MovementStatus::Committed,
                    )
                    .await
                {
                    Ok(m) => m,
                    // a concurrent retry already flipped it
                    Err(_) => self.movement(movement.movement_id).await?,
                };
                Ok(build_receipt(&movement, &records))
            }
            Err(e) => {
                tracing::warn!(
                    movement_id = %movement.movement_id,
                    error = %e,
                    "commit failed, no balances changed"
                );
                let _ = self
                    .movements
                    .transition(
                        movement.movement_id,
                        MovementStatus::OtpVerified,
                        MovementStatus::Failed,
                    )
                    .await;
                Err(e)
            }
        }
    }
}

fn build_receipt(movement: &Movement, records: &[TransactionRecord]) -> Receipt {
    let mut source_balance_after = Amount::ZERO;
    let mut destination_balance_after = None;
    let mut reference = String::new();
    for record in records {
        if reference.is_empty() {
            reference = record.reference.clone();
        }
        // the last record touching an account carries its final balance
        if record.account_id == movement.source_account_id {
            source_balance_after = record.balance_after;
        }
        if let Some(dest) = &movement.destination_account_id
            && record.account_id == *dest
            && record.direction == crate::domain::record::Direction::Credit
        {
            destination_balance_after = Some(record.balance_after);
        }
    }
    Receipt {
        movement_id: movement.movement_id,
        reference,
        kind: movement.kind,
        principal: movement.principal,
        fee: movement.fee,
        total: movement.total,
        source_balance_after,
        destination_balance_after,
        committed_at: movement.committed_at.unwrap_or_else(Utc::now),
    }
}
