use crate::domain::account::{AccountId, Amount};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Transfer,
    Deposit,
    Withdraw,
    BillPayment,
    LoadPurchase,
    LoanRepayment,
}

impl MovementKind {
    /// Short code used in human-facing transaction references.
    pub fn code(&self) -> &'static str {
        match self {
            MovementKind::Transfer => "TRANSFER",
            MovementKind::Deposit => "DEPOSIT",
            MovementKind::Withdraw => "WITHDRAW",
            MovementKind::BillPayment => "BILLPAY",
            MovementKind::LoadPurchase => "LOAD",
            MovementKind::LoanRepayment => "LOAN",
        }
    }
}

/// Channel a withdrawal is served through. Selects the flat fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawChannel {
    #[default]
    Partner,
    Atm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    Created,
    OtpPending,
    OtpVerified,
    Committed,
    Failed,
    Expired,
}

impl MovementStatus {
    /// Transitions are forward-only; the only backward-looking moves are
    /// into `Failed`/`Expired` from a pre-committed state.
    pub fn can_transition_to(&self, next: MovementStatus) -> bool {
        use MovementStatus::*;
        match (self, next) {
            (Created, OtpPending) => true,
            (OtpPending, OtpVerified) => true,
            (OtpVerified, Committed) => true,
            (Created | OtpPending | OtpVerified, Failed | Expired) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Created => "created",
            MovementStatus::OtpPending => "otp_pending",
            MovementStatus::OtpVerified => "otp_verified",
            MovementStatus::Committed => "committed",
            MovementStatus::Failed => "failed",
            MovementStatus::Expired => "expired",
        }
    }
}

/// A requested funds movement, pending or settled.
///
/// `movement_id` doubles as the caller-supplied idempotency key. `total` is
/// computed once at creation and never recomputed afterwards, so the amount
/// the OTP challenge was issued for is the amount that commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub movement_id: Uuid,
    pub kind: MovementKind,
    pub channel: Option<WithdrawChannel>,
    pub source_account_id: AccountId,
    pub destination_account_id: Option<AccountId>,
    pub principal: Amount,
    pub fee: Amount,
    pub total: Amount,
    pub status: MovementStatus,
    pub created_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

impl Movement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        movement_id: Uuid,
        kind: MovementKind,
        channel: Option<WithdrawChannel>,
        source_account_id: AccountId,
        destination_account_id: Option<AccountId>,
        principal: Amount,
        fee: Amount,
    ) -> Result<Self> {
        let total = principal.checked_add(fee).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("principal {principal} + fee {fee} overflows"))
        })?;
        Ok(Self {
            movement_id,
            kind,
            channel,
            source_account_id,
            destination_account_id,
            principal,
            fee,
            total,
            status: MovementStatus::Created,
            created_at: Utc::now(),
            committed_at: None,
        })
    }
}
