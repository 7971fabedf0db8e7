use crate::domain::account::{AccountId, Amount};
use crate::domain::movement::MovementKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Completed,
    /// Set by a later, explicitly linked reversal movement. Records are
    /// never edited; a reversal is new ledger history.
    Reversed,
}

/// An immutable ledger entry. Two are written per two-sided movement (one
/// debit, one credit), one for movements with an external counterparty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub record_id: Uuid,
    pub movement_id: Uuid,
    pub account_id: AccountId,
    pub direction: Direction,
    pub amount: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
    pub status: RecordStatus,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        movement_id: Uuid,
        account_id: AccountId,
        direction: Direction,
        amount: Amount,
        balance_before: Amount,
        balance_after: Amount,
        reference: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            movement_id,
            account_id,
            direction,
            amount,
            balance_before,
            balance_after,
            reference,
            timestamp,
            status: RecordStatus::Completed,
        }
    }
}

/// Human-facing reference shared by all records of one movement,
/// e.g. `TXN_DEPOSIT_1754377200123_A1B2C3`.
pub fn movement_reference(kind: MovementKind, movement_id: Uuid, at: DateTime<Utc>) -> String {
    let suffix = movement_id.simple().to_string()[..6].to_uppercase();
    format!("TXN_{}_{}_{}", kind.code(), at.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_format() {
        let id = Uuid::new_v4();
        let reference = movement_reference(MovementKind::Deposit, id, Utc::now());
        assert!(reference.starts_with("TXN_DEPOSIT_"));
        let suffix = reference.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 6);
    }

    #[test]
    fn test_reference_stable_per_movement() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        assert_eq!(
            movement_reference(MovementKind::Withdraw, id, at),
            movement_reference(MovementKind::Withdraw, id, at)
        );
    }

    #[test]
    fn test_new_record_is_completed() {
        let record = TransactionRecord::new(
            Uuid::new_v4(),
            AccountId::from("ACC-1"),
            Direction::Debit,
            Amount::from_minor(100_00),
            Amount::from_minor(500_00),
            Amount::from_minor(400_00),
            "TXN_WITHDRAW_0_ABCDEF".to_string(),
            Utc::now(),
        );
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.balance_after, Amount::from_minor(400_00));
    }
}
