use crate::domain::account::Amount;
use crate::domain::movement::{MovementKind, WithdrawChannel};
use crate::error::{LedgerError, Result};

const PERCENT_FEE_BPS: i64 = 100; // 1%

const DEPOSIT_FEE_MIN: Amount = Amount::from_minor(15_00);
const DEPOSIT_FEE_MAX: Amount = Amount::from_minor(50_00);
const WITHDRAW_FEE_PARTNER: Amount = Amount::from_minor(20_00);
const WITHDRAW_FEE_ATM: Amount = Amount::from_minor(15_00);

/// Per-kind fee rules and per-transaction amount bounds, centralized in one
/// table instead of being re-derived at every call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeSchedule;

impl FeeSchedule {
    /// Fee for moving `principal` under the given kind. Withdrawals charge
    /// a flat fee by channel; deposits a clamped percentage; bill payments
    /// and load purchases an unclamped percentage. In-bank transfers and
    /// loan repayments are free.
    pub fn quote(
        &self,
        kind: MovementKind,
        channel: Option<WithdrawChannel>,
        principal: Amount,
    ) -> Amount {
        match kind {
            MovementKind::Deposit => principal
                .basis_points(PERCENT_FEE_BPS)
                .clamp(DEPOSIT_FEE_MIN, DEPOSIT_FEE_MAX),
            MovementKind::Withdraw => match channel.unwrap_or_default() {
                WithdrawChannel::Partner => WITHDRAW_FEE_PARTNER,
                WithdrawChannel::Atm => WITHDRAW_FEE_ATM,
            },
            MovementKind::BillPayment | MovementKind::LoadPurchase => {
                principal.basis_points(PERCENT_FEE_BPS)
            }
            MovementKind::Transfer | MovementKind::LoanRepayment => Amount::ZERO,
        }
    }

    /// Inclusive per-transaction principal bounds for a kind.
    pub fn bounds(&self, kind: MovementKind) -> (Amount, Amount) {
        let (min, max) = match kind {
            MovementKind::Transfer => (1_00, 100_000_00),
            MovementKind::Deposit => (100_00, 50_000_00),
            MovementKind::Withdraw => (100_00, 20_000_00),
            MovementKind::BillPayment => (1_00, 50_000_00),
            MovementKind::LoadPurchase => (10_00, 10_000_00),
            MovementKind::LoanRepayment => (1_00, 1_000_000_00),
        };
        (Amount::from_minor(min), Amount::from_minor(max))
    }

    pub fn check_bounds(&self, kind: MovementKind, principal: Amount) -> Result<()> {
        let (min, max) = self.bounds(kind);
        if principal < min || principal > max {
            return Err(LedgerError::InvalidAmount(format!(
                "{kind:?} principal {principal} outside allowed range {min}..={max}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_fee_clamped() {
        let fees = FeeSchedule;
        // 1% of 500.00 is 5.00, floored at 15.00
        assert_eq!(
            fees.quote(MovementKind::Deposit, None, Amount::from_minor(500_00)),
            Amount::from_minor(15_00)
        );
        // 1% of 3,000.00 is 30.00, inside the clamp
        assert_eq!(
            fees.quote(MovementKind::Deposit, None, Amount::from_minor(3_000_00)),
            Amount::from_minor(30_00)
        );
        // 1% of 10,000.00 is 100.00, capped at 50.00
        assert_eq!(
            fees.quote(MovementKind::Deposit, None, Amount::from_minor(10_000_00)),
            Amount::from_minor(50_00)
        );
    }

    #[test]
    fn test_withdraw_fee_by_channel() {
        let fees = FeeSchedule;
        assert_eq!(
            fees.quote(
                MovementKind::Withdraw,
                Some(WithdrawChannel::Partner),
                Amount::from_minor(100_00)
            ),
            Amount::from_minor(20_00)
        );
        assert_eq!(
            fees.quote(
                MovementKind::Withdraw,
                Some(WithdrawChannel::Atm),
                Amount::from_minor(100_00)
            ),
            Amount::from_minor(15_00)
        );
        // channel defaults to partner
        assert_eq!(
            fees.quote(MovementKind::Withdraw, None, Amount::from_minor(100_00)),
            Amount::from_minor(20_00)
        );
    }

    #[test]
    fn test_percentage_fee_unclamped() {
        let fees = FeeSchedule;
        assert_eq!(
            fees.quote(
                MovementKind::BillPayment,
                None,
                Amount::from_minor(20_000_00)
            ),
            Amount::from_minor(200_00)
        );
        assert_eq!(
            fees.quote(MovementKind::LoadPurchase, None, Amount::from_minor(50_00)),
            Amount::from_minor(50)
        );
    }

    #[test]
    fn test_free_kinds() {
        let fees = FeeSchedule;
        assert_eq!(
            fees.quote(MovementKind::Transfer, None, Amount::from_minor(1_000_00)),
            Amount::ZERO
        );
        assert_eq!(
            fees.quote(
                MovementKind::LoanRepayment,
                None,
                Amount::from_minor(1_000_00)
            ),
            Amount::ZERO
        );
    }

    #[test]
    fn test_bounds_per_kind() {
        let fees = FeeSchedule;
        assert!(
            fees.check_bounds(MovementKind::Deposit, Amount::from_minor(100_00))
                .is_ok()
        );
        assert!(
            fees.check_bounds(MovementKind::Deposit, Amount::from_minor(99_99))
                .is_err()
        );
        assert!(
            fees.check_bounds(MovementKind::Deposit, Amount::from_minor(50_000_01))
                .is_err()
        );
        assert!(
            fees.check_bounds(MovementKind::Withdraw, Amount::from_minor(20_000_00))
                .is_ok()
        );
        assert!(
            fees.check_bounds(MovementKind::Withdraw, Amount::from_minor(20_000_01))
                .is_err()
        );
    }
}
