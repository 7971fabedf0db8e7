use fundflow::application::orchestrator::{
    MovementOrchestrator, MovementRequest, OpenAccountRequest, Receipt,
};
use fundflow::application::otp::OtpConfig;
use fundflow::domain::account::{Account, AccountId, Amount};
use fundflow::domain::movement::{Movement, MovementKind, WithdrawChannel};
use fundflow::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryChallengeStore, InMemoryMovementStore, InMemoryTransactionLog,
};
use fundflow::infrastructure::notifier::MemoryDelivery;
use std::sync::Arc;
use uuid::Uuid;

pub struct TestLedger {
    pub orchestrator: Arc<MovementOrchestrator>,
    pub delivery: Arc<MemoryDelivery>,
    pub accounts: Arc<InMemoryAccountStore>,
}

pub fn ledger() -> TestLedger {
    ledger_with_otp(OtpConfig::default())
}

pub fn ledger_with_otp(config: OtpConfig) -> TestLedger {
    let accounts = Arc::new(InMemoryAccountStore::new());
    let delivery = Arc::new(MemoryDelivery::new());
    let orchestrator = Arc::new(MovementOrchestrator::with_otp_config(
        accounts.clone(),
        Arc::new(InMemoryMovementStore::new()),
        Arc::new(InMemoryChallengeStore::new()),
        Arc::new(InMemoryTransactionLog::new()),
        delivery.clone(),
        config,
    ));
    TestLedger {
        orchestrator,
        delivery,
        accounts,
    }
}

impl TestLedger {
    pub async fn open_account(&self, owner: &str, balance: i64) -> Account {
        self.orchestrator
            .open_account(OpenAccountRequest {
                owner_id: owner.to_string(),
                initial_balance: Amount::from_minor(balance),
                daily_transfer_limit: None,
                monthly_transfer_limit: None,
            })
            .await
            .expect("failed to open account")
    }

    pub async fn request(
        &self,
        kind: MovementKind,
        channel: Option<WithdrawChannel>,
        source: &AccountId,
        destination: Option<&AccountId>,
        principal: i64,
    ) -> Movement {
        self.orchestrator
            .request_movement(MovementRequest {
                movement_id: Uuid::new_v4(),
                kind,
                channel,
                source_account_id: source.clone(),
                destination_account_id: destination.cloned(),
                principal: Amount::from_minor(principal),
            })
            .await
            .expect("failed to request movement")
    }

    pub async fn code_for(&self, movement_id: Uuid) -> String {
        self.delivery
            .last_code(movement_id)
            .await
            .expect("no otp code delivered")
    }

    pub async fn confirm(&self, movement_id: Uuid) -> Receipt {
        let code = self.code_for(movement_id).await;
        self.orchestrator
            .confirm_movement(movement_id, &code)
            .await
            .expect("failed to confirm movement")
    }

    pub async fn balance_of(&self, account_id: &AccountId) -> Amount {
        self.orchestrator
            .account(account_id)
            .await
            .expect("account missing")
            .balance
    }
}

/// A wrong code differing from the delivered one.
pub fn wrong_code(code: &str) -> &'static str {
    if code == "000000" { "000001" } else { "000000" }
}
