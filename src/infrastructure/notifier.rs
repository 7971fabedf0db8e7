use crate::domain::ports::OtpDelivery;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Delivery stub for deployments where the real notification channel is
/// wired up elsewhere. Logs the hand-off, never the code.
#[derive(Default, Clone)]
pub struct NoopDelivery;

impl NoopDelivery {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OtpDelivery for NoopDelivery {
    async fn deliver(&self, movement_id: Uuid, _code: &str) -> Result<()> {
        tracing::debug!(%movement_id, "otp code handed to delivery channel");
        Ok(())
    }
}

/// Captures the last delivered code per movement. Used by tests and local
/// development where no out-of-band channel exists.
#[derive(Default, Clone)]
pub struct MemoryDelivery {
    codes: Arc<RwLock<HashMap<Uuid, String>>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_code(&self, movement_id: Uuid) -> Option<String> {
        let codes = self.codes.read().await;
        codes.get(&movement_id).cloned()
    }
}

#[async_trait]
impl OtpDelivery for MemoryDelivery {
    async fn deliver(&self, movement_id: Uuid, code: &str) -> Result<()> {
        let mut codes = self.codes.write().await;
        codes.insert(movement_id, code.to_string());
        Ok(())
    }
}
