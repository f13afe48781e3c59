use crate::engine::TransferEngine;
use crate::errors::TransferError;
use crate::models::{AccountId, Amount, Transfer};

/// Request-shape checks that need no storage access.
pub fn validate_request(from: AccountId, to: AccountId, amount: Amount) -> Result<(), TransferError> {
    if amount <= 0 {
        return Err(TransferError::InvalidAmount);
    }
    if from == to {
        return Err(TransferError::SameAccount);
    }
    Ok(())
}

/// Thin front for the engine used by request handlers and drivers
#[derive(Clone)]
pub struct TransferService {
    engine: TransferEngine,
}

impl TransferService {
    pub fn new(engine: TransferEngine) -> Self {
        Self { engine }
    }

    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer, TransferError> {
        validate_request(from, to, amount)?;
        self.engine.execute(from, to, amount).await
    }

    pub async fn balance(&self, id: AccountId) -> Result<Amount, TransferError> {
        self.engine.balance(id).await
    }
}
