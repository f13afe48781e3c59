use crate::errors::{StoreError, TransferError};
use crate::models::{AccountId, Amount, Transfer};
use crate::service::validate_request;
use crate::storage::{AccountStore, StoreTransaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    /// Limit on opening the transaction and acquiring both row locks.
    /// Once commit has started it runs to completion.
    pub lock_timeout: Option<Duration>,
}

/// Executes transfers as single all-or-nothing units of work.
///
/// The engine is the only writer of balances and ledger rows. Each call
/// opens its own store transaction, which is rolled back on every exit path
/// that does not reach commit.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn AccountStore>,
    config: EngineConfig,
}

/// Order in which two accounts are locked: lower id first.
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl TransferEngine {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn AccountStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub async fn execute(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer, TransferError> {
        validate_request(from, to, amount)?;

        let result = self.run(from, to, amount).await;

        match &result {
            Ok(transfer) => info!(
                transfer_id = transfer.id,
                from, to, amount, "Transfer committed"
            ),
            Err(TransferError::Internal(e)) => error!(
                from, to, amount,
                error = %e,
                "Transfer aborted by storage failure"
            ),
            Err(e) => debug!(from, to, amount, reason = %e, "Transfer rejected"),
        }

        result
    }

    async fn run(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer, TransferError> {
        let mut tx = match self.config.lock_timeout {
            // Dropping the timed-out future drops its transaction, which rolls back
            Some(limit) => tokio::time::timeout(limit, self.acquire(from, to))
                .await
                .unwrap_or_else(|_| Err(TransferError::Internal(StoreError::Timeout(limit))))?,
            None => self.acquire(from, to).await?,
        };

        // Read only after both locks are held
        let balance = match tx.balance(from).await? {
            Some(balance) => balance,
            None => return Err(reject(tx, TransferError::AccountNotFound(from)).await),
        };
        if balance < amount {
            return Err(reject(tx, TransferError::InsufficientFunds).await);
        }

        tx.adjust_balance(from, -amount).await?;
        tx.adjust_balance(to, amount).await?;
        let transfer = tx.insert_transfer(from, to, amount).await?;

        tx.commit().await?;
        Ok(transfer)
    }

    /// Open a transaction holding both row locks, lower id first
    async fn acquire(
        &self,
        from: AccountId,
        to: AccountId,
    ) -> Result<Box<dyn StoreTransaction>, TransferError> {
        let mut tx = self.store.begin().await?;

        let (first, second) = lock_order(from, to);
        lock(&mut tx, first).await?;
        lock(&mut tx, second).await?;

        Ok(tx)
    }

    /// Committed balance of one account; not linked to any transfer.
    pub async fn balance(&self, id: AccountId) -> Result<Amount, TransferError> {
        match self.store.account(id).await {
            Ok(Some(account)) => Ok(account.balance),
            Ok(None) => Err(TransferError::AccountNotFound(id)),
            Err(e) => {
                error!(account = id, error = %e, "Balance lookup failed");
                Err(TransferError::Internal(e))
            }
        }
    }
}

async fn lock(tx: &mut Box<dyn StoreTransaction>, id: AccountId) -> Result<(), TransferError> {
    if tx.lock_account(id).await? {
        Ok(())
    } else {
        Err(TransferError::AccountNotFound(id))
    }
}

/// Roll back a transaction that hit a business rejection
async fn reject(tx: Box<dyn StoreTransaction>, err: TransferError) -> TransferError {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Explicit rollback failed, transaction dropped instead");
    }
    err
}
