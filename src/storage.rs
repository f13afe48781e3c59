use crate::errors::StoreError;
use crate::models::{Account, AccountId, Amount, NewAccount, Transfer};
use async_trait::async_trait;

/// Trait for account/ledger storage backends
///
/// The store is a passive persistence surface. Balances and ledger rows are
/// only ever written through a [`StoreTransaction`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Last committed state of one account, without taking any lock
    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Consistent snapshot of all accounts, sorted by id
    async fn accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Committed ledger entries in commit order
    async fn transfers(&self) -> Result<Vec<Transfer>, StoreError>;

    /// Out-of-band provisioning (seed/migration), not part of the transfer protocol
    async fn seed_account(&self, account: NewAccount) -> Result<Account, StoreError>;
}

/// One open unit of work against an [`AccountStore`].
///
/// Dropping a transaction without calling [`StoreTransaction::commit`] rolls
/// it back and releases every row lock it holds. This also covers a future
/// that is cancelled while suspended inside the transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Exclusive row lock, blocking until the current holder finishes.
    /// Returns `false` if the account does not exist.
    async fn lock_account(&mut self, id: AccountId) -> Result<bool, StoreError>;

    /// Balance as seen by this transaction, including its own writes
    async fn balance(&mut self, id: AccountId) -> Result<Option<Amount>, StoreError>;

    async fn adjust_balance(&mut self, id: AccountId, delta: Amount) -> Result<(), StoreError>;

    async fn insert_transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
