use crate::errors::StoreError;
use crate::journal::Journal;
use crate::models::{Account, AccountId, Amount, NewAccount, Transfer};
use crate::storage::{AccountStore, StoreTransaction};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard, RwLock};

/// In-process store with per-account row locks
///
/// Committed rows live behind a table-level `RwLock`. Each account also has
/// its own `Mutex<()>` which a transaction holds (as an owned guard) from
/// `lock_account` until it commits or is dropped. Writes are staged inside
/// the transaction and published under the table write lock, so readers
/// never observe one side of a transfer without the other.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    accounts: RwLock<BTreeMap<AccountId, Account>>,
    row_locks: RwLock<HashMap<AccountId, Arc<Mutex<()>>>>,
    transfers: RwLock<Vec<Transfer>>,
    next_transfer_id: AtomicI64,
    journal: OnceCell<Journal>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                accounts: RwLock::new(BTreeMap::new()),
                row_locks: RwLock::new(HashMap::new()),
                transfers: RwLock::new(Vec::new()),
                next_transfer_id: AtomicI64::new(1),
                journal: OnceCell::new(),
            }),
        }
    }

    /// Attach a journal, replaying any transfers it already holds on top of
    /// the seeded balances. Returns the number of replayed transfers.
    ///
    /// Replay is all-or-nothing: a journal that does not apply cleanly
    /// leaves the store untouched.
    pub async fn open_journal(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        if self.inner.journal.initialized() {
            return Err(StoreError::Io(std::io::Error::other(
                "journal already attached",
            )));
        }

        let journal = Journal::open(path).await?;
        let entries = journal.replay().await?;

        let mut accounts = self.inner.accounts.write().await;
        let mut ledger = self.inner.transfers.write().await;

        let mut replayed = accounts.clone();
        for t in &entries {
            apply_entry(&mut replayed, t)?;
        }

        let next_id = entries.iter().map(|t| t.id + 1).max().unwrap_or(1);
        self.inner
            .next_transfer_id
            .fetch_max(next_id, Ordering::SeqCst);

        *accounts = replayed;
        let count = entries.len();
        ledger.extend(entries);

        self.inner
            .journal
            .set(journal)
            .map_err(|_| StoreError::Io(std::io::Error::other("journal already attached")))?;

        tracing::info!(replayed = count, "Journal attached");
        Ok(count)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_entry(accounts: &mut BTreeMap<AccountId, Account>, t: &Transfer) -> Result<(), StoreError> {
    let from = accounts
        .get_mut(&t.from_account_id)
        .ok_or(StoreError::RowNotFound(t.from_account_id))?;
    from.balance = from
        .balance
        .checked_sub(t.amount)
        .ok_or(StoreError::Overflow(t.from_account_id))?;
    if from.balance < 0 {
        return Err(StoreError::NegativeBalance(t.from_account_id));
    }

    let to = accounts
        .get_mut(&t.to_account_id)
        .ok_or(StoreError::RowNotFound(t.to_account_id))?;
    to.balance = to
        .balance
        .checked_add(t.amount)
        .ok_or(StoreError::Overflow(t.to_account_id))?;

    Ok(())
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            held: BTreeMap::new(),
            staged: BTreeMap::new(),
            pending: Vec::new(),
            finished: false,
        }))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let accounts = self.inner.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let accounts = self.inner.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }

    async fn transfers(&self) -> Result<Vec<Transfer>, StoreError> {
        let ledger = self.inner.transfers.read().await;
        Ok(ledger.clone())
    }

    async fn seed_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        if account.balance < 0 {
            return Err(StoreError::NegativeBalance(account.id));
        }

        let mut accounts = self.inner.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Err(StoreError::DuplicateAccount(account.id));
        }

        let row = Account {
            id: account.id,
            owner: account.owner,
            balance: account.balance,
            created_at: Utc::now(),
        };
        accounts.insert(row.id, row.clone());

        self.inner
            .row_locks
            .write()
            .await
            .insert(row.id, Arc::new(Mutex::new(())));

        Ok(row)
    }
}

pub struct MemoryTransaction {
    inner: Arc<Inner>,
    held: BTreeMap<AccountId, OwnedMutexGuard<()>>,
    staged: BTreeMap<AccountId, Amount>,
    pending: Vec<Transfer>,
    finished: bool,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_account(&mut self, id: AccountId) -> Result<bool, StoreError> {
        if self.held.contains_key(&id) {
            return Ok(true);
        }

        // Clone the row lock out so the map is not held while waiting
        let row_lock = {
            let locks = self.inner.row_locks.read().await;
            match locks.get(&id) {
                Some(lock) => lock.clone(),
                None => return Ok(false),
            }
        };

        let guard = row_lock.lock_owned().await;
        self.held.insert(id, guard);
        Ok(true)
    }

    async fn balance(&mut self, id: AccountId) -> Result<Option<Amount>, StoreError> {
        if let Some(balance) = self.staged.get(&id) {
            return Ok(Some(*balance));
        }
        let accounts = self.inner.accounts.read().await;
        Ok(accounts.get(&id).map(|a| a.balance))
    }

    async fn adjust_balance(&mut self, id: AccountId, delta: Amount) -> Result<(), StoreError> {
        if !self.held.contains_key(&id) {
            return Err(StoreError::NotLocked(id));
        }

        let current = self.balance(id).await?.ok_or(StoreError::RowNotFound(id))?;
        let updated = current.checked_add(delta).ok_or(StoreError::Overflow(id))?;
        if updated < 0 {
            return Err(StoreError::NegativeBalance(id));
        }

        self.staged.insert(id, updated);
        Ok(())
    }

    async fn insert_transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<Transfer, StoreError> {
        {
            let accounts = self.inner.accounts.read().await;
            for id in [from, to] {
                if !accounts.contains_key(&id) {
                    return Err(StoreError::RowNotFound(id));
                }
            }
        }

        let transfer = Transfer {
            id: self.inner.next_transfer_id.fetch_add(1, Ordering::SeqCst),
            from_account_id: from,
            to_account_id: to,
            amount,
            created_at: Utc::now(),
        };
        self.pending.push(transfer.clone());
        Ok(transfer)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.finished = true;

        let inner = this.inner.clone();
        let held = std::mem::take(&mut this.held);
        let staged = std::mem::take(&mut this.staged);
        let pending = std::mem::take(&mut this.pending);

        // The append and the publish run as one detached task; a caller
        // dropped mid-commit cannot leave a journal line without its rows
        let task = tokio::spawn(async move {
            let result = publish(&inner, staged, pending).await;
            drop(held);
            result
        });
        task.await?
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.finished = true;
        tracing::debug!(locks = this.held.len(), "Transaction rolled back");
        Ok(())
    }
}

/// Append to the journal, then make the staged rows visible. Row locks are
/// still held by the caller.
async fn publish(
    inner: &Inner,
    staged: BTreeMap<AccountId, Amount>,
    mut pending: Vec<Transfer>,
) -> Result<(), StoreError> {
    let journaled = match inner.journal.get() {
        Some(journal) if !pending.is_empty() => Some((journal, Journal::encode(&pending))),
        _ => None,
    };

    let mut accounts = inner.accounts.write().await;
    let mut ledger = inner.transfers.write().await;

    // Journal first: a failed append leaves nothing visible
    if let Some((journal, lines)) = journaled {
        journal.append(&lines).await?;
    }

    for (id, balance) in staged {
        if let Some(account) = accounts.get_mut(&id) {
            account.balance = balance;
        }
    }
    ledger.append(&mut pending);

    Ok(())
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.held.is_empty() {
            tracing::debug!(
                locks = self.held.len(),
                staged = self.staged.len(),
                "Uncommitted transaction dropped, rolling back"
            );
        }
    }
}
