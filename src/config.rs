use crate::csv_io::stream_accounts;
use crate::engine::EngineConfig;
use crate::errors::StoreError;
use crate::memory_store::MemoryStore;
use crate::pg_store::PgStore;
use crate::storage::AccountStore;
use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::BufReader;

/// Where accounts and the ledger live
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Account seed file (id,owner,balance)
    #[arg(long, env = "LEDGER_ACCOUNTS")]
    pub accounts: Option<PathBuf>,
    /// Append-only journal for the in-memory store
    #[arg(long, env = "LEDGER_JOURNAL")]
    pub journal: Option<PathBuf>,
    /// Use PostgreSQL instead of the in-memory store
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Abort a transfer that has not committed within this many milliseconds
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS")]
    pub lock_timeout_ms: Option<u64>,
}

impl EngineArgs {
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            lock_timeout: self.lock_timeout_ms.map(Duration::from_millis),
        }
    }
}

pub async fn open_store(args: &StoreArgs) -> Result<Arc<dyn AccountStore>> {
    if let Some(url) = &args.database_url {
        let store = PgStore::connect(url, args.max_connections)
            .await
            .context("connecting to PostgreSQL")?;
        store.migrate().await.context("creating schema")?;
        if let Some(path) = &args.accounts {
            seed_from_csv(&store, path).await?;
        }
        return Ok(Arc::new(store));
    }

    let store = MemoryStore::new();
    if let Some(path) = &args.accounts {
        seed_from_csv(&store, path).await?;
    }
    if let Some(path) = &args.journal {
        store
            .open_journal(path)
            .await
            .with_context(|| format!("replaying journal {}", path.display()))?;
    }
    Ok(Arc::new(store))
}

/// Seed accounts from a CSV file. Accounts that already exist are kept as
/// they are, so re-running against a persistent store is harmless.
pub async fn seed_from_csv(store: &dyn AccountStore, path: &Path) -> Result<usize> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening account seed file {}", path.display()))?;
    let mut rows = stream_accounts(BufReader::new(file));

    let mut seeded = 0;
    while let Some(row) = rows.next().await {
        let account = row.with_context(|| format!("parsing {}", path.display()))?;
        let id = account.id;
        match store.seed_account(account).await {
            Ok(_) => seeded += 1,
            Err(StoreError::DuplicateAccount(_)) => {
                tracing::warn!(account = id, "Account already exists, keeping stored balance");
            }
            Err(e) => return Err(e).with_context(|| format!("seeding account {}", id)),
        }
    }

    tracing::info!(seeded, "Accounts seeded");
    Ok(seeded)
}
