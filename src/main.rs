use anyhow::Result;
use clap::Parser;
use ledger_engine::config::{open_store, EngineArgs, StoreArgs};
use ledger_engine::memory_store::MemoryStore;
use ledger_engine::models::NewAccount;
use ledger_engine::storage::AccountStore;
use ledger_engine::stress::{self, StressConfig};
use ledger_engine::{cli, server, TransferEngine, TransferService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledger-engine")]
#[command(about = "Move funds between accounts without deadlocks or partial updates")]
enum Cli {
    /// Apply a CSV batch of transfers and print final balances
    #[command(name = "cli")]
    CliMode {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        engine: EngineArgs,
        /// Transfer file (from,to,amount)
        #[arg(long)]
        transfers: PathBuf,
    },
    /// Run HTTP server
    #[command(name = "server")]
    Server {
        #[arg(long, default_value = "0.0.0.0:8080", env = "LEDGER_BIND")]
        bind: String,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run concurrent transfers in both directions between two accounts
    #[command(name = "stress")]
    Stress {
        #[arg(long, default_value = "50")]
        workers: usize,
        #[arg(long, default_value = "20")]
        transfers_per_worker: usize,
        #[arg(long, default_value = "10")]
        amount: i64,
        /// Opening balance of the first account when no store is configured
        #[arg(long, default_value = "10000")]
        opening_balance: i64,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse() {
        Cli::CliMode {
            store,
            engine,
            transfers,
        } => {
            // CLI mode, no logging for clean stdout
            let summary = cli::run(store, engine, transfers).await?;
            eprintln!(
                "applied={} rejected={} unparsable={}",
                summary.applied, summary.rejected, summary.unparsable
            );
        }
        Cli::Server {
            bind,
            store,
            engine,
        } => {
            init_logging();
            server::run(bind, store, engine).await?;
        }
        Cli::Stress {
            workers,
            transfers_per_worker,
            amount,
            opening_balance,
            store,
            engine,
        } => {
            init_logging();

            let store: Arc<dyn AccountStore> =
                if store.database_url.is_some() || store.accounts.is_some() {
                    open_store(&store).await?
                } else {
                    let memory = MemoryStore::new();
                    for (id, balance) in [(1, opening_balance), (2, 0)] {
                        memory
                            .seed_account(NewAccount {
                                id,
                                owner: format!("stress-{}", id),
                                balance,
                            })
                            .await?;
                    }
                    Arc::new(memory)
                };

            let service = Arc::new(TransferService::new(TransferEngine::with_config(
                store,
                engine.config(),
            )));
            let config = StressConfig {
                workers,
                transfers_per_worker,
                amount,
                ..StressConfig::default()
            };

            let report = stress::run(service, config).await?;
            println!(
                "completed={} rejected={} failed={} elapsed_ms={} total={}",
                report.completed,
                report.rejected,
                report.failed,
                report.elapsed.as_millis(),
                report.total_after
            );
        }
    }

    Ok(())
}
