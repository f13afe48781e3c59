use crate::config::{open_store, EngineArgs, StoreArgs};
use crate::csv_io::{stream_transfers, write_balances};
use crate::engine::TransferEngine;
use crate::models::BalanceOutput;
use crate::service::TransferService;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::BufReader;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub applied: usize,
    pub rejected: usize,
    pub unparsable: usize,
}

/// Apply a transfer batch file in order and print final balances to stdout.
pub async fn run(store_args: StoreArgs, engine_args: EngineArgs, transfers: PathBuf) -> Result<BatchSummary> {
    let store = open_store(&store_args).await?;
    let service = TransferService::new(TransferEngine::with_config(store.clone(), engine_args.config()));

    let file = File::open(&transfers)
        .await
        .with_context(|| format!("opening transfer file {}", transfers.display()))?;
    let mut stream = stream_transfers(BufReader::new(file));

    let mut summary = BatchSummary::default();
    while let Some(result) = stream.next().await {
        match result {
            Ok(req) => match service.transfer(req.from, req.to, req.amount).await {
                Ok(_) => summary.applied += 1,
                // Rejections are part of normal batch input
                Err(_) => summary.rejected += 1,
            },
            Err(_) => summary.unparsable += 1,
        }
    }

    let balances: Vec<BalanceOutput> = store
        .accounts()
        .await?
        .iter()
        .map(BalanceOutput::from)
        .collect();

    write_balances(tokio::io::stdout(), balances).await?;

    Ok(summary)
}
