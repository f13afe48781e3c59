use crate::errors::ErrorKind;
use crate::models::{AccountId, Amount};
use crate::service::TransferService;
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct StressConfig {
    pub account_a: AccountId,
    pub account_b: AccountId,
    pub workers: usize,
    pub transfers_per_worker: usize,
    pub amount: Amount,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            account_a: 1,
            account_b: 2,
            workers: 50,
            transfers_per_worker: 20,
            amount: 10,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct StressReport {
    pub completed: usize,
    pub rejected: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub total_before: i128,
    pub total_after: i128,
}

impl StressReport {
    pub fn conserved(&self) -> bool {
        self.total_before == self.total_after
    }
}

#[derive(Default)]
struct WorkerTally {
    completed: usize,
    rejected: usize,
    failed: usize,
}

/// Hammer one pair of accounts from many workers, alternating direction.
pub async fn run(service: Arc<TransferService>, config: StressConfig) -> Result<StressReport> {
    let total_before = pair_balance(&service, &config).await?;
    tracing::info!(
        workers = config.workers,
        transfers_per_worker = config.transfers_per_worker,
        "Starting stress run"
    );

    let start = Instant::now();
    let mut handles = Vec::with_capacity(config.workers);

    for worker_id in 0..config.workers {
        let service = service.clone();
        let config = config.clone();

        handles.push(tokio::spawn(async move {
            let mut tally = WorkerTally::default();
            for j in 0..config.transfers_per_worker {
                let (from, to) = if j % 2 == 0 {
                    (config.account_a, config.account_b)
                } else {
                    (config.account_b, config.account_a)
                };

                match service.transfer(from, to, config.amount).await {
                    Ok(_) => tally.completed += 1,
                    Err(e) if e.kind() == ErrorKind::Internal => {
                        tracing::warn!(worker_id, error = %e, "Worker transfer failed");
                        tally.failed += 1;
                    }
                    Err(_) => tally.rejected += 1,
                }
            }
            tally
        }));
    }

    let mut report = StressReport::default();
    for handle in handles {
        let tally = handle.await?;
        report.completed += tally.completed;
        report.rejected += tally.rejected;
        report.failed += tally.failed;
    }
    report.elapsed = start.elapsed();
    report.total_before = total_before;
    report.total_after = pair_balance(&service, &config).await?;

    tracing::info!(
        completed = report.completed,
        rejected = report.rejected,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Stress run completed"
    );

    if !report.conserved() {
        bail!(
            "conservation violated: {} before, {} after",
            report.total_before,
            report.total_after
        );
    }

    Ok(report)
}

async fn pair_balance(service: &TransferService, config: &StressConfig) -> Result<i128> {
    let a = service.balance(config.account_a).await?;
    let b = service.balance(config.account_b).await?;
    Ok(a as i128 + b as i128)
}
