use ledger_engine::models::total_balance;
use ledger_engine::stress::{self, StressConfig};
use ledger_engine::{AccountId, AccountStore, Amount, ErrorKind, MemoryStore, NewAccount, TransferEngine, TransferService};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

async fn seeded_service(balances: &[(AccountId, Amount)]) -> (Arc<MemoryStore>, Arc<TransferService>) {
    let store = Arc::new(MemoryStore::new());
    for (id, balance) in balances {
        store
            .seed_account(NewAccount {
                id: *id,
                owner: String::new(),
                balance: *balance,
            })
            .await
            .unwrap();
    }
    let service = Arc::new(TransferService::new(TransferEngine::new(store.clone())));
    (store, service)
}

// ============================================================================
// DEADLOCK FREEDOM
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_opposite_directions_between_same_pair_complete() {
    let (store, service) = seeded_service(&[(1, 10_000), (2, 0)]).await;

    let config = StressConfig {
        account_a: 1,
        account_b: 2,
        workers: 50,
        transfers_per_worker: 20,
        amount: 10,
    };

    let report = tokio::time::timeout(Duration::from_secs(30), stress::run(service, config))
        .await
        .expect("workers did not finish, possible deadlock")
        .unwrap();

    assert_eq!(report.failed, 0);
    assert_eq!(report.completed + report.rejected, 1_000);
    assert!(report.conserved());
    assert_eq!(store.transfers().await.unwrap().len(), report.completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_cyclic_transfers_do_not_deadlock() {
    let (store, service) = seeded_service(&[(1, 1_000), (2, 1_000), (3, 1_000)]).await;

    // 1 -> 2 -> 3 -> 1 concurrently: a circular wait unless locks are ordered
    let mut handles = Vec::new();
    for (from, to) in [(1, 2), (2, 3), (3, 1)] {
        for _ in 0..10 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let _ = service.transfer(from, to, 1).await;
                }
            }));
        }
    }

    tokio::time::timeout(Duration::from_secs(30), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await
    .expect("cyclic transfers deadlocked");

    let accounts = store.accounts().await.unwrap();
    assert_eq!(total_balance(&accounts), 3_000);
    assert_eq!(store.transfers().await.unwrap().len(), 600);
}

// ============================================================================
// CONSERVATION & NON-NEGATIVE BALANCES UNDER CONTENTION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_random_contention_preserves_invariants() {
    let balances: Vec<(AccountId, Amount)> = (1..=6).map(|id| (id, 500)).collect();
    let (store, service) = seeded_service(&balances).await;

    let mut handles = Vec::new();
    for worker in 0..16u64 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(worker);
            let mut outcomes = (0usize, 0usize);
            for _ in 0..100 {
                let from: AccountId = rng.gen_range(1..=6);
                let to: AccountId = rng.gen_range(1..=6);
                let amount: Amount = rng.gen_range(0..400);

                match service.transfer(from, to, amount).await {
                    Ok(_) => outcomes.0 += 1,
                    Err(e) => {
                        assert_ne!(e.kind(), ErrorKind::Internal);
                        assert_ne!(e.kind(), ErrorKind::AccountNotFound);
                        outcomes.1 += 1;
                    }
                }
            }
            outcomes
        }));
    }

    let mut committed = 0;
    for handle in handles {
        let (ok, _) = tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .expect("worker stalled")
            .unwrap();
        committed += ok;
    }

    let accounts = store.accounts().await.unwrap();
    assert_eq!(total_balance(&accounts), 3_000);
    assert!(accounts.iter().all(|a| a.balance >= 0));
    assert_eq!(store.transfers().await.unwrap().len(), committed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_draining_an_account_never_overdraws() {
    let (store, service) = seeded_service(&[(1, 1_000), (2, 0)]).await;

    // 40 concurrent attempts to move 100 out of an account holding 1,000
    let mut handles = Vec::new();
    for _ in 0..40 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.transfer(1, 2, 100).await }));
    }

    let mut ok = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::InsufficientFunds);
                insufficient += 1;
            }
        }
    }

    assert_eq!(ok, 10);
    assert_eq!(insufficient, 30);
    assert_eq!(store.account(1).await.unwrap().unwrap().balance, 0);
    assert_eq!(store.account(2).await.unwrap().unwrap().balance, 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_never_shows_half_applied_transfer() {
    let (store, service) = seeded_service(&[(1, 5_000), (2, 5_000)]).await;

    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            for i in 0..500 {
                let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                service.transfer(from, to, 7).await.unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let accounts = store.accounts().await.unwrap();
                assert_eq!(total_balance(&accounts), 10_000);
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}
