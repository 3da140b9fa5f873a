//! Reconciliation sweep tests: stale submitted swaps are rediscovered from
//! persisted state and resolved through the same transitions as the live
//! path.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use solana_goal_engine::app::{FundingConfig, InvestmentService, ReconcilerConfig, spawn_reconciler};
use solana_goal_engine::domain::{
    AuthenticatedUser, CreateContributionRequest, DatabaseClient, GoalStatus, InvestmentState,
    StepType, SubmitSwapRequest, TxFinality,
};
use solana_goal_engine::test_utils::{
    MockDatabaseClient, MockLedgerClient, MockNotifier, MockSwapClient, sample_goal,
};

const SIGNER: &str = "So11111111111111111111111111111111111111112";

fn build_service(
    db: Arc<MockDatabaseClient>,
    ledger: Arc<MockLedgerClient>,
) -> Arc<InvestmentService> {
    Arc::new(InvestmentService::new(
        db,
        Arc::new(MockSwapClient::new()),
        ledger,
        Arc::new(MockNotifier::new()),
        FundingConfig::default(),
    ))
}

async fn submit_batch(
    service: &InvestmentService,
    db: &MockDatabaseClient,
    batch_id: &str,
) -> String {
    let user = AuthenticatedUser {
        user_id: "user-1".to_string(),
        two_factor_verified: true,
    };
    service
        .create_contribution(
            &user,
            &CreateContributionRequest {
                batch_id: batch_id.to_string(),
                goal_id: "goal-1".to_string(),
                amount: dec!(25),
            },
        )
        .await
        .unwrap();
    service.confirm_onramp(batch_id).await.unwrap();
    service.request_quote(batch_id, SIGNER).await.unwrap();
    let row = service
        .submit_signed_swap(
            batch_id,
            &SubmitSwapRequest {
                signed_transaction: "c2lnbmVk".to_string(),
            },
        )
        .await
        .unwrap();
    // Make the row eligible for the sweep.
    db.age_transaction(batch_id, StepType::Swap, Utc::now() - Duration::minutes(5));
    row.tx_hash.unwrap()
}

#[tokio::test]
async fn test_sweep_resolves_stale_confirmed_swap() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let hash = submit_batch(&service, &db, "batch-1").await;
    ledger.set_finality(&hash, TxFinality::Confirmed);

    let resolved = service.reconcile_stale(60, 20).await.unwrap();
    assert_eq!(resolved, 1);

    let status = service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::SwapConfirmed);
    let goal = db.get_goal("goal-1").await.unwrap().unwrap();
    assert!(goal.invested_quantity > dec!(0));
}

#[tokio::test]
async fn test_sweep_resolves_stale_failed_swap() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let hash = submit_batch(&service, &db, "batch-1").await;
    ledger.set_finality(
        &hash,
        TxFinality::Failed {
            reason: "blockhash expired".to_string(),
        },
    );

    let resolved = service.reconcile_stale(60, 20).await.unwrap();
    assert_eq!(resolved, 1);
    let status = service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::Failed);
    let goal = db.get_goal("goal-1").await.unwrap().unwrap();
    assert_eq!(goal.invested_quantity, dec!(0));
}

#[tokio::test]
async fn test_fresh_submissions_are_not_swept() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let hash = submit_batch(&service, &db, "batch-1").await;
    // Row is fresh again after this touch.
    db.age_transaction("batch-1", StepType::Swap, Utc::now());
    ledger.set_finality(&hash, TxFinality::Confirmed);

    let resolved = service.reconcile_stale(60, 20).await.unwrap();
    assert_eq!(resolved, 0);
    let status = service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::SwapSubmitted);
}

#[tokio::test]
async fn test_concurrent_sweeps_accumulate_once() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let hash = submit_batch(&service, &db, "batch-1").await;
    ledger.set_finality(&hash, TxFinality::Confirmed);

    let (a, b) = tokio::join!(
        service.reconcile_stale(60, 20),
        service.reconcile_stale(60, 20)
    );
    // Exactly one sweep wins the compare-and-set.
    assert_eq!(a.unwrap() + b.unwrap(), 1);

    let goal = db.get_goal("goal-1").await.unwrap().unwrap();
    assert_eq!(goal.invested_quantity, dec!(0.0125));
}

#[tokio::test]
async fn test_ledger_outage_defers_rows() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::failing("connection refused"));
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    submit_batch(&service, &db, "batch-1").await;

    // The sweep itself succeeds; the row stays put for the next pass.
    let resolved = service.reconcile_stale(60, 20).await.unwrap();
    assert_eq!(resolved, 0);
    let status = service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::SwapSubmitted);
}

#[tokio::test]
async fn test_sweep_respects_batch_size() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    for i in 0..3 {
        let hash = submit_batch(&service, &db, &format!("batch-{i}")).await;
        ledger.set_finality(&hash, TxFinality::Confirmed);
    }

    let resolved = service.reconcile_stale(60, 2).await.unwrap();
    assert_eq!(resolved, 2);
    let resolved = service.reconcile_stale(60, 2).await.unwrap();
    assert_eq!(resolved, 1);
}

#[tokio::test]
async fn test_worker_tick_resolves_and_shuts_down() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    db.create_goal(&sample_goal("goal-1", "user-1")).await.unwrap();

    let hash = submit_batch(&service, &db, "batch-1").await;
    ledger.set_finality(&hash, TxFinality::Confirmed);

    let config = ReconcilerConfig {
        poll_interval: std::time::Duration::from_millis(20),
        stale_after_secs: 60,
        batch_size: 20,
        enabled: true,
    };
    let (handle, shutdown_tx) = spawn_reconciler(Arc::clone(&service), config);

    // First tick fires immediately.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let status = service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::SwapConfirmed);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_completed_goal_stays_completed() {
    let db = Arc::new(MockDatabaseClient::new());
    let ledger = Arc::new(MockLedgerClient::new());
    let service = build_service(db.clone(), ledger.clone());
    let mut goal = sample_goal("goal-1", "user-1");
    goal.target_quantity = dec!(0.01);
    db.create_goal(&goal).await.unwrap();

    // Two contributions in flight before either confirms; once the goal
    // completes, new contributions are refused but in-flight ones still
    // accumulate and the completed flag never flips back.
    let hash_1 = submit_batch(&service, &db, "batch-1").await;
    let hash_2 = submit_batch(&service, &db, "batch-2").await;
    ledger.set_finality(&hash_1, TxFinality::Confirmed);
    // Oldest row first; the size-1 sweep resolves only batch-1.
    service.reconcile_stale(60, 1).await.unwrap();
    assert_eq!(
        db.get_goal("goal-1").await.unwrap().unwrap().status,
        GoalStatus::Completed
    );

    ledger.set_finality(&hash_2, TxFinality::Confirmed);
    service.reconcile_stale(60, 20).await.unwrap();
    let goal = db.get_goal("goal-1").await.unwrap().unwrap();
    assert_eq!(goal.status, GoalStatus::Completed);
    assert_eq!(goal.invested_quantity, dec!(0.025));
}
