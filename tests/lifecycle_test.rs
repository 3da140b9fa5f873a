//! Contribution lifecycle tests against mock collaborators: idempotent
//! step creation, state derivation, expiry gating, and cancellation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use solana_goal_engine::app::{FundingConfig, InvestmentService};
use solana_goal_engine::domain::{
    AppError, AuthenticatedUser, CreateContributionRequest, DatabaseClient, EvidenceSource,
    GoalStatus, InvestmentState, PreconditionError, StepType, SubmitSwapRequest, TxFinality,
};
use solana_goal_engine::test_utils::{
    MockDatabaseClient, MockLedgerClient, MockNotifier, MockSwapClient, sample_goal,
};

const SIGNER: &str = "So11111111111111111111111111111111111111112";

struct Harness {
    service: InvestmentService,
    db: Arc<MockDatabaseClient>,
    swap: Arc<MockSwapClient>,
    ledger: Arc<MockLedgerClient>,
    notifier: Arc<MockNotifier>,
    user: AuthenticatedUser,
}

impl Harness {
    fn new() -> Self {
        Self::with_swap(MockSwapClient::new())
    }

    fn with_swap(swap: MockSwapClient) -> Self {
        let db = Arc::new(MockDatabaseClient::new());
        let swap = Arc::new(swap);
        let ledger = Arc::new(MockLedgerClient::new());
        let notifier = Arc::new(MockNotifier::new());
        let service = InvestmentService::new(
            db.clone(),
            swap.clone(),
            ledger.clone(),
            notifier.clone(),
            FundingConfig::default(),
        );
        Self {
            service,
            db,
            swap,
            ledger,
            notifier,
            user: AuthenticatedUser {
                user_id: "user-1".to_string(),
                two_factor_verified: true,
            },
        }
    }

    async fn seed_goal(&self) -> String {
        let goal = sample_goal("goal-1", &self.user.user_id);
        self.db.create_goal(&goal).await.unwrap();
        goal.id
    }

    fn contribution(&self, batch_id: &str, goal_id: &str) -> CreateContributionRequest {
        CreateContributionRequest {
            batch_id: batch_id.to_string(),
            goal_id: goal_id.to_string(),
            amount: dec!(25),
        }
    }

    /// Drive a batch to SWAP_SUBMITTED and return its tx hash.
    async fn drive_to_submitted(&self, batch_id: &str, goal_id: &str) -> String {
        self.service
            .create_contribution(&self.user, &self.contribution(batch_id, goal_id))
            .await
            .unwrap();
        self.service.confirm_onramp(batch_id).await.unwrap();
        self.service.request_quote(batch_id, SIGNER).await.unwrap();
        let row = self
            .service
            .submit_signed_swap(
                batch_id,
                &SubmitSwapRequest {
                    signed_transaction: "c2lnbmVk".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(row.state, InvestmentState::SwapSubmitted);
        row.tx_hash.unwrap()
    }
}

#[tokio::test]
async fn test_create_contribution_is_idempotent() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    let request = h.contribution("batch-1", &goal_id);

    let first = h
        .service
        .create_contribution(&h.user, &request)
        .await
        .unwrap();
    for _ in 0..5 {
        let again = h
            .service
            .create_contribution(&h.user, &request)
            .await
            .unwrap();
        assert_eq!(again.transaction.id, first.transaction.id);
    }
    assert_eq!(h.db.all_transactions().len(), 1);
}

#[tokio::test]
async fn test_contribution_refused_for_paused_goal() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.db
        .update_goal_status(&goal_id, GoalStatus::Paused)
        .await
        .unwrap();

    let err = h
        .service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition(PreconditionError::GoalNotAcceptingContributions { .. })
    ));
}

#[tokio::test]
async fn test_confirm_onramp_is_idempotent() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();

    let first = h.service.confirm_onramp("batch-1").await.unwrap();
    assert_eq!(first.state, InvestmentState::OnrampConfirmed);
    let again = h.service.confirm_onramp("batch-1").await.unwrap();
    assert_eq!(again.state, InvestmentState::OnrampConfirmed);
}

#[tokio::test]
async fn test_quote_before_onramp_is_refused() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();

    let err = h.service.request_quote("batch-1", SIGNER).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition(PreconditionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_full_lifecycle_accumulates_goal() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    let hash = h.drive_to_submitted("batch-1", &goal_id).await;

    h.ledger.set_finality(&hash, TxFinality::Confirmed);
    let resolved = h.service.refresh_submission("batch-1").await.unwrap();
    assert_eq!(resolved, Some(InvestmentState::SwapConfirmed));

    let goal = h.db.get_goal(&goal_id).await.unwrap().unwrap();
    assert!(goal.invested_quantity > dec!(0));

    let status = h.service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::SwapConfirmed);
    assert!(!status.cancelable);
    assert!(h.notifier.event_names().contains(&"swap_confirmed".to_string()));
}

#[tokio::test]
async fn test_duplicate_confirmation_accumulates_once() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    let hash = h.drive_to_submitted("batch-1", &goal_id).await;
    h.ledger.set_finality(&hash, TxFinality::Confirmed);

    let row = h
        .db
        .get_step("batch-1", StepType::Swap)
        .await
        .unwrap()
        .unwrap();
    let first = h
        .service
        .record_swap_outcome(&row, TxFinality::Confirmed, EvidenceSource::Live)
        .await
        .unwrap();
    assert_eq!(first, Some(InvestmentState::SwapConfirmed));

    // Same evidence delivered again: CAS loses, nothing accumulates.
    let invested_after_first = h.db.get_goal(&goal_id).await.unwrap().unwrap().invested_quantity;
    let second = h
        .service
        .record_swap_outcome(&row, TxFinality::Confirmed, EvidenceSource::Reconciliation)
        .await
        .unwrap();
    assert_eq!(second, None);
    let invested_after_second = h.db.get_goal(&goal_id).await.unwrap().unwrap().invested_quantity;
    assert_eq!(invested_after_first, invested_after_second);
}

#[tokio::test]
async fn test_failed_finality_marks_batch_failed() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    let hash = h.drive_to_submitted("batch-1", &goal_id).await;
    h.ledger.set_finality(
        &hash,
        TxFinality::Failed {
            reason: "InstructionError".to_string(),
        },
    );

    let resolved = h.service.refresh_submission("batch-1").await.unwrap();
    assert_eq!(resolved, Some(InvestmentState::Failed));

    let status = h.service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::Failed);
    // Nothing accumulated.
    let goal = h.db.get_goal(&goal_id).await.unwrap().unwrap();
    assert_eq!(goal.invested_quantity, dec!(0));
}

#[tokio::test]
async fn test_submit_with_expired_quote_is_refused() {
    let mut swap = MockSwapClient::new();
    swap.set_quote_ttl(-1);
    let h = Harness::with_swap(swap);
    let goal_id = h.seed_goal().await;

    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();
    h.service.confirm_onramp("batch-1").await.unwrap();
    h.service.request_quote("batch-1", SIGNER).await.unwrap();

    let err = h
        .service
        .submit_signed_swap(
            "batch-1",
            &SubmitSwapRequest {
                signed_transaction: "c2lnbmVk".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition(PreconditionError::QuoteExpired { .. })
    ));
    // No ledger interaction happened.
    assert_eq!(h.swap.submit_call_count(), 0);

    let status = h.service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::Expired);
    assert!(status.cancelable);
}

#[tokio::test]
async fn test_requote_clears_derived_expired() {
    let mut swap = MockSwapClient::new();
    swap.set_quote_ttl(-1);
    let h = Harness::with_swap(swap);
    let goal_id = h.seed_goal().await;

    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();
    h.service.confirm_onramp("batch-1").await.unwrap();
    h.service.request_quote("batch-1", SIGNER).await.unwrap();
    assert_eq!(
        h.service.get_status("batch-1").await.unwrap().state,
        InvestmentState::Expired
    );

    // Fresh quote in place: same row, new expiry, batch reads QUOTED again.
    h.db.age_transaction("batch-1", StepType::Swap, Utc::now() - Duration::hours(1));
    let future = Utc::now() + Duration::seconds(60);
    h.db.transition_step(
        "batch-1",
        StepType::Swap,
        &[InvestmentState::Quoted],
        InvestmentState::Quoted,
        None,
        Some(&serde_json::json!({ "quote_expires_at": future.to_rfc3339() })),
    )
    .await
    .unwrap();
    assert_eq!(
        h.service.get_status("batch-1").await.unwrap().state,
        InvestmentState::Quoted
    );
    assert_eq!(h.db.all_transactions().len(), 2);
}

/// Park a batch at SWAP_SIGNED via a transient submit outage, then lapse
/// its quote in place.
async fn signed_batch_with_lapsed_quote(h: &Harness, batch_id: &str, goal_id: &str) {
    h.service
        .create_contribution(&h.user, &h.contribution(batch_id, goal_id))
        .await
        .unwrap();
    h.service.confirm_onramp(batch_id).await.unwrap();
    h.service.request_quote(batch_id, SIGNER).await.unwrap();

    h.swap.set_submit_unavailable(true);
    let err = h
        .service
        .submit_signed_swap(
            batch_id,
            &SubmitSwapRequest {
                signed_transaction: "c2lnbmVk".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    let row = h.db.get_step(batch_id, StepType::Swap).await.unwrap().unwrap();
    assert_eq!(row.state, InvestmentState::SwapSigned);

    let past = Utc::now() - Duration::seconds(1);
    h.db.transition_step(
        batch_id,
        StepType::Swap,
        &[InvestmentState::SwapSigned],
        InvestmentState::SwapSigned,
        None,
        Some(&serde_json::json!({ "quote_expires_at": past.to_rfc3339() })),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn test_signed_batch_with_lapsed_quote_can_requote() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    signed_batch_with_lapsed_quote(&h, "batch-1", &goal_id).await;

    // The batch reads EXPIRED, not a dead SWAP_SIGNED.
    let status = h.service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::Expired);
    assert!(status.cancelable);

    // The stale signed payload never reaches the ledger.
    let err = h
        .service
        .submit_signed_swap(
            "batch-1",
            &SubmitSwapRequest {
                signed_transaction: "c2lnbmVk".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition(PreconditionError::QuoteExpired { .. })
    ));

    // Re-quoting drops the row back to QUOTED with a fresh expiry, and the
    // newly signed payload then submits normally.
    h.service.request_quote("batch-1", SIGNER).await.unwrap();
    assert_eq!(
        h.service.get_status("batch-1").await.unwrap().state,
        InvestmentState::Quoted
    );
    assert_eq!(h.db.all_transactions().len(), 2);

    h.swap.set_submit_unavailable(false);
    let row = h
        .service
        .submit_signed_swap(
            "batch-1",
            &SubmitSwapRequest {
                signed_transaction: "cmVzaWduZWQ=".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(row.state, InvestmentState::SwapSubmitted);
}

#[tokio::test]
async fn test_signed_batch_with_lapsed_quote_can_cancel() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    signed_batch_with_lapsed_quote(&h, "batch-1", &goal_id).await;

    let response = h.service.cancel("batch-1", "user-1").await.unwrap();
    assert!(response.newly_canceled);
    for tx in h.db.all_transactions() {
        assert_eq!(tx.state, InvestmentState::Canceled);
    }
}

#[tokio::test]
async fn test_submit_retry_after_success_is_noop() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.drive_to_submitted("batch-1", &goal_id).await;

    let again = h
        .service
        .submit_signed_swap(
            "batch-1",
            &SubmitSwapRequest {
                signed_transaction: "c2lnbmVk".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(again.state, InvestmentState::SwapSubmitted);
    assert_eq!(h.swap.submit_call_count(), 1);
}

#[tokio::test]
async fn test_submission_rejection_is_terminal() {
    let h = Harness::new();
    h.swap.set_reject_submission(true);
    let goal_id = h.seed_goal().await;

    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();
    h.service.confirm_onramp("batch-1").await.unwrap();
    h.service.request_quote("batch-1", SIGNER).await.unwrap();

    let err = h
        .service
        .submit_signed_swap(
            "batch-1",
            &SubmitSwapRequest {
                signed_transaction: "c2lnbmVk".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Swap(_)));

    let status = h.service.get_status("batch-1").await.unwrap();
    assert_eq!(status.state, InvestmentState::Failed);
    assert!(!status.cancelable);
}

#[tokio::test]
async fn test_cancel_before_submission() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();
    h.service.confirm_onramp("batch-1").await.unwrap();
    h.service.request_quote("batch-1", SIGNER).await.unwrap();

    let response = h.service.cancel("batch-1", "user-1").await.unwrap();
    assert!(response.newly_canceled);
    assert_eq!(response.state, InvestmentState::Canceled);

    // Every row of the batch flipped in the same operation.
    for tx in h.db.all_transactions() {
        assert_eq!(tx.state, InvestmentState::Canceled);
        assert_eq!(tx.metadata["canceled_by"], "user-1");
    }
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();

    let first = h.service.cancel("batch-1", "user-1").await.unwrap();
    assert!(first.newly_canceled);
    let again = h.service.cancel("batch-1", "user-1").await.unwrap();
    assert!(!again.newly_canceled);
    assert_eq!(again.state, InvestmentState::Canceled);
}

#[tokio::test]
async fn test_cancel_after_submission_is_refused() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    h.drive_to_submitted("batch-1", &goal_id).await;

    let err = h.service.cancel("batch-1", "user-1").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Precondition(PreconditionError::NotCancelable { .. })
    ));
}

#[tokio::test]
async fn test_cancel_expired_batch_is_allowed() {
    let mut swap = MockSwapClient::new();
    swap.set_quote_ttl(-1);
    let h = Harness::with_swap(swap);
    let goal_id = h.seed_goal().await;

    h.service
        .create_contribution(&h.user, &h.contribution("batch-1", &goal_id))
        .await
        .unwrap();
    h.service.confirm_onramp("batch-1").await.unwrap();
    h.service.request_quote("batch-1", SIGNER).await.unwrap();

    let response = h.service.cancel("batch-1", "user-1").await.unwrap();
    assert!(response.newly_canceled);
}

#[tokio::test]
async fn test_cancel_write_leaves_submitted_batch_untouched() {
    let h = Harness::new();
    let goal_id = h.seed_goal().await;
    let hash = h.drive_to_submitted("batch-1", &goal_id).await;

    // A cancel that reaches the store after submission (its cancelability
    // read has gone stale) must not stamp over any row.
    let affected = h
        .db
        .cancel_batch("batch-1", "user-1", Utc::now())
        .await
        .unwrap();
    assert_eq!(affected, 0);
    let swap_row = h.db.get_step("batch-1", StepType::Swap).await.unwrap().unwrap();
    assert_eq!(swap_row.state, InvestmentState::SwapSubmitted);
    let onramp_row = h.db.get_step("batch-1", StepType::Onramp).await.unwrap().unwrap();
    assert_eq!(onramp_row.state, InvestmentState::OnrampConfirmed);

    // The in-flight submission still confirms and accumulates.
    h.ledger.set_finality(&hash, TxFinality::Confirmed);
    let resolved = h.service.refresh_submission("batch-1").await.unwrap();
    assert_eq!(resolved, Some(InvestmentState::SwapConfirmed));
    let goal = h.db.get_goal(&goal_id).await.unwrap().unwrap();
    assert!(goal.invested_quantity > dec!(0));
}

#[tokio::test]
async fn test_unknown_batch_status_is_not_found() {
    let h = Harness::new();
    let err = h.service.get_status("missing").await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
}

#[tokio::test]
async fn test_goal_completes_when_target_reached() {
    let h = Harness::new();
    let mut goal = sample_goal("goal-1", &h.user.user_id);
    // 25 USDC at the mock 1:2 rate yields 12,500,000 smallest units,
    // 0.0125 with 9 decimals. Target below that completes the goal.
    goal.target_quantity = dec!(0.01);
    h.db.create_goal(&goal).await.unwrap();

    let hash = h.drive_to_submitted("batch-1", &goal.id).await;
    h.ledger.set_finality(&hash, TxFinality::Confirmed);
    h.service.refresh_submission("batch-1").await.unwrap();

    let goal = h.db.get_goal(&goal.id).await.unwrap().unwrap();
    assert_eq!(goal.status, GoalStatus::Completed);
}
