//! Investment lifecycle service: the state machine entry points shared by
//! the live request path and the reconciliation worker.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, AuthenticatedUser, BatchStatusResponse, CancelResponse, ContributionAccepted,
    CreateContributionRequest, DatabaseClient, DatabaseError, EvidenceSource, HealthResponse,
    HealthStatus, InvestmentState, InvestmentTransaction, LedgerClient, NewInvestmentTransaction,
    Notifier, PreconditionError, QuoteResponse, StepType, SubmitSwapRequest, SwapClient,
    TxFinality, ValidationError,
};

/// Explorer base URL for submitted swap transactions
const EXPLORER_TX_BASE: &str = "https://solscan.io/tx";

/// Per-row polling budget during a reconciliation sweep
const POLL_BUDGET_SECS: u64 = 30;

/// Initial ledger poll delay in seconds
const POLL_INITIAL_SECS: u64 = 1;

/// Cap for the doubling poll delay in seconds
const POLL_MAX_SECS: u64 = 4;

/// Funding asset the contribution amount is denominated in
#[derive(Debug, Clone)]
pub struct FundingConfig {
    /// Mint address of the funding asset (Base58)
    pub mint: String,
    /// Decimal precision of the funding asset's smallest unit
    pub decimals: u32,
}

impl Default for FundingConfig {
    fn default() -> Self {
        // USDC mainnet mint
        Self {
            mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            decimals: 6,
        }
    }
}

/// Application service orchestrating the contribution lifecycle
pub struct InvestmentService {
    db: Arc<dyn DatabaseClient>,
    swap: Arc<dyn SwapClient>,
    ledger: Arc<dyn LedgerClient>,
    notifier: Arc<dyn Notifier>,
    funding: FundingConfig,
}

impl InvestmentService {
    #[must_use]
    pub fn new(
        db: Arc<dyn DatabaseClient>,
        swap: Arc<dyn SwapClient>,
        ledger: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
        funding: FundingConfig,
    ) -> Self {
        Self {
            db,
            swap,
            ledger,
            notifier,
            funding,
        }
    }

    /// Idempotency guard: at most one row ever exists per (batch, step).
    ///
    /// If a row already exists it is returned unchanged and `create_fn` is
    /// never invoked. A uniqueness conflict from a concurrent caller is
    /// resolved by re-reading the winner's row.
    async fn ensure_step<F>(
        &self,
        batch_id: &str,
        step: StepType,
        create_fn: F,
    ) -> Result<InvestmentTransaction, AppError>
    where
        F: FnOnce() -> NewInvestmentTransaction + Send,
    {
        if let Some(existing) = self.db.get_step(batch_id, step).await? {
            return Ok(existing);
        }
        match self.db.insert_transaction(&create_fn()).await {
            Ok(tx) => Ok(tx),
            Err(AppError::Database(DatabaseError::Duplicate(_))) => self
                .db
                .get_step(batch_id, step)
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "step {step} of batch {batch_id} vanished after duplicate insert"
                    ))
                }),
            Err(e) => Err(e),
        }
    }

    /// Create a contribution batch: records the funding leg at
    /// PENDING_ONRAMP. Safe to retry verbatim.
    #[instrument(skip(self, user, request), fields(batch = %request.batch_id, goal = %request.goal_id))]
    pub async fn create_contribution(
        &self,
        user: &AuthenticatedUser,
        request: &CreateContributionRequest,
    ) -> Result<ContributionAccepted, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        if request.amount <= Decimal::ZERO {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "amount".to_string(),
                message: "Amount must be greater than 0".to_string(),
            }));
        }

        let goal = self
            .db
            .get_goal(&request.goal_id)
            .await?
            .filter(|g| g.user_id == user.user_id)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(request.goal_id.clone())))?;

        if goal.status != crate::domain::GoalStatus::Active {
            return Err(AppError::Precondition(
                PreconditionError::GoalNotAcceptingContributions {
                    goal_id: goal.id.clone(),
                    status: goal.status.to_string(),
                },
            ));
        }

        let transaction = self
            .ensure_step(&request.batch_id, StepType::Onramp, || {
                NewInvestmentTransaction {
                    batch_id: request.batch_id.clone(),
                    goal_id: goal.id.clone(),
                    step: StepType::Onramp,
                    state: InvestmentState::PendingOnramp,
                    fiat_amount: request.amount,
                    crypto_amount: None,
                    token_mint: None,
                    metadata: serde_json::json!({}),
                }
            })
            .await?;

        info!(id = %transaction.id, "Contribution recorded");
        self.notify_quiet(
            &request.batch_id,
            "contribution_created",
            serde_json::json!({ "goal_id": goal.id, "amount": request.amount }),
        )
        .await;

        Ok(ContributionAccepted {
            reference: request.batch_id.clone(),
            transaction,
        })
    }

    /// Record external settlement of the funding leg
    /// (PENDING_ONRAMP → ONRAMP_CONFIRMED). Idempotent.
    #[instrument(skip(self))]
    pub async fn confirm_onramp(&self, batch_id: &str) -> Result<InvestmentTransaction, AppError> {
        let updated = self
            .db
            .transition_step(
                batch_id,
                StepType::Onramp,
                &[InvestmentState::PendingOnramp],
                InvestmentState::OnrampConfirmed,
                None,
                None,
            )
            .await?;

        if let Some(tx) = updated {
            info!(batch = %batch_id, "Onramp confirmed");
            self.notify_quiet(batch_id, "onramp_confirmed", serde_json::json!({}))
                .await;
            return Ok(tx);
        }

        // Duplicate evidence: already confirmed is fine, anything else is not.
        let current = self
            .db
            .get_step(batch_id, StepType::Onramp)
            .await?
            .ok_or_else(|| {
                AppError::Precondition(PreconditionError::MissingStep {
                    batch_id: batch_id.to_string(),
                    step: StepType::Onramp.to_string(),
                })
            })?;
        if current.state == InvestmentState::OnrampConfirmed {
            return Ok(current);
        }
        Err(AppError::Precondition(PreconditionError::InvalidTransition {
            from: current.state.to_string(),
            to: InvestmentState::OnrampConfirmed.to_string(),
        }))
    }

    /// Obtain a quote and an unsigned swap payload
    /// (ONRAMP_CONFIRMED → QUOTED; re-quoting from QUOTED/EXPIRED refreshes
    /// the expiry and clears a derived EXPIRED). A signed-but-never-submitted
    /// row whose quote lapsed drops back to QUOTED here; the stale payload
    /// must be re-signed against the new price.
    #[instrument(skip(self, signer_address))]
    pub async fn request_quote(
        &self,
        batch_id: &str,
        signer_address: &str,
    ) -> Result<QuoteResponse, AppError> {
        validate_base58_address(signer_address, "signer_address")?;

        let transactions = self.db.get_batch(batch_id).await?;
        let now = Utc::now();
        let state = crate::domain::derive_batch_state(&transactions, now)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(batch_id.to_string())))?;

        if !matches!(
            state,
            InvestmentState::OnrampConfirmed | InvestmentState::Quoted | InvestmentState::Expired
        ) {
            return Err(AppError::Precondition(PreconditionError::InvalidTransition {
                from: state.to_string(),
                to: InvestmentState::Quoted.to_string(),
            }));
        }

        let onramp = transactions
            .iter()
            .find(|t| t.step == StepType::Onramp)
            .ok_or_else(|| {
                AppError::Precondition(PreconditionError::MissingStep {
                    batch_id: batch_id.to_string(),
                    step: StepType::Onramp.to_string(),
                })
            })?;
        let goal = self
            .db
            .get_goal(&onramp.goal_id)
            .await?
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(onramp.goal_id.clone())))?;

        let amount_in = to_smallest_units(onramp.fiat_amount, self.funding.decimals)?;
        let quote = self
            .swap
            .get_quote(&self.funding.mint, &goal.token_mint, amount_in)
            .await?;
        let swap_transaction = self
            .swap
            .build_swap_transaction(&quote, signer_address)
            .await?;

        let expected_out = from_smallest_units(quote.out_amount, goal.token_decimals);
        let quote_metadata = serde_json::json!({
            "quote_expires_at": quote.expires_at.to_rfc3339(),
            "quote_out_amount": quote.out_amount,
            "price_impact_pct": quote.price_impact_pct,
        });

        let existing = transactions.iter().any(|t| t.step == StepType::Swap);
        if existing {
            // Re-quote: refresh expiry and expected output in place.
            let updated = self
                .db
                .transition_step(
                    batch_id,
                    StepType::Swap,
                    &[InvestmentState::Quoted, InvestmentState::SwapSigned],
                    InvestmentState::Quoted,
                    None,
                    Some(&quote_metadata),
                )
                .await?;
            if updated.is_none() {
                let current = self.db.get_step(batch_id, StepType::Swap).await?;
                let from = current
                    .map(|t| t.state.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(AppError::Precondition(PreconditionError::InvalidTransition {
                    from,
                    to: InvestmentState::Quoted.to_string(),
                }));
            }
        } else {
            self.ensure_step(batch_id, StepType::Swap, || NewInvestmentTransaction {
                batch_id: batch_id.to_string(),
                goal_id: goal.id.clone(),
                step: StepType::Swap,
                state: InvestmentState::Quoted,
                fiat_amount: onramp.fiat_amount,
                crypto_amount: Some(expected_out),
                token_mint: Some(goal.token_mint.clone()),
                metadata: quote_metadata.clone(),
            })
            .await?;
        }

        info!(
            batch = %batch_id,
            out_amount = quote.out_amount,
            expires_at = %quote.expires_at,
            "Quote recorded"
        );
        self.notify_quiet(
            batch_id,
            "quote_obtained",
            serde_json::json!({ "out_amount": quote.out_amount }),
        )
        .await;

        Ok(QuoteResponse {
            batch_id: batch_id.to_string(),
            quote,
            swap_transaction,
        })
    }

    /// Accept the client-signed payload and submit it to the ledger
    /// (QUOTED → SWAP_SIGNED → SWAP_SUBMITTED).
    ///
    /// Submitting against an expired quote is refused before any ledger
    /// interaction; the caller must re-quote.
    #[instrument(skip(self, request))]
    pub async fn submit_signed_swap(
        &self,
        batch_id: &str,
        request: &SubmitSwapRequest,
    ) -> Result<InvestmentTransaction, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(ValidationError::Multiple(e.to_string())))?;

        let swap_row = self
            .db
            .get_step(batch_id, StepType::Swap)
            .await?
            .ok_or_else(|| {
                AppError::Precondition(PreconditionError::MissingStep {
                    batch_id: batch_id.to_string(),
                    step: StepType::Swap.to_string(),
                })
            })?;

        // Retries after a successful submission are a no-op.
        if matches!(
            swap_row.state,
            InvestmentState::SwapSubmitted | InvestmentState::SwapConfirmed
        ) {
            return Ok(swap_row);
        }
        if !matches!(
            swap_row.state,
            InvestmentState::Quoted | InvestmentState::SwapSigned
        ) {
            return Err(AppError::Precondition(PreconditionError::InvalidTransition {
                from: swap_row.state.to_string(),
                to: InvestmentState::SwapSubmitted.to_string(),
            }));
        }

        // Hard precondition: a stale price never reaches the ledger.
        let now = Utc::now();
        if swap_row.quote_is_expired(now) {
            let expired_at = swap_row
                .quote_expires_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            warn!(batch = %batch_id, %expired_at, "Submission refused: quote expired");
            return Err(AppError::Precondition(PreconditionError::QuoteExpired {
                batch_id: batch_id.to_string(),
                expired_at,
            }));
        }

        self.db
            .transition_step(
                batch_id,
                StepType::Swap,
                &[InvestmentState::Quoted, InvestmentState::SwapSigned],
                InvestmentState::SwapSigned,
                None,
                None,
            )
            .await?;

        match self.swap.submit_signed(&request.signed_transaction).await {
            Ok(tx_hash) => {
                let updated = self
                    .db
                    .transition_step(
                        batch_id,
                        StepType::Swap,
                        &[InvestmentState::SwapSigned],
                        InvestmentState::SwapSubmitted,
                        Some(&tx_hash),
                        None,
                    )
                    .await?;
                let row = match updated {
                    Some(row) => row,
                    // A concurrent retry won the race; its row is authoritative.
                    None => self
                        .db
                        .get_step(batch_id, StepType::Swap)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal(format!("swap row of batch {batch_id} vanished"))
                        })?,
                };
                info!(batch = %batch_id, hash = %tx_hash, "Swap submitted to ledger");
                self.notify_quiet(
                    batch_id,
                    "swap_submitted",
                    serde_json::json!({ "tx_hash": tx_hash }),
                )
                .await;
                Ok(row)
            }
            Err(e) if e.is_retryable() => {
                // Row stays at SWAP_SIGNED; the same payload may be retried.
                warn!(batch = %batch_id, error = %e, "Transient submit failure");
                Err(e)
            }
            Err(e) => {
                warn!(batch = %batch_id, error = %e, "Submission rejected");
                self.db
                    .transition_step(
                        batch_id,
                        StepType::Swap,
                        &[InvestmentState::SwapSigned],
                        InvestmentState::Failed,
                        None,
                        Some(&serde_json::json!({ "error": e.to_string() })),
                    )
                    .await?;
                self.notify_quiet(
                    batch_id,
                    "swap_failed",
                    serde_json::json!({ "error": e.to_string() }),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Single confirm/fail transition shared by the live path and the
    /// reconciliation worker (SWAP_SUBMITTED → SWAP_CONFIRMED | FAILED).
    ///
    /// Returns the state transitioned into, or `None` when the evidence was
    /// a duplicate or out of order (already resolved elsewhere). Goal
    /// accumulation runs only when this call wins the CAS, so a confirming
    /// transition delivered twice accumulates exactly once.
    #[instrument(skip(self, row), fields(batch = %row.batch_id, source = source.as_str()))]
    pub async fn record_swap_outcome(
        &self,
        row: &InvestmentTransaction,
        finality: TxFinality,
        source: EvidenceSource,
    ) -> Result<Option<InvestmentState>, AppError> {
        match finality {
            TxFinality::Pending => Ok(None),
            TxFinality::Confirmed => {
                let patch = serde_json::json!({ "evidence_source": source.as_str() });
                let updated = self
                    .db
                    .transition_step(
                        &row.batch_id,
                        StepType::Swap,
                        &[InvestmentState::SwapSubmitted],
                        InvestmentState::SwapConfirmed,
                        None,
                        Some(&patch),
                    )
                    .await?;
                let Some(confirmed) = updated else {
                    debug!(batch = %row.batch_id, "Confirmation already applied; skipping");
                    return Ok(None);
                };

                let goal = self
                    .db
                    .get_goal(&confirmed.goal_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(DatabaseError::NotFound(confirmed.goal_id.clone()))
                    })?;
                let amount = confirmed_output_quantity(&confirmed, goal.token_decimals);
                let goal = self.db.apply_confirmed_swap(&goal.id, amount).await?;

                info!(
                    batch = %row.batch_id,
                    amount = %amount,
                    invested = %goal.invested_quantity,
                    completed = goal.status == crate::domain::GoalStatus::Completed,
                    "Swap confirmed; goal accumulated"
                );
                self.notify_quiet(
                    &row.batch_id,
                    "swap_confirmed",
                    serde_json::json!({
                        "amount": amount,
                        "goal_id": goal.id,
                        "goal_completed": goal.status == crate::domain::GoalStatus::Completed,
                    }),
                )
                .await;
                Ok(Some(InvestmentState::SwapConfirmed))
            }
            TxFinality::Failed { reason } => {
                let patch = serde_json::json!({
                    "error": reason,
                    "evidence_source": source.as_str(),
                });
                let updated = self
                    .db
                    .transition_step(
                        &row.batch_id,
                        StepType::Swap,
                        &[InvestmentState::SwapSubmitted],
                        InvestmentState::Failed,
                        None,
                        Some(&patch),
                    )
                    .await?;
                if updated.is_none() {
                    debug!(batch = %row.batch_id, "Failure already applied; skipping");
                    return Ok(None);
                }
                warn!(batch = %row.batch_id, "Swap failed on ledger");
                self.notify_quiet(&row.batch_id, "swap_failed", patch).await;
                Ok(Some(InvestmentState::Failed))
            }
        }
    }

    /// Poll the ledger for a batch's submitted swap and apply the outcome
    /// through the shared transition (live-path confirmation).
    #[instrument(skip(self))]
    pub async fn refresh_submission(
        &self,
        batch_id: &str,
    ) -> Result<Option<InvestmentState>, AppError> {
        let Some(row) = self.db.get_step(batch_id, StepType::Swap).await? else {
            return Ok(None);
        };
        if row.state != InvestmentState::SwapSubmitted {
            return Ok(None);
        }
        let Some(hash) = row.tx_hash.clone() else {
            return Ok(None);
        };
        let finality = self.ledger.get_finality(&hash).await?;
        self.record_swap_outcome(&row, finality, EvidenceSource::Live)
            .await
    }

    /// Derived status of a batch, recomputed from the full ledger view.
    #[instrument(skip(self))]
    pub async fn get_status(&self, batch_id: &str) -> Result<BatchStatusResponse, AppError> {
        let transactions = self.db.get_batch(batch_id).await?;
        let now = Utc::now();
        let state = crate::domain::derive_batch_state(&transactions, now)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(batch_id.to_string())))?;

        let quote_expired = transactions
            .iter()
            .filter(|t| t.step == StepType::Swap)
            .filter(|t| {
                matches!(
                    t.state,
                    InvestmentState::Quoted | InvestmentState::SwapSigned
                )
            })
            .any(|t| t.quote_is_expired(now));
        let explorer_url = transactions
            .iter()
            .filter(|t| t.step == StepType::Swap)
            .find_map(|t| t.tx_hash.as_ref())
            .map(|h| format!("{EXPLORER_TX_BASE}/{h}"));

        Ok(BatchStatusResponse {
            batch_id: batch_id.to_string(),
            state,
            cancelable: state.is_cancelable(),
            quote_expired,
            next_action: state.recommended_action(),
            transactions,
            explorer_url,
        })
    }

    /// Cancel a batch while it is still strictly before ledger submission.
    ///
    /// Already-canceled batches succeed as a no-op; submitted or confirmed
    /// batches are refused since a ledger submission cannot be un-submitted.
    #[instrument(skip(self))]
    pub async fn cancel(&self, batch_id: &str, actor: &str) -> Result<CancelResponse, AppError> {
        let transactions = self.db.get_batch(batch_id).await?;
        let now = Utc::now();
        let state = crate::domain::derive_batch_state(&transactions, now)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(batch_id.to_string())))?;

        if state == InvestmentState::Canceled {
            return Ok(CancelResponse {
                batch_id: batch_id.to_string(),
                state,
                newly_canceled: false,
            });
        }
        if !state.is_cancelable() {
            return Err(AppError::Precondition(PreconditionError::NotCancelable {
                state: state.to_string(),
            }));
        }

        let affected = self.db.cancel_batch(batch_id, actor, now).await?;
        if affected == 0 {
            // A submission landed between the read above and the store's own
            // guard; report against the fresh state.
            let transactions = self.db.get_batch(batch_id).await?;
            let state = crate::domain::derive_batch_state(&transactions, Utc::now())
                .ok_or_else(|| AppError::Database(DatabaseError::NotFound(batch_id.to_string())))?;
            if state == InvestmentState::Canceled {
                return Ok(CancelResponse {
                    batch_id: batch_id.to_string(),
                    state,
                    newly_canceled: false,
                });
            }
            return Err(AppError::Precondition(PreconditionError::NotCancelable {
                state: state.to_string(),
            }));
        }
        info!(batch = %batch_id, actor = %actor, rows = affected, "Batch canceled");
        self.notify_quiet(
            batch_id,
            "canceled",
            serde_json::json!({ "actor": actor, "at": now.to_rfc3339() }),
        )
        .await;

        Ok(CancelResponse {
            batch_id: batch_id.to_string(),
            state: InvestmentState::Canceled,
            newly_canceled: true,
        })
    }

    /// One reconciliation sweep: rediscover stale SWAP_SUBMITTED rows from
    /// persisted state and resolve each via the shared transition.
    ///
    /// Safe to invoke repeatedly and concurrently with live traffic; rows
    /// still pending after the polling budget are left for the next sweep,
    /// and dependency errors are logged and deferred rather than escalated.
    #[instrument(skip(self))]
    pub async fn reconcile_stale(
        &self,
        stale_after_secs: i64,
        batch_size: i64,
    ) -> Result<usize, AppError> {
        let cutoff = Utc::now() - Duration::seconds(stale_after_secs);
        let stale = self.db.find_stale_submitted(cutoff, batch_size).await?;
        if stale.is_empty() {
            return Ok(0);
        }
        info!(count = stale.len(), "Reconciling stale submissions");

        let mut resolved = 0;
        for row in stale {
            let Some(hash) = row.tx_hash.clone() else {
                warn!(batch = %row.batch_id, "Submitted row has no hash; skipping");
                continue;
            };
            match self.poll_finality(&hash).await {
                Ok(TxFinality::Pending) => {
                    debug!(batch = %row.batch_id, "Still pending; deferring to next sweep");
                }
                Ok(finality) => {
                    match self
                        .record_swap_outcome(&row, finality, EvidenceSource::Reconciliation)
                        .await
                    {
                        Ok(Some(_)) => resolved += 1,
                        Ok(None) => {}
                        Err(e) => {
                            warn!(batch = %row.batch_id, error = %e, "Failed to apply outcome")
                        }
                    }
                }
                Err(e) => {
                    warn!(batch = %row.batch_id, error = %e, "Ledger poll failed; deferring");
                }
            }
        }
        Ok(resolved)
    }

    /// Poll for finality with capped exponential backoff within a bounded
    /// per-row budget.
    async fn poll_finality(&self, tx_hash: &str) -> Result<TxFinality, AppError> {
        let budget = std::time::Duration::from_secs(POLL_BUDGET_SECS);
        let start = tokio::time::Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match self.ledger.get_finality(tx_hash).await? {
                TxFinality::Pending => {}
                resolved => return Ok(resolved),
            }
            let delay = poll_backoff(attempt);
            attempt += 1;
            if start.elapsed() + delay > budget {
                return Ok(TxFinality::Pending);
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Perform health check on the store and the ledger RPC
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.db.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        let ledger_health = match self.ledger.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        };
        HealthResponse::new(db_health, ledger_health)
    }

    /// Notifications are fire-and-forget; failures never fail a transition.
    async fn notify_quiet(&self, batch_id: &str, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.notifier.notify(batch_id, event, payload).await {
            warn!(batch = %batch_id, event = %event, error = %e, "Notification failed");
        }
    }
}

/// Capped exponential backoff for ledger polling: 1s, 2s, 4s, 4s, …
fn poll_backoff(attempt: u32) -> std::time::Duration {
    let secs = (POLL_INITIAL_SECS << attempt.min(8)).min(POLL_MAX_SECS);
    std::time::Duration::from_secs(secs)
}

/// Convert a decimal quantity to smallest-unit integer representation.
fn to_smallest_units(amount: Decimal, decimals: u32) -> Result<u64, AppError> {
    let scale = 10u64.checked_pow(decimals).ok_or_else(|| {
        AppError::Validation(ValidationError::InvalidField {
            field: "decimals".to_string(),
            message: "Asset precision is out of range".to_string(),
        })
    })?;
    (amount * Decimal::from(scale)).trunc().to_u64().ok_or_else(|| {
        AppError::Validation(ValidationError::InvalidField {
            field: "amount".to_string(),
            message: "Amount is out of range for smallest-unit conversion".to_string(),
        })
    })
}

/// Convert a smallest-unit integer amount to a decimal quantity.
fn from_smallest_units(amount: u64, decimals: i32) -> Decimal {
    let decimals = decimals.clamp(0, 18) as u32;
    Decimal::from(amount) / Decimal::from(10u64.pow(decimals))
}

/// Confirmed output quantity for a swap row: the latest quoted output
/// (refreshed on every re-quote) converted with the asset's precision,
/// falling back to the amount recorded at creation.
fn confirmed_output_quantity(row: &InvestmentTransaction, token_decimals: i32) -> Decimal {
    row.metadata
        .get("quote_out_amount")
        .and_then(|v| v.as_u64())
        .map(|units| from_smallest_units(units, token_decimals))
        .or(row.crypto_amount)
        .unwrap_or(Decimal::ZERO)
}

/// Reject addresses that are not 32-byte Base58 strings.
fn validate_base58_address(address: &str, field: &str) -> Result<(), AppError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|_| AppError::Validation(ValidationError::InvalidField {
            field: field.to_string(),
            message: "Not a valid Base58 string".to_string(),
        }))?;
    if decoded.len() != 32 {
        return Err(AppError::Validation(ValidationError::InvalidField {
            field: field.to_string(),
            message: "Address must decode to 32 bytes".to_string(),
        }));
    }
    Ok(())
}
