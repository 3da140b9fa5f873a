//! Mock implementations for testing.
//!
//! `MockDatabaseClient` mirrors the two guarantees the real store provides:
//! the unique `(batch_id, step)` insert and compare-and-set transitions that
//! return `None` when the current state is not in the expected set.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::{
    AppError, AuthenticatedUser, DatabaseClient, DatabaseError, Goal, GoalStatus,
    InvestmentState, InvestmentTransaction, LedgerClient, LedgerError, NewInvestmentTransaction,
    Notifier, SessionProvider, StepType, SwapClient, SwapError, SwapQuote, TxFinality,
};

/// Configuration for mock behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub should_fail: bool,
    pub error_message: Option<String>,
}

impl MockConfig {
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }
}

/// In-memory database client for testing
pub struct MockDatabaseClient {
    goals: Arc<Mutex<HashMap<String, Goal>>>,
    transactions: Arc<Mutex<HashMap<(String, StepType), InvestmentTransaction>>>,
    config: MockConfig,
    is_healthy: AtomicBool,
}

impl MockDatabaseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            goals: Arc::new(Mutex::new(HashMap::new())),
            transactions: Arc::new(Mutex::new(HashMap::new())),
            config,
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// All stored transaction rows (for assertions)
    pub fn all_transactions(&self) -> Vec<InvestmentTransaction> {
        self.transactions.lock().unwrap().values().cloned().collect()
    }

    /// Overwrite a row's `updated_at`, to simulate staleness
    pub fn age_transaction(&self, batch_id: &str, step: StepType, updated_at: DateTime<Utc>) {
        if let Some(tx) = self
            .transactions
            .lock()
            .unwrap()
            .get_mut(&(batch_id.to_string(), step))
        {
            tx.updated_at = updated_at;
        }
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Database(DatabaseError::Query(msg)));
        }
        Ok(())
    }

    fn merge_metadata(target: &mut serde_json::Value, patch: &serde_json::Value) {
        if let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_map {
                target_map.insert(k.clone(), v.clone());
            }
        }
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.check_should_fail()?;
        if self.is_healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(AppError::Database(DatabaseError::Connection(
                "Mock database unhealthy".to_string(),
            )))
        }
    }

    async fn create_goal(&self, goal: &Goal) -> Result<Goal, AppError> {
        self.check_should_fail()?;
        let mut goals = self.goals.lock().unwrap();
        if goals.contains_key(&goal.id) {
            return Err(AppError::Database(DatabaseError::Duplicate(
                goal.id.clone(),
            )));
        }
        goals.insert(goal.id.clone(), goal.clone());
        Ok(goal.clone())
    }

    async fn get_goal(&self, id: &str) -> Result<Option<Goal>, AppError> {
        self.check_should_fail()?;
        Ok(self.goals.lock().unwrap().get(id).cloned())
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, AppError> {
        self.check_should_fail()?;
        let mut goals: Vec<Goal> = self
            .goals
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        goals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(goals)
    }

    async fn update_goal_status(&self, id: &str, status: GoalStatus) -> Result<Goal, AppError> {
        self.check_should_fail()?;
        let mut goals = self.goals.lock().unwrap();
        let goal = goals
            .get_mut(id)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))?;
        goal.status = status;
        goal.updated_at = Utc::now();
        Ok(goal.clone())
    }

    async fn apply_confirmed_swap(&self, goal_id: &str, amount: Decimal) -> Result<Goal, AppError> {
        self.check_should_fail()?;
        let mut goals = self.goals.lock().unwrap();
        let goal = goals
            .get_mut(goal_id)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(goal_id.to_string())))?;
        goal.invested_quantity += amount;
        if goal.status != GoalStatus::Completed && goal.invested_quantity >= goal.target_quantity {
            goal.status = GoalStatus::Completed;
        }
        goal.updated_at = Utc::now();
        Ok(goal.clone())
    }

    async fn insert_transaction(
        &self,
        tx: &NewInvestmentTransaction,
    ) -> Result<InvestmentTransaction, AppError> {
        self.check_should_fail()?;
        let mut transactions = self.transactions.lock().unwrap();
        let key = (tx.batch_id.clone(), tx.step);
        if transactions.contains_key(&key) {
            return Err(AppError::Database(DatabaseError::Duplicate(format!(
                "({}, {})",
                tx.batch_id, tx.step
            ))));
        }
        let now = Utc::now();
        let row = InvestmentTransaction {
            id: Uuid::new_v4().to_string(),
            batch_id: tx.batch_id.clone(),
            goal_id: tx.goal_id.clone(),
            step: tx.step,
            state: tx.state,
            fiat_amount: tx.fiat_amount,
            crypto_amount: tx.crypto_amount,
            token_mint: tx.token_mint.clone(),
            tx_hash: None,
            metadata: tx.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        transactions.insert(key, row.clone());
        Ok(row)
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Vec<InvestmentTransaction>, AppError> {
        self.check_should_fail()?;
        let mut rows: Vec<InvestmentTransaction> = self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.batch_id == batch_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn get_step(
        &self,
        batch_id: &str,
        step: StepType,
    ) -> Result<Option<InvestmentTransaction>, AppError> {
        self.check_should_fail()?;
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(&(batch_id.to_string(), step))
            .cloned())
    }

    async fn transition_step(
        &self,
        batch_id: &str,
        step: StepType,
        from: &[InvestmentState],
        to: InvestmentState,
        tx_hash: Option<&str>,
        metadata_patch: Option<&serde_json::Value>,
    ) -> Result<Option<InvestmentTransaction>, AppError> {
        self.check_should_fail()?;
        let mut transactions = self.transactions.lock().unwrap();
        let Some(tx) = transactions.get_mut(&(batch_id.to_string(), step)) else {
            return Ok(None);
        };
        if !from.contains(&tx.state) {
            return Ok(None);
        }
        tx.state = to;
        if tx.tx_hash.is_none() {
            tx.tx_hash = tx_hash.map(String::from);
        }
        if let Some(patch) = metadata_patch {
            Self::merge_metadata(&mut tx.metadata, patch);
        }
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn cancel_batch(
        &self,
        batch_id: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        self.check_should_fail()?;
        let mut transactions = self.transactions.lock().unwrap();
        // Same all-or-nothing guard as the real store: once any row has
        // reached the ledger (or failed there), nothing is touched.
        let blocked = transactions.values().any(|t| {
            t.batch_id == batch_id
                && matches!(
                    t.state,
                    InvestmentState::SwapSubmitted
                        | InvestmentState::SwapConfirmed
                        | InvestmentState::Failed
                )
        });
        if blocked {
            return Ok(0);
        }
        let mut changed = 0u64;
        for tx in transactions.values_mut().filter(|t| {
            t.batch_id == batch_id
                && matches!(
                    t.state,
                    InvestmentState::PendingOnramp
                        | InvestmentState::OnrampConfirmed
                        | InvestmentState::Quoted
                        | InvestmentState::SwapSigned
                )
        }) {
            tx.state = InvestmentState::Canceled;
            Self::merge_metadata(
                &mut tx.metadata,
                &serde_json::json!({
                    "canceled_by": actor,
                    "canceled_at": at.to_rfc3339(),
                }),
            );
            tx.updated_at = at;
            changed += 1;
        }
        Ok(changed)
    }

    async fn find_stale_submitted(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InvestmentTransaction>, AppError> {
        self.check_should_fail()?;
        let mut rows: Vec<InvestmentTransaction> = self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                t.step == StepType::Swap
                    && t.state == InvestmentState::SwapSubmitted
                    && t.updated_at < older_than
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

/// Mock swap client returning deterministic quotes and payloads
pub struct MockSwapClient {
    config: MockConfig,
    /// Output amount returned per input amount (fixed ratio numerator/denominator)
    out_per_in: (u64, u64),
    quote_ttl_secs: i64,
    submit_calls: AtomicU64,
    reject_submission: AtomicBool,
    unavailable_submission: AtomicBool,
}

impl MockSwapClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            out_per_in: (1, 2),
            quote_ttl_secs: 60,
            submit_calls: AtomicU64::new(0),
            reject_submission: AtomicBool::new(false),
            unavailable_submission: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Make quotes expire immediately
    pub fn set_quote_ttl(&mut self, secs: i64) {
        self.quote_ttl_secs = secs;
    }

    /// Make `submit_signed` return a terminal rejection
    pub fn set_reject_submission(&self, reject: bool) {
        self.reject_submission.store(reject, Ordering::Relaxed);
    }

    /// Make `submit_signed` fail with a retryable error
    pub fn set_submit_unavailable(&self, unavailable: bool) {
        self.unavailable_submission
            .store(unavailable, Ordering::Relaxed);
    }

    pub fn submit_call_count(&self) -> u64 {
        self.submit_calls.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Swap(SwapError::Unavailable(msg)));
        }
        Ok(())
    }
}

impl Default for MockSwapClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapClient for MockSwapClient {
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_in: u64,
    ) -> Result<SwapQuote, AppError> {
        self.check_should_fail()?;
        let (num, den) = self.out_per_in;
        Ok(SwapQuote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount: amount_in,
            out_amount: amount_in * num / den,
            price_impact_pct: Some(0.01),
            expires_at: Utc::now() + Duration::seconds(self.quote_ttl_secs),
        })
    }

    async fn build_swap_transaction(
        &self,
        _quote: &SwapQuote,
        _signer_address: &str,
    ) -> Result<String, AppError> {
        self.check_should_fail()?;
        Ok("bW9ja191bnNpZ25lZF90eA==".to_string())
    }

    async fn submit_signed(&self, _signed_transaction: &str) -> Result<String, AppError> {
        self.check_should_fail()?;
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        if self.unavailable_submission.load(Ordering::Relaxed) {
            return Err(AppError::Swap(SwapError::Unavailable(
                "Mock outage".to_string(),
            )));
        }
        if self.reject_submission.load(Ordering::Relaxed) {
            return Err(AppError::Swap(SwapError::Rejected(
                "Mock rejection".to_string(),
            )));
        }
        Ok(format!("MockSig{}", Uuid::new_v4().simple()))
    }
}

/// Mock ledger client with per-signature settable finality
pub struct MockLedgerClient {
    config: MockConfig,
    finalities: Arc<Mutex<HashMap<String, TxFinality>>>,
    default_finality: Mutex<TxFinality>,
    is_healthy: AtomicBool,
    poll_calls: AtomicU64,
}

impl MockLedgerClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            finalities: Arc::new(Mutex::new(HashMap::new())),
            default_finality: Mutex::new(TxFinality::Confirmed),
            is_healthy: AtomicBool::new(true),
            poll_calls: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Finality returned for signatures without an explicit entry
    pub fn set_default_finality(&self, finality: TxFinality) {
        *self.default_finality.lock().unwrap() = finality;
    }

    pub fn set_finality(&self, tx_hash: &str, finality: TxFinality) {
        self.finalities
            .lock()
            .unwrap()
            .insert(tx_hash.to_string(), finality);
    }

    pub fn poll_call_count(&self) -> u64 {
        self.poll_calls.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Ledger(LedgerError::Connection(msg)));
        }
        Ok(())
    }
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.check_should_fail()?;
        if self.is_healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(AppError::Ledger(LedgerError::Connection(
                "Mock ledger unhealthy".to_string(),
            )))
        }
    }

    async fn get_finality(&self, tx_hash: &str) -> Result<TxFinality, AppError> {
        self.check_should_fail()?;
        self.poll_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .finalities
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .unwrap_or_else(|| self.default_finality.lock().unwrap().clone()))
    }
}

/// Recorded notification event
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub batch_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Mock notifier that records every delivered event
pub struct MockNotifier {
    config: MockConfig,
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl MockNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MockConfig::success(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            config: MockConfig::failure(message),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(
        &self,
        batch_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError> {
        if self.config.should_fail {
            let msg = self
                .config
                .error_message
                .clone()
                .unwrap_or_else(|| "Mock error".to_string());
            return Err(AppError::Internal(msg));
        }
        self.events.lock().unwrap().push(RecordedEvent {
            batch_id: batch_id.to_string(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Mock session provider accepting any non-empty user id
pub struct MockSessionProvider {
    require_two_factor: bool,
}

impl MockSessionProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            require_two_factor: false,
        }
    }

    #[must_use]
    pub fn requiring_two_factor() -> Self {
        Self {
            require_two_factor: true,
        }
    }
}

impl Default for MockSessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for MockSessionProvider {
    fn authenticate(
        &self,
        user_id: Option<&str>,
        two_factor: Option<&str>,
    ) -> Result<AuthenticatedUser, AppError> {
        let user_id = user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Authentication("missing user id".to_string()))?;
        let two_factor_verified = matches!(two_factor, Some("true" | "1"));
        if self.require_two_factor && !two_factor_verified {
            return Err(AppError::Authentication(
                "two-factor verification required".to_string(),
            ));
        }
        Ok(AuthenticatedUser {
            user_id: user_id.to_string(),
            two_factor_verified,
        })
    }
}

/// A goal row for tests
#[must_use]
pub fn sample_goal(id: &str, user_id: &str) -> Goal {
    let now = Utc::now();
    Goal {
        id: id.to_string(),
        user_id: user_id.to_string(),
        token_symbol: "SOL".to_string(),
        token_mint: "So11111111111111111111111111111111111111112".to_string(),
        token_decimals: 9,
        target_quantity: Decimal::new(10, 0),
        invested_quantity: Decimal::ZERO,
        contribution_amount: Decimal::new(25, 0),
        contribution_frequency: crate::domain::ContributionFrequency::Weekly,
        status: GoalStatus::Active,
        created_at: now,
        updated_at: now,
    }
}
