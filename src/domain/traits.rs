//! Domain traits defining contracts for external collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::AppError;
use super::types::{
    AuthenticatedUser, Goal, GoalStatus, InvestmentState, InvestmentTransaction,
    NewInvestmentTransaction, StepType, SwapQuote, TxFinality,
};

/// Persistence collaborator for goals and transaction rows.
///
/// Implementations must provide atomic single-row updates, an atomic
/// multi-row cancel, and a unique-constraint-enforcing insert over
/// `(batch_id, step)`.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    async fn create_goal(&self, goal: &Goal) -> Result<Goal, AppError>;

    async fn get_goal(&self, id: &str) -> Result<Option<Goal>, AppError>;

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, AppError>;

    /// Set a goal's lifecycle status (pause/resume)
    async fn update_goal_status(&self, id: &str, status: GoalStatus) -> Result<Goal, AppError>;

    /// Atomically add a confirmed swap's output to the goal's invested
    /// quantity and flip status to completed when the target is reached.
    /// One statement; never read-modify-write.
    async fn apply_confirmed_swap(&self, goal_id: &str, amount: Decimal)
    -> Result<Goal, AppError>;

    /// Insert a transaction row. A `(batch_id, step)` collision must map to
    /// `DatabaseError::Duplicate` so the idempotency guard can re-read the
    /// winner's row.
    async fn insert_transaction(
        &self,
        tx: &NewInvestmentTransaction,
    ) -> Result<InvestmentTransaction, AppError>;

    /// All rows of a batch, in step order
    async fn get_batch(&self, batch_id: &str) -> Result<Vec<InvestmentTransaction>, AppError>;

    async fn get_step(
        &self,
        batch_id: &str,
        step: StepType,
    ) -> Result<Option<InvestmentTransaction>, AppError>;

    /// Compare-and-set transition for one step row.
    ///
    /// Applies only when the current state is one of `from`; returns the
    /// updated row, or `None` when the precondition did not hold (someone
    /// else won, or the evidence is out of order). `tx_hash` is set-once;
    /// `metadata_patch` is merged into the existing metadata object.
    async fn transition_step(
        &self,
        batch_id: &str,
        step: StepType,
        from: &[InvestmentState],
        to: InvestmentState,
        tx_hash: Option<&str>,
        metadata_patch: Option<&serde_json::Value>,
    ) -> Result<Option<InvestmentTransaction>, AppError>;

    /// Cancel every row of a batch still strictly before ledger submission,
    /// in one atomic statement, stamping actor and timestamp metadata.
    ///
    /// Must refuse the whole batch (0 rows affected, nothing touched) when
    /// any row has reached SWAP_SUBMITTED, SWAP_CONFIRMED, or FAILED, even
    /// if that happened after the caller's last read. Returns rows affected.
    async fn cancel_batch(
        &self,
        batch_id: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Swap rows stuck in SWAP_SUBMITTED since before `older_than`
    async fn find_stale_submitted(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InvestmentTransaction>, AppError>;
}

/// Quote-and-swap collaborator (external route/price provider)
#[async_trait]
pub trait SwapClient: Send + Sync {
    /// Fetch a time-bounded quote for swapping `amount_in` smallest units
    /// of `input_mint` into `output_mint`.
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_in: u64,
    ) -> Result<SwapQuote, AppError>;

    /// Build an unsigned swap transaction for the given quote and signer.
    /// Returns the Base64 payload the client wallet must sign.
    async fn build_swap_transaction(
        &self,
        quote: &SwapQuote,
        signer_address: &str,
    ) -> Result<String, AppError>;

    /// Submit a client-signed payload to the ledger entry point.
    /// Returns the ledger transaction hash.
    async fn submit_signed(&self, signed_transaction: &str) -> Result<String, AppError>;
}

/// Ledger collaborator reporting finality for submitted transactions
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Check ledger RPC connectivity
    async fn health_check(&self) -> Result<(), AppError>;

    /// Report pending/confirmed/failed status for a transaction hash
    async fn get_finality(&self, tx_hash: &str) -> Result<TxFinality, AppError>;
}

/// Fire-and-forget notification collaborator.
/// A failure here must never fail the transition it describes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        batch_id: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError>;
}

/// Auth/session collaborator supplying a trusted identity
pub trait SessionProvider: Send + Sync {
    /// Resolve the caller from forwarded gateway headers.
    /// The core trusts this boundary and does not re-verify identity.
    fn authenticate(
        &self,
        user_id: Option<&str>,
        two_factor: Option<&str>,
    ) -> Result<AuthenticatedUser, AppError>;
}
