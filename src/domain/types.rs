//! Domain types: entities, lifecycle states, and request/response DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Lifecycle step within a contribution batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Funding leg: fiat settles into the funding asset
    Onramp,
    /// Conversion leg: funding asset swapped into the goal asset
    Swap,
}

impl StepType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Onramp => "onramp",
            Self::Swap => "swap",
        }
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onramp" => Ok(Self::Onramp),
            "swap" => Ok(Self::Swap),
            _ => Err(format!("Invalid step type: {}", s)),
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State tag carried by a transaction row, and the derived state of a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentState {
    /// Contribution recorded, funding leg not yet settled
    PendingOnramp,
    /// Funding leg settled externally
    OnrampConfirmed,
    /// Swap quote obtained; advisory until signed and submitted
    Quoted,
    /// Client produced a signed swap transaction
    SwapSigned,
    /// Swap accepted by the ledger entry point, awaiting finality
    SwapSubmitted,
    /// Ledger reported finality; goal accumulation applied
    SwapConfirmed,
    /// Derived at read time: quote validity window elapsed before submission
    Expired,
    /// Ledger rejected the submission or an unrecoverable error occurred
    Failed,
    /// Explicit user cancellation
    Canceled,
}

impl InvestmentState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingOnramp => "pending_onramp",
            Self::OnrampConfirmed => "onramp_confirmed",
            Self::Quoted => "quoted",
            Self::SwapSigned => "swap_signed",
            Self::SwapSubmitted => "swap_submitted",
            Self::SwapConfirmed => "swap_confirmed",
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Position in the forward ordering of the lifecycle.
    /// Terminal non-success tags have no rank; they short-circuit derivation.
    #[must_use]
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::PendingOnramp => Some(1),
            Self::OnrampConfirmed => Some(2),
            Self::Quoted => Some(3),
            Self::SwapSigned => Some(4),
            Self::SwapSubmitted => Some(5),
            Self::SwapConfirmed => Some(6),
            Self::Expired | Self::Failed | Self::Canceled => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SwapConfirmed | Self::Failed | Self::Canceled | Self::Expired
        )
    }

    /// States from which an explicit cancellation is still permitted:
    /// strictly before a submission has reached the ledger.
    #[must_use]
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            Self::PendingOnramp | Self::OnrampConfirmed | Self::Quoted | Self::Expired
        )
    }

    /// Recommended next action for the caller, per derived state.
    #[must_use]
    pub fn recommended_action(&self) -> NextAction {
        match self {
            Self::PendingOnramp => NextAction::AwaitOnramp,
            Self::OnrampConfirmed => NextAction::RequestQuote,
            Self::Quoted => NextAction::SignAndSubmit,
            Self::SwapSigned | Self::SwapSubmitted => NextAction::AwaitConfirmation,
            Self::SwapConfirmed => NextAction::Done,
            Self::Expired => NextAction::Requote,
            Self::Failed => NextAction::RetryWithNewQuote,
            Self::Canceled => NextAction::AcceptCancellation,
        }
    }
}

impl std::str::FromStr for InvestmentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_onramp" => Ok(Self::PendingOnramp),
            "onramp_confirmed" => Ok(Self::OnrampConfirmed),
            "quoted" => Ok(Self::Quoted),
            "swap_signed" => Ok(Self::SwapSigned),
            "swap_submitted" => Ok(Self::SwapSubmitted),
            "swap_confirmed" => Ok(Self::SwapConfirmed),
            "expired" => Ok(Self::Expired),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("Invalid investment state: {}", s)),
        }
    }
}

impl std::fmt::Display for InvestmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller guidance attached to every status response
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    AwaitOnramp,
    RequestQuote,
    SignAndSubmit,
    AwaitConfirmation,
    Done,
    /// Quote lapsed; obtain a fresh quote and sign again
    Requote,
    /// Terminal failure; a new quote starts a fresh attempt
    RetryWithNewQuote,
    AcceptCancellation,
}

/// Goal lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl GoalStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid goal status: {}", s)),
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How often the user contributes toward a goal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContributionFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ContributionFrequency {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for ContributionFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(format!("Invalid contribution frequency: {}", s)),
        }
    }
}

impl std::fmt::Display for ContributionFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An accumulation goal owned by a single user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Goal {
    /// Unique identifier (UUID)
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Owning user (from the session provider)
    pub user_id: String,
    /// Target asset symbol
    #[schema(example = "SOL")]
    pub token_symbol: String,
    /// Target asset mint address (Base58)
    #[schema(example = "So11111111111111111111111111111111111111112")]
    pub token_mint: String,
    /// Decimal precision of the target asset's smallest unit
    #[schema(example = 9)]
    pub token_decimals: i32,
    /// Quantity of the target asset to accumulate
    pub target_quantity: Decimal,
    /// Quantity accumulated so far; increases only via confirmed swaps
    pub invested_quantity: Decimal,
    /// Funding amount contributed per period
    pub contribution_amount: Decimal,
    pub contribution_frequency: ContributionFrequency,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.invested_quantity >= self.target_quantity
    }
}

/// One transaction row per lifecycle step of a contribution batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct InvestmentTransaction {
    /// Unique identifier (UUID)
    pub id: String,
    /// Grouping key binding all steps of one contribution attempt
    #[schema(example = "batch_2026_08_27_001")]
    pub batch_id: String,
    /// Owning goal reference
    pub goal_id: String,
    pub step: StepType,
    pub state: InvestmentState,
    /// Funding amount, immutable after insert
    pub fiat_amount: Decimal,
    /// Expected goal-asset output, immutable after insert
    pub crypto_amount: Option<Decimal>,
    /// Goal asset mint
    pub token_mint: Option<String>,
    /// Ledger transaction hash, set once on submission
    pub tx_hash: Option<String>,
    /// Free-form step metadata (quote expiry, error detail, cancellation actor/time)
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestmentTransaction {
    /// Quote expiry recorded at QUOTED time, if any.
    #[must_use]
    pub fn quote_expires_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get("quote_expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether the stored quote's validity window has elapsed.
    #[must_use]
    pub fn quote_is_expired(&self, now: DateTime<Utc>) -> bool {
        self.quote_expires_at().is_some_and(|exp| now >= exp)
    }
}

/// Fields for inserting a new transaction row
#[derive(Debug, Clone)]
pub struct NewInvestmentTransaction {
    pub batch_id: String,
    pub goal_id: String,
    pub step: StepType,
    pub state: InvestmentState,
    pub fiat_amount: Decimal,
    pub crypto_amount: Option<Decimal>,
    pub token_mint: Option<String>,
    pub metadata: serde_json::Value,
}

/// Compute the current derived state of a batch from its transaction rows.
///
/// CANCELED and FAILED short-circuit the ordering scan; otherwise the
/// highest-ranked tag wins. A batch resting at QUOTED or SWAP_SIGNED whose
/// quote expiry has passed reads as EXPIRED without any row being
/// rewritten: a payload signed against a lapsed price must not reach the
/// ledger, so the batch is back in re-quote-or-cancel territory.
///
/// Returns `None` for an unknown batch (no rows).
#[must_use]
pub fn derive_batch_state(
    transactions: &[InvestmentTransaction],
    now: DateTime<Utc>,
) -> Option<InvestmentState> {
    if transactions.is_empty() {
        return None;
    }

    if transactions
        .iter()
        .any(|t| t.state == InvestmentState::Canceled)
    {
        return Some(InvestmentState::Canceled);
    }
    if transactions
        .iter()
        .any(|t| t.state == InvestmentState::Failed)
    {
        return Some(InvestmentState::Failed);
    }

    let mut best = InvestmentState::PendingOnramp;
    for tx in transactions {
        if tx.state.rank() > best.rank() {
            best = tx.state;
        }
    }

    if matches!(
        best,
        InvestmentState::Quoted | InvestmentState::SwapSigned
    ) {
        let expired = transactions
            .iter()
            .filter(|t| t.step == StepType::Swap)
            .any(|t| t.quote_is_expired(now));
        if expired {
            return Some(InvestmentState::Expired);
        }
    }

    Some(best)
}

/// Request to create a new goal
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateGoalRequest {
    #[validate(length(min = 1, max = 16, message = "Token symbol is required"))]
    #[schema(example = "SOL")]
    pub token_symbol: String,
    #[validate(length(min = 32, max = 44, message = "Token mint must be a Base58 address"))]
    #[schema(example = "So11111111111111111111111111111111111111112")]
    pub token_mint: String,
    #[validate(range(min = 0, max = 18, message = "Token decimals must be between 0 and 18"))]
    #[schema(example = 9)]
    pub token_decimals: i32,
    pub target_quantity: Decimal,
    pub contribution_amount: Decimal,
    pub contribution_frequency: ContributionFrequency,
}

/// Request to create a contribution batch
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateContributionRequest {
    /// Caller-supplied idempotency and grouping key
    #[validate(length(min = 1, max = 64, message = "Batch id is required"))]
    #[schema(example = "batch_2026_08_27_001")]
    pub batch_id: String,
    #[validate(length(min = 1, message = "Goal reference is required"))]
    pub goal_id: String,
    /// Funding amount for this contribution
    pub amount: Decimal,
}

/// Request for a fresh swap quote and unsigned payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct QuoteContributionRequest {
    /// Client wallet that will sign the swap (Base58)
    #[validate(length(min = 32, max = 44, message = "Signer address must be a Base58 address"))]
    pub signer_address: String,
}

/// Request to submit a client-signed swap payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitSwapRequest {
    /// Base64-encoded signed transaction, opaque to the server
    #[validate(length(min = 1, message = "Signed transaction is required"))]
    pub signed_transaction: String,
}

/// A time-bounded price/amount offer from the swap service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SwapQuote {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in smallest units
    pub in_amount: u64,
    /// Expected output amount in smallest units
    pub out_amount: u64,
    pub price_impact_pct: Option<f64>,
    /// Instant after which the quote must not be submitted
    pub expires_at: DateTime<Utc>,
}

/// Quote endpoint response: the quote plus the payload to sign
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub batch_id: String,
    pub quote: SwapQuote,
    /// Base64-encoded unsigned transaction for the client wallet
    pub swap_transaction: String,
}

/// Create-contribution response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContributionAccepted {
    pub transaction: InvestmentTransaction,
    /// Explorer-style reference for tracking this contribution
    #[schema(example = "batch_2026_08_27_001")]
    pub reference: String,
}

/// Status-query response for a batch
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchStatusResponse {
    pub batch_id: String,
    /// Derived state, recomputed from the full transaction list
    pub state: InvestmentState,
    pub cancelable: bool,
    /// True when the stored quote's validity window has elapsed
    pub quote_expired: bool,
    pub next_action: NextAction,
    pub transactions: Vec<InvestmentTransaction>,
    /// Explorer URL for the submitted swap, once a hash exists
    pub explorer_url: Option<String>,
}

/// Cancel endpoint response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelResponse {
    pub batch_id: String,
    pub state: InvestmentState,
    /// False when the batch was already canceled (idempotent no-op)
    pub newly_canceled: bool,
}

/// Finality report from the ledger collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFinality {
    /// Not yet finalized; poll again later
    Pending,
    /// Durably committed with no error
    Confirmed,
    /// Committed with an on-chain error, or dropped with a rejection reason
    Failed { reason: String },
}

/// Where confirm/fail evidence came from; both paths share one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    Live,
    Reconciliation,
}

impl EvidenceSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Reconciliation => "reconciliation",
        }
    }
}

/// Identity supplied by the auth/session collaborator; trusted as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub two_factor_verified: bool,
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub ledger: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(database: HealthStatus, ledger: HealthStatus) -> Self {
        let status = match (&database, &ledger) {
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            database,
            ledger,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "quote_expired")]
    pub r#type: String,
    /// Human-readable error message
    pub message: String,
    /// Whether the caller may retry the same request verbatim
    pub retryable: bool,
}
