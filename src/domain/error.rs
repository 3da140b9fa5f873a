//! Error taxonomy for the investment lifecycle engine.

use thiserror::Error;

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Swap service error: {0}")]
    Swap(#[from] SwapError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl AppError {
    /// Whether the caller may retry the same request verbatim.
    ///
    /// Transient dependency failures are retryable; validation errors,
    /// precondition failures and on-chain rejections are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => matches!(e, DatabaseError::Connection(_)),
            Self::Swap(e) => matches!(
                e,
                SwapError::Unavailable(_) | SwapError::Timeout(_) | SwapError::RateLimited(_)
            ),
            Self::Ledger(e) => matches!(e, LedgerError::Connection(_) | LedgerError::Timeout(_)),
            _ => false,
        }
    }
}

/// Request validation errors, rejected before any state mutation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("{0}")]
    Multiple(String),
}

/// State-machine precondition failures, rejected with no side effects
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("Quote for batch '{batch_id}' expired at {expired_at}; request a fresh quote")]
    QuoteExpired {
        batch_id: String,
        expired_at: String,
    },

    #[error("Batch is in state '{state}' and can no longer be canceled")]
    NotCancelable { state: String },

    #[error("Step '{step}' of batch '{batch_id}' does not exist yet")]
    MissingStep { batch_id: String, step: String },

    #[error("Illegal transition to '{to}' from current state '{from}'")]
    InvalidTransition { from: String, to: String },

    #[error("Goal '{goal_id}' is {status}; contributions are not accepted")]
    GoalNotAcceptingContributions { goal_id: String, status: String },
}

/// Persistence collaborator errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound(e.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Connection(e.to_string()),
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Quote-and-swap collaborator errors
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Swap service unavailable: {0}")]
    Unavailable(String),

    #[error("Swap service timed out: {0}")]
    Timeout(String),

    #[error("Swap service rate limited: {0}")]
    RateLimited(String),

    #[error("Swap rejected: {0}")]
    Rejected(String),

    #[error("Invalid swap service response: {0}")]
    InvalidResponse(String),
}

/// Ledger RPC collaborator errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger RPC connection failed: {0}")]
    Connection(String),

    #[error("Ledger RPC timed out: {0}")]
    Timeout(String),

    #[error("Transaction rejected by ledger: {0}")]
    Rejected(String),

    #[error("Invalid ledger RPC response: {0}")]
    InvalidResponse(String),
}
