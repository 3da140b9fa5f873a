//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, DatabaseError, LedgerError, PreconditionError, SwapError, ValidationError,
};
pub use traits::{DatabaseClient, LedgerClient, Notifier, SessionProvider, SwapClient};
pub use types::{
    AuthenticatedUser, BatchStatusResponse, CancelResponse, ContributionAccepted,
    ContributionFrequency, CreateContributionRequest, CreateGoalRequest, ErrorDetail,
    ErrorResponse, EvidenceSource, Goal, GoalStatus, HealthResponse, HealthStatus,
    InvestmentState, InvestmentTransaction, NewInvestmentTransaction, NextAction,
    QuoteContributionRequest, QuoteResponse, StepType, SubmitSwapRequest, SwapQuote, TxFinality,
    derive_batch_state,
};
