//! Application layer containing business logic and shared state.

pub mod goal_service;
pub mod service;
pub mod state;
pub mod worker;

pub use goal_service::GoalService;
pub use service::{FundingConfig, InvestmentService};
pub use state::AppState;
pub use worker::{ReconcilerConfig, spawn_reconciler};
