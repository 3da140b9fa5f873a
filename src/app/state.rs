//! Application state management.

use std::sync::Arc;

use crate::domain::{DatabaseClient, LedgerClient, Notifier, SessionProvider, SwapClient};

use super::goal_service::GoalService;
use super::service::{FundingConfig, InvestmentService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InvestmentService>,
    pub goals: Arc<GoalService>,
    pub db_client: Arc<dyn DatabaseClient>,
    pub swap_client: Arc<dyn SwapClient>,
    pub ledger_client: Arc<dyn LedgerClient>,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: Arc<dyn SessionProvider>,
}

impl AppState {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        swap_client: Arc<dyn SwapClient>,
        ledger_client: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
        sessions: Arc<dyn SessionProvider>,
        funding: FundingConfig,
    ) -> Self {
        let service = Arc::new(InvestmentService::new(
            Arc::clone(&db_client),
            Arc::clone(&swap_client),
            Arc::clone(&ledger_client),
            Arc::clone(&notifier),
            funding,
        ));
        let goals = Arc::new(GoalService::new(Arc::clone(&db_client)));
        Self {
            service,
            goals,
            db_client,
            swap_client,
            ledger_client,
            notifier,
            sessions,
        }
    }
}
