//! Goal management: creation and explicit pause/resume.
//!
//! Accumulation itself happens on the SWAP_CONFIRMED transition in
//! [`crate::app::InvestmentService`]; this service only owns the
//! user-driven goal mutations.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, AuthenticatedUser, CreateGoalRequest, DatabaseClient, DatabaseError, Goal,
    GoalStatus, PreconditionError, ValidationError,
};

pub struct GoalService {
    db: Arc<dyn DatabaseClient>,
}

impl GoalService {
    #[must_use]
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, user, request), fields(user = %user.user_id))]
    pub async fn create_goal(
        &self,
        user: &AuthenticatedUser,
        request: &CreateGoalRequest,
    ) -> Result<Goal, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Goal validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        if request.target_quantity <= Decimal::ZERO {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "target_quantity".to_string(),
                message: "Target quantity must be greater than 0".to_string(),
            }));
        }
        if request.contribution_amount <= Decimal::ZERO {
            return Err(AppError::Validation(ValidationError::InvalidField {
                field: "contribution_amount".to_string(),
                message: "Contribution amount must be greater than 0".to_string(),
            }));
        }

        let now = Utc::now();
        let goal = Goal {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.user_id.clone(),
            token_symbol: request.token_symbol.clone(),
            token_mint: request.token_mint.clone(),
            token_decimals: request.token_decimals,
            target_quantity: request.target_quantity,
            invested_quantity: Decimal::ZERO,
            contribution_amount: request.contribution_amount,
            contribution_frequency: request.contribution_frequency,
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let goal = self.db.create_goal(&goal).await?;
        info!(id = %goal.id, symbol = %goal.token_symbol, "Goal created");
        Ok(goal)
    }

    #[instrument(skip(self, user))]
    pub async fn get_goal(
        &self,
        user: &AuthenticatedUser,
        id: &str,
    ) -> Result<Goal, AppError> {
        self.db
            .get_goal(id)
            .await?
            .filter(|g| g.user_id == user.user_id)
            .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))
    }

    #[instrument(skip(self, user))]
    pub async fn list_goals(&self, user: &AuthenticatedUser) -> Result<Vec<Goal>, AppError> {
        self.db.list_goals(&user.user_id).await
    }

    /// Pause an active goal. Completed goals stay completed.
    #[instrument(skip(self, user))]
    pub async fn pause_goal(&self, user: &AuthenticatedUser, id: &str) -> Result<Goal, AppError> {
        self.set_status(user, id, GoalStatus::Paused, GoalStatus::Active)
            .await
    }

    /// Resume a paused goal.
    #[instrument(skip(self, user))]
    pub async fn resume_goal(&self, user: &AuthenticatedUser, id: &str) -> Result<Goal, AppError> {
        self.set_status(user, id, GoalStatus::Active, GoalStatus::Paused)
            .await
    }

    async fn set_status(
        &self,
        user: &AuthenticatedUser,
        id: &str,
        to: GoalStatus,
        required: GoalStatus,
    ) -> Result<Goal, AppError> {
        let goal = self.get_goal(user, id).await?;
        if goal.status == to {
            return Ok(goal);
        }
        if goal.status != required {
            return Err(AppError::Precondition(
                PreconditionError::GoalNotAcceptingContributions {
                    goal_id: goal.id,
                    status: goal.status.to_string(),
                },
            ));
        }
        let goal = self.db.update_goal_status(id, to).await?;
        info!(id = %goal.id, status = %goal.status, "Goal status updated");
        Ok(goal)
    }
}
