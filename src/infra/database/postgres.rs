//! PostgreSQL database client implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{
    AppError, DatabaseClient, DatabaseError, Goal, GoalStatus, InvestmentState,
    InvestmentTransaction, NewInvestmentTransaction, StepType,
};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

const GOAL_COLUMNS: &str = "id, user_id, token_symbol, token_mint, token_decimals, \
     target_quantity, invested_quantity, contribution_amount, contribution_frequency, \
     status, created_at, updated_at";

const TX_COLUMNS: &str = "id, batch_id, goal_id, step, state, fiat_amount, crypto_amount, \
     token_mint, tx_hash, metadata, created_at, updated_at";

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_goal(row: &sqlx::postgres::PgRow) -> Goal {
        let status: String = row.get("status");
        let frequency: String = row.get("contribution_frequency");
        Goal {
            id: row.get("id"),
            user_id: row.get("user_id"),
            token_symbol: row.get("token_symbol"),
            token_mint: row.get("token_mint"),
            token_decimals: row.get("token_decimals"),
            target_quantity: row.get("target_quantity"),
            invested_quantity: row.get("invested_quantity"),
            contribution_amount: row.get("contribution_amount"),
            contribution_frequency: frequency
                .parse()
                .unwrap_or(crate::domain::ContributionFrequency::Monthly),
            status: status.parse().unwrap_or(GoalStatus::Active),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_transaction(row: &sqlx::postgres::PgRow) -> InvestmentTransaction {
        let step: String = row.get("step");
        let state: String = row.get("state");
        InvestmentTransaction {
            id: row.get("id"),
            batch_id: row.get("batch_id"),
            goal_id: row.get("goal_id"),
            step: step.parse().unwrap_or(StepType::Onramp),
            state: state.parse().unwrap_or(InvestmentState::PendingOnramp),
            fiat_amount: row.get("fiat_amount"),
            crypto_amount: row.get("crypto_amount"),
            token_mint: row.get("token_mint"),
            tx_hash: row.get("tx_hash"),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self, goal), fields(id = %goal.id, symbol = %goal.token_symbol))]
    async fn create_goal(&self, goal: &Goal) -> Result<Goal, AppError> {
        sqlx::query(
            r#"
            INSERT INTO goals (
                id, user_id, token_symbol, token_mint, token_decimals,
                target_quantity, invested_quantity, contribution_amount,
                contribution_frequency, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&goal.id)
        .bind(&goal.user_id)
        .bind(&goal.token_symbol)
        .bind(&goal.token_mint)
        .bind(goal.token_decimals)
        .bind(goal.target_quantity)
        .bind(goal.invested_quantity)
        .bind(goal.contribution_amount)
        .bind(goal.contribution_frequency.as_str())
        .bind(goal.status.as_str())
        .bind(goal.created_at)
        .bind(goal.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(goal.clone())
    }

    #[instrument(skip(self))]
    async fn get_goal(&self, id: &str) -> Result<Option<Goal>, AppError> {
        let row = sqlx::query(&format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(row.as_ref().map(Self::row_to_goal))
    }

    #[instrument(skip(self))]
    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(rows.iter().map(Self::row_to_goal).collect())
    }

    #[instrument(skip(self))]
    async fn update_goal_status(&self, id: &str, status: GoalStatus) -> Result<Goal, AppError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE goals
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {GOAL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?
        .ok_or_else(|| AppError::Database(DatabaseError::NotFound(id.to_string())))?;
        Ok(Self::row_to_goal(&row))
    }

    /// One statement, never read-modify-write: concurrent confirmations for
    /// the same goal serialize on the row lock and both increments land.
    #[instrument(skip(self))]
    async fn apply_confirmed_swap(
        &self,
        goal_id: &str,
        amount: Decimal,
    ) -> Result<Goal, AppError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE goals
            SET invested_quantity = invested_quantity + $2,
                status = CASE
                    WHEN status <> 'completed'
                         AND invested_quantity + $2 >= target_quantity
                    THEN 'completed'
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {GOAL_COLUMNS}
            "#
        ))
        .bind(goal_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?
        .ok_or_else(|| AppError::Database(DatabaseError::NotFound(goal_id.to_string())))?;
        Ok(Self::row_to_goal(&row))
    }

    #[instrument(skip(self, tx), fields(batch = %tx.batch_id, step = %tx.step))]
    async fn insert_transaction(
        &self,
        tx: &NewInvestmentTransaction,
    ) -> Result<InvestmentTransaction, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO investment_transactions (
                id, batch_id, goal_id, step, state, fiat_amount, crypto_amount,
                token_mint, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&id)
        .bind(&tx.batch_id)
        .bind(&tx.goal_id)
        .bind(tx.step.as_str())
        .bind(tx.state.as_str())
        .bind(tx.fiat_amount)
        .bind(tx.crypto_amount)
        .bind(&tx.token_mint)
        .bind(&tx.metadata)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::from(e)))?;

        Ok(InvestmentTransaction {
            id,
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
        })
    }

    #[instrument(skip(self))]
    async fn get_batch(&self, batch_id: &str) -> Result<Vec<InvestmentTransaction>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TX_COLUMNS}
            FROM investment_transactions
            WHERE batch_id = $1
            ORDER BY created_at ASC, step ASC
            "#
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(rows.iter().map(Self::row_to_transaction).collect())
    }

    #[instrument(skip(self))]
    async fn get_step(
        &self,
        batch_id: &str,
        step: StepType,
    ) -> Result<Option<InvestmentTransaction>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {TX_COLUMNS} FROM investment_transactions WHERE batch_id = $1 AND step = $2"
        ))
        .bind(batch_id)
        .bind(step.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(row.as_ref().map(Self::row_to_transaction))
    }

    #[instrument(skip(self, metadata_patch))]
    async fn transition_step(
        &self,
        batch_id: &str,
        step: StepType,
        from: &[InvestmentState],
        to: InvestmentState,
        tx_hash: Option<&str>,
        metadata_patch: Option<&serde_json::Value>,
    ) -> Result<Option<InvestmentTransaction>, AppError> {
        let from_tags: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let patch = metadata_patch
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let row = sqlx::query(&format!(
            r#"
            UPDATE investment_transactions
            SET state = $3,
                tx_hash = COALESCE($4, tx_hash),
                metadata = metadata || $5,
                updated_at = NOW()
            WHERE batch_id = $1 AND step = $2 AND state = ANY($6)
            RETURNING {TX_COLUMNS}
            "#
        ))
        .bind(batch_id)
        .bind(step.as_str())
        .bind(to.as_str())
        .bind(tx_hash)
        .bind(&patch)
        .bind(&from_tags)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(row.as_ref().map(Self::row_to_transaction))
    }

    /// Single multi-row statement; partial cancellation is never observable.
    /// The NOT EXISTS guard re-checks cancelability inside the statement, so
    /// a submission racing the caller's read leaves the batch untouched.
    #[instrument(skip(self))]
    async fn cancel_batch(
        &self,
        batch_id: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE investment_transactions
            SET state = 'canceled',
                metadata = metadata
                    || jsonb_build_object('canceled_by', $2::text, 'canceled_at', $3::text),
                updated_at = NOW()
            WHERE batch_id = $1
              AND state IN ('pending_onramp', 'onramp_confirmed', 'quoted', 'swap_signed')
              AND NOT EXISTS (
                  SELECT 1 FROM investment_transactions blocked
                  WHERE blocked.batch_id = $1
                    AND blocked.state IN ('swap_submitted', 'swap_confirmed', 'failed')
              )
            "#,
        )
        .bind(batch_id)
        .bind(actor)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn find_stale_submitted(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InvestmentTransaction>, AppError> {
        // updated_at is when the row entered swap_submitted.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TX_COLUMNS}
            FROM investment_transactions
            WHERE step = 'swap'
              AND state = 'swap_submitted'
              AND tx_hash IS NOT NULL
              AND updated_at <= $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#
        ))
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(rows.iter().map(Self::row_to_transaction).collect())
    }
}
