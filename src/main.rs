//! Application entry point.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use solana_goal_engine::api::create_router;
use solana_goal_engine::app::{AppState, FundingConfig, ReconcilerConfig, spawn_reconciler};
use solana_goal_engine::infra::swap::jupiter::DEFAULT_JUPITER_URL;
use solana_goal_engine::infra::{
    GatewaySessionProvider, JupiterConfig, JupiterSwapClient, LedgerRpcConfig, PostgresClient,
    PostgresConfig, RpcLedgerClient, WebhookConfig, WebhookNotifier,
};

/// Application configuration
struct Config {
    database_url: String,
    ledger_rpc_url: String,
    jupiter_api_url: String,
    host: String,
    port: u16,
    /// Require the gateway's MFA verdict for every authenticated call
    require_two_factor: bool,
    /// Funding asset the contribution amounts are denominated in
    funding: FundingConfig,
    /// Webhook endpoint for lifecycle events (optional)
    webhook_url: Option<String>,
    /// Bearer token for webhook deliveries (optional)
    webhook_auth_token: Option<String>,
    enable_reconciler: bool,
    reconciler_config: ReconcilerConfig,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let ledger_rpc_url = env::var("SOLANA_RPC_URL")
            .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());
        let jupiter_api_url =
            env::var("JUPITER_API_URL").unwrap_or_else(|_| DEFAULT_JUPITER_URL.to_string());
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let require_two_factor = env::var("REQUIRE_TWO_FACTOR")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let mut funding = FundingConfig::default();
        if let Ok(mint) = env::var("FUNDING_MINT") {
            if !mint.is_empty() {
                funding.mint = mint;
            }
        }
        // Anything past 18 would overflow smallest-unit conversion.
        if let Some(decimals) = env::var("FUNDING_DECIMALS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|d| *d <= 18)
        {
            funding.decimals = decimals;
        }

        let webhook_url = env::var("WEBHOOK_URL").ok().filter(|u| !u.is_empty());
        let webhook_auth_token = env::var("WEBHOOK_AUTH_TOKEN").ok().filter(|t| !t.is_empty());

        let enable_reconciler = env::var("ENABLE_RECONCILER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);
        let mut reconciler_config = ReconcilerConfig {
            enabled: enable_reconciler,
            ..Default::default()
        };
        if let Some(secs) = env::var("RECONCILER_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            reconciler_config.poll_interval = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = env::var("RECONCILER_STALE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
        {
            reconciler_config.stale_after_secs = secs;
        }
        if let Some(size) = env::var("RECONCILER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
        {
            reconciler_config.batch_size = size;
        }

        Ok(Self {
            database_url,
            ledger_rpc_url,
            jupiter_api_url,
            host,
            port,
            require_two_factor,
            funding,
            webhook_url,
            webhook_auth_token,
            enable_reconciler,
            reconciler_config,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🏗️  Solana Goal Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("📦 Initializing infrastructure...");

    let db_config = PostgresConfig::default();
    let postgres_client = PostgresClient::new(&config.database_url, db_config).await?;
    postgres_client.run_migrations().await?;
    info!("   ✓ Database connected and migrations applied");

    let swap_client = JupiterSwapClient::new(JupiterConfig::new(
        &config.jupiter_api_url,
        &config.ledger_rpc_url,
    ));
    info!("   ✓ Swap client created ({})", config.jupiter_api_url);

    let ledger_client = RpcLedgerClient::new(LedgerRpcConfig::new(&config.ledger_rpc_url));
    info!("   ✓ Ledger client created ({})", config.ledger_rpc_url);

    let notifier = WebhookNotifier::new(WebhookConfig {
        url: config.webhook_url.clone(),
        auth_token: config.webhook_auth_token.clone(),
    });
    if config.webhook_url.is_some() {
        info!("   ✓ Webhook notifier configured");
    } else {
        info!("   ○ Webhook notifier disabled (no WEBHOOK_URL)");
    }

    let sessions = GatewaySessionProvider::new(config.require_two_factor);
    if config.require_two_factor {
        info!("   ✓ Two-factor verification required");
    }

    let app_state = Arc::new(AppState::new(
        Arc::new(postgres_client),
        Arc::new(swap_client),
        Arc::new(ledger_client),
        Arc::new(notifier),
        Arc::new(sessions),
        config.funding.clone(),
    ));

    let reconciler_shutdown_tx = if config.enable_reconciler {
        let (_handle, shutdown_tx) = spawn_reconciler(
            Arc::clone(&app_state.service),
            config.reconciler_config.clone(),
        );
        info!(
            "   ✓ Reconciliation worker started (poll: {}s, stale_after: {}s)",
            config.reconciler_config.poll_interval.as_secs(),
            config.reconciler_config.stale_after_secs
        );
        Some(shutdown_tx)
    } else {
        info!("   ○ Reconciliation worker disabled");
        None
    };

    let router = create_router(app_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(tx) = reconciler_shutdown_tx {
        let _ = tx.send(true);
    }

    info!("Server shutdown complete");
    Ok(())
}
