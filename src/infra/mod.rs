//! Infrastructure layer implementations.

pub mod auth;
pub mod database;
pub mod ledger;
pub mod notify;
pub mod swap;

pub use auth::GatewaySessionProvider;
pub use database::{PostgresClient, PostgresConfig};
pub use ledger::{LedgerRpcConfig, RpcLedgerClient};
pub use notify::{WebhookConfig, WebhookNotifier};
pub use swap::{JupiterConfig, JupiterSwapClient};
