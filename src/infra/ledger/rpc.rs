//! Solana JSON-RPC finality client.
//!
//! Resolves a submitted transaction signature to a finality verdict via
//! `getSignatureStatuses`. An unknown signature reads as pending; dropped
//! transactions surface as pending until the caller gives up on them.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::{AppError, LedgerClient, LedgerError, TxFinality};

/// Ledger RPC client configuration
#[derive(Debug, Clone)]
pub struct LedgerRpcConfig {
    pub rpc_url: String,
    pub request_timeout: std::time::Duration,
}

impl LedgerRpcConfig {
    #[must_use]
    pub fn new(rpc_url: &str) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            request_timeout: std::time::Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignatureStatusesResult {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    confirmation_status: Option<String>,
    err: Option<serde_json::Value>,
}

pub struct RpcLedgerClient {
    config: LedgerRpcConfig,
    http: reqwest::Client,
}

impl RpcLedgerClient {
    #[must_use]
    pub fn new(config: LedgerRpcConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn map_http_error(e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Ledger(LedgerError::Timeout(e.to_string()))
        } else {
            AppError::Ledger(LedgerError::Connection(e.to_string()))
        }
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(Self::map_http_error)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::map_http_error)?;
        if !status.is_success() {
            return Err(AppError::Ledger(LedgerError::Connection(format!(
                "{status}: {body}"
            ))));
        }
        let rpc: JsonRpcResponse<T> = serde_json::from_str(&body)
            .map_err(|e| AppError::Ledger(LedgerError::InvalidResponse(e.to_string())))?;
        if let Some(err) = rpc.error {
            return Err(AppError::Ledger(LedgerError::Rejected(err.message)));
        }
        rpc.result.ok_or_else(|| {
            AppError::Ledger(LedgerError::InvalidResponse(format!(
                "{method} returned neither result nor error"
            )))
        })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let result: String = self.rpc_call("getHealth", serde_json::json!([])).await?;
        if result == "ok" {
            Ok(())
        } else {
            Err(AppError::Ledger(LedgerError::Connection(format!(
                "node unhealthy: {result}"
            ))))
        }
    }

    #[instrument(skip(self))]
    async fn get_finality(&self, tx_hash: &str) -> Result<TxFinality, AppError> {
        let result: SignatureStatusesResult = self
            .rpc_call(
                "getSignatureStatuses",
                serde_json::json!([[tx_hash], { "searchTransactionHistory": true }]),
            )
            .await?;

        let finality = match result.value.first().and_then(Option::as_ref) {
            None => TxFinality::Pending,
            Some(status) => {
                if let Some(err) = &status.err {
                    TxFinality::Failed {
                        reason: err.to_string(),
                    }
                } else {
                    match status.confirmation_status.as_deref() {
                        Some("confirmed" | "finalized") => TxFinality::Confirmed,
                        _ => TxFinality::Pending,
                    }
                }
            }
        };
        debug!(tx_hash, ?finality, "Finality resolved");
        Ok(finality)
    }
}
