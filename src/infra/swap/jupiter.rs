//! Jupiter quote/swap API client.
//!
//! Fetches time-bounded quotes and unsigned swap payloads from the Jupiter
//! v6 aggregator, and forwards client-signed payloads to the Solana RPC
//! entry point (`sendTransaction`).

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::domain::{AppError, SwapClient, SwapError, SwapQuote};

/// Default Jupiter quote API base URL
pub const DEFAULT_JUPITER_URL: &str = "https://quote-api.jup.ag/v6";

/// Default validity window assigned to a fetched quote, in seconds.
/// Jupiter quotes carry no expiry of their own; the price is only honored
/// for as long as the route stays fresh.
pub const DEFAULT_QUOTE_TTL_SECS: i64 = 60;

/// Default slippage tolerance in basis points
const DEFAULT_SLIPPAGE_BPS: u32 = 50;

/// Jupiter quote/swap client configuration
#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_url: String,
    pub rpc_url: String,
    pub quote_ttl_secs: i64,
    pub slippage_bps: u32,
    pub request_timeout: std::time::Duration,
}

impl JupiterConfig {
    #[must_use]
    pub fn new(api_url: &str, rpc_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            rpc_url: rpc_url.to_string(),
            quote_ttl_secs: DEFAULT_QUOTE_TTL_SECS,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            request_timeout: std::time::Duration::from_secs(10),
        }
    }
}

/// Jupiter v6 quote response (fields this service consumes)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuoteResponse {
    input_mint: String,
    in_amount: String,
    output_mint: String,
    out_amount: String,
    price_impact_pct: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterSwapResponse {
    swap_transaction: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

pub struct JupiterSwapClient {
    config: JupiterConfig,
    http: reqwest::Client,
}

impl JupiterSwapClient {
    #[must_use]
    pub fn new(config: JupiterConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn map_http_error(e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Swap(SwapError::Timeout(e.to_string()))
        } else {
            AppError::Swap(SwapError::Unavailable(e.to_string()))
        }
    }

    fn check_status(status: reqwest::StatusCode, body: &str) -> Result<(), AppError> {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::Swap(SwapError::RateLimited(body.to_string())));
        }
        if status.is_client_error() {
            return Err(AppError::Swap(SwapError::Rejected(format!(
                "{status}: {body}"
            ))));
        }
        if !status.is_success() {
            return Err(AppError::Swap(SwapError::Unavailable(format!(
                "{status}: {body}"
            ))));
        }
        Ok(())
    }

    fn parse_amount(value: &str, field: &str) -> Result<u64, AppError> {
        value.parse::<u64>().map_err(|_| {
            AppError::Swap(SwapError::InvalidResponse(format!(
                "non-integer {field}: {value}"
            )))
        })
    }
}

#[async_trait]
impl SwapClient for JupiterSwapClient {
    #[instrument(skip(self))]
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_in: u64,
    ) -> Result<SwapQuote, AppError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.config.api_url, input_mint, output_mint, amount_in, self.config.slippage_bps
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(Self::map_http_error)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::map_http_error)?;
        Self::check_status(status, &body)?;

        let quote: JupiterQuoteResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Swap(SwapError::InvalidResponse(e.to_string())))?;

        let in_amount = Self::parse_amount(&quote.in_amount, "inAmount")?;
        let out_amount = Self::parse_amount(&quote.out_amount, "outAmount")?;
        let price_impact_pct = quote.price_impact_pct.and_then(|p| p.parse::<f64>().ok());
        let expires_at = Utc::now() + Duration::seconds(self.config.quote_ttl_secs);

        debug!(in_amount, out_amount, %expires_at, "Quote fetched");
        Ok(SwapQuote {
            input_mint: quote.input_mint,
            output_mint: quote.output_mint,
            in_amount,
            out_amount,
            price_impact_pct,
            expires_at,
        })
    }

    #[instrument(skip(self, quote))]
    async fn build_swap_transaction(
        &self,
        quote: &SwapQuote,
        signer_address: &str,
    ) -> Result<String, AppError> {
        let quote_response = serde_json::json!({
            "inputMint": quote.input_mint,
            "inAmount": quote.in_amount.to_string(),
            "outputMint": quote.output_mint,
            "outAmount": quote.out_amount.to_string(),
            "otherAmountThreshold": quote.out_amount.to_string(),
            "swapMode": "ExactIn",
            "slippageBps": self.config.slippage_bps,
            "priceImpactPct": quote
                .price_impact_pct
                .map(|p| p.to_string())
                .unwrap_or_else(|| "0".to_string()),
            "routePlan": [],
        });
        let response = self
            .http
            .post(format!("{}/swap", self.config.api_url))
            .json(&serde_json::json!({
                "quoteResponse": quote_response,
                "userPublicKey": signer_address,
                "wrapAndUnwrapSol": true,
            }))
            .send()
            .await
            .map_err(Self::map_http_error)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::map_http_error)?;
        Self::check_status(status, &body)?;

        let swap: JupiterSwapResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Swap(SwapError::InvalidResponse(e.to_string())))?;
        Ok(swap.swap_transaction)
    }

    #[instrument(skip(self, signed_transaction))]
    async fn submit_signed(&self, signed_transaction: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "sendTransaction",
                "params": [signed_transaction, { "encoding": "base64" }],
            }))
            .send()
            .await
            .map_err(Self::map_http_error)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::map_http_error)?;
        Self::check_status(status, &body)?;

        let rpc: JsonRpcResponse<String> = serde_json::from_str(&body)
            .map_err(|e| AppError::Swap(SwapError::InvalidResponse(e.to_string())))?;
        if let Some(err) = rpc.error {
            // A JSON-RPC error here is a real rejection of the payload,
            // not a transport failure.
            warn!(message = %err.message, "sendTransaction rejected");
            return Err(AppError::Swap(SwapError::Rejected(err.message)));
        }
        rpc.result.ok_or_else(|| {
            AppError::Swap(SwapError::InvalidResponse(
                "sendTransaction returned neither result nor error".to_string(),
            ))
        })
    }
}
