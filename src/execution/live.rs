//! LIVE execution path (C6): real order submission to the Polymarket CLOB,
//! gated behind the Polymarket L2 HMAC authentication scheme: a base64
//! URL-safe-then-standard decode chain for the HMAC secret, an
//! `"{timestamp}{method}{path}{body}"` signing message, a redacting `Debug`
//! impl so credentials never land in logs, and an
//! `orderID-or-non-empty-transactionsHashes` success rule. Pre-flight
//! balance/share checks and tick-size rounding against the per-token
//! `feeRateBps` served by the Market-Params Cache (C3) run in front of it.

use super::{ExecutionAdapter, OrderContext};
use crate::cache::MarketParamsCache;
use crate::models::{AccountConfig, ExecutionOutcome, Fill, Order, Side, SkipReason};
use crate::net::Throttle;
use anyhow::{anyhow, Context, Result};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const HOSTS: &[&str] = &["https://clob.polymarket.com"];

#[derive(Serialize)]
struct ClobOrderPayload {
    #[serde(rename = "tokenID")]
    token_id: String,
    price: String,
    size: String,
    side: String,
    #[serde(rename = "orderType")]
    order_type: String,
}

#[derive(Debug, Deserialize, Default)]
struct ClobOrderResponse {
    #[serde(rename = "orderID", alias = "orderId", alias = "order_id", default)]
    order_id: Option<String>,
    #[serde(rename = "transactionsHashes", default)]
    transactions_hashes: Vec<String>,
    #[serde(rename = "errorMsg", alias = "error", alias = "message", default)]
    error_msg: Option<String>,
}

#[derive(Clone)]
pub struct LiveExecutionAdapter {
    client: Client,
    account: Arc<AccountConfig>,
    params: Arc<MarketParamsCache>,
    throttle: Arc<Throttle>,
    host_idx: Arc<AtomicUsize>,
    slippage: f64,
}

impl std::fmt::Debug for LiveExecutionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveExecutionAdapter")
            .field("account_id", &self.account.account_id)
            .field("host", &self.host())
            .finish()
    }
}

impl LiveExecutionAdapter {
    pub fn new(
        account: Arc<AccountConfig>,
        params: Arc<MarketParamsCache>,
        throttle: Arc<Throttle>,
        slippage: f64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            account,
            params,
            throttle,
            host_idx: Arc::new(AtomicUsize::new(0)),
            slippage,
        }
    }

    fn host(&self) -> &'static str {
        HOSTS[self.host_idx.load(Ordering::Relaxed) % HOSTS.len()]
    }

    fn rotate_host(&self) {
        self.host_idx.fetch_add(1, Ordering::Relaxed);
    }

    /// Decodes the HMAC secret trying URL-safe-with-padding, then
    /// URL-safe-no-pad, then standard, matching the defensive chain the
    /// CLOB's own client libraries use.
    fn decode_secret(&self) -> Result<Vec<u8>> {
        URL_SAFE
            .decode(&self.account.api_secret)
            .or_else(|_| URL_SAFE_NO_PAD.decode(&self.account.api_secret))
            .or_else(|_| STANDARD.decode(&self.account.api_secret))
            .context("failed to decode CLOB secret")
    }

    fn sign_request(&self, method: &str, path: &str, body: &str, timestamp: i64) -> Result<String> {
        let message = format!("{timestamp}{method}{path}{body}");
        let secret_bytes = self.decode_secret()?;
        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| anyhow!("HMAC key error: {e}"))?;
        mac.update(message.as_bytes());
        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Result<Vec<(String, String)>> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign_request(method, path, body, timestamp)?;
        let address = self.account.funder_address.clone().unwrap_or_default();
        Ok(vec![
            ("POLY_ADDRESS".to_string(), address),
            ("POLY_API_KEY".to_string(), self.account.api_key.clone()),
            ("POLY_SIGNATURE".to_string(), signature),
            ("POLY_TIMESTAMP".to_string(), timestamp.to_string()),
            ("POLY_PASSPHRASE".to_string(), self.account.api_passphrase.clone()),
        ])
    }

    /// `GET /balance-allowance`, micro-USDC (6 decimals) normalized to USD.
    pub async fn fetch_usdc_balance(&self) -> Result<f64> {
        let path = "/balance-allowance?signature_type=2";
        let headers = self.auth_headers("GET", path, "")?;
        let url = format!("{}{}", self.host(), path);

        let mut request = self.client.get(&url);
        for (k, v) in headers {
            request = request.header(&k, &v);
        }
        let response = request.send().await.context("balance request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("balance request failed ({status}): {text}"));
        }
        let raw: serde_json::Value = response.json().await.context("parsing balance response")?;
        let balance = raw
            .get("balance")
            .and_then(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| v.as_f64()))
            .map(|v| if v > 1_000.0 { v / 1_000_000.0 } else { v })
            .unwrap_or(0.0);
        Ok(balance)
    }

    async fn ensure_usdc_balance(&self) -> Result<f64> {
        if let Some(b) = self.params.get_usdc_balance() {
            return Ok(b);
        }
        let balance = self.fetch_usdc_balance().await?;
        self.params.put_usdc_balance(balance);
        Ok(balance)
    }

    /// `GET /positions` filtered to the requested token, used for the SELL
    /// pre-flight check.
    async fn fetch_share_balance(&self, token_id: &str) -> Result<f64> {
        let address = self.account.funder_address.clone().unwrap_or_default();
        let path = format!("/positions?address={address}");
        let headers = self.auth_headers("GET", &path, "")?;
        let url = format!("{}{}", self.host(), path);

        let mut request = self.client.get(&url);
        for (k, v) in headers {
            request = request.header(&k, &v);
        }
        let response = request.send().await.context("positions request failed")?;
        if !response.status().is_success() {
            return Ok(0.0);
        }
        #[derive(Deserialize)]
        struct Row {
            #[serde(rename = "asset", alias = "token_id", default)]
            token_id: String,
            #[serde(default)]
            size: f64,
        }
        let rows: Vec<Row> = response.json().await.unwrap_or_default();
        Ok(rows.into_iter().find(|r| r.token_id == token_id).map(|r| r.size).unwrap_or(0.0))
    }

    async fn ensure_share_balance(&self, token_id: &str) -> Result<f64> {
        if let Some(b) = self.params.get_share_balance(token_id) {
            return Ok(b);
        }
        let balance = self.fetch_share_balance(token_id).await?;
        self.params.put_share_balance(token_id, balance);
        Ok(balance)
    }
}

#[async_trait::async_trait]
impl ExecutionAdapter for LiveExecutionAdapter {
    async fn execute(&self, order: Order, _ctx: OrderContext) -> ExecutionOutcome {
        let _key_guard = self.throttle.key_guard(&order.token_id).await;
        self.throttle.acquire().await;

        let params = self.params.get_params(&order.token_id).unwrap_or_default();

        let slipped = match order.side {
            Side::Buy => order.limit_price * (1.0 + self.slippage),
            Side::Sell => order.limit_price * (1.0 - self.slippage),
        };
        let tick = params.tick_size.max(0.0001);
        let rounded = (slipped / tick).round() * tick;
        let limit_price = rounded.clamp(0.01, 0.99);

        let notional = limit_price * order.size;
        match order.side {
            Side::Buy => match self.ensure_usdc_balance().await {
                Ok(balance) if balance < 1.01 * notional => {
                    return ExecutionOutcome::Skipped(SkipReason::InsufficientFunds)
                }
                Err(e) => {
                    warn!(error = %e, "balance pre-flight failed");
                    return ExecutionOutcome::Failed(e.to_string());
                }
                _ => {}
            },
            Side::Sell => match self.ensure_share_balance(&order.token_id).await {
                Ok(shares) if shares < order.size => {
                    return ExecutionOutcome::Skipped(SkipReason::InsufficientShares)
                }
                Err(e) => {
                    warn!(error = %e, "share balance pre-flight failed");
                    return ExecutionOutcome::Failed(e.to_string());
                }
                _ => {}
            },
        }

        let payload = ClobOrderPayload {
            token_id: order.token_id.clone(),
            price: format!("{limit_price:.4}"),
            size: format!("{:.6}", order.size),
            side: match order.side {
                Side::Buy => "BUY".to_string(),
                Side::Sell => "SELL".to_string(),
            },
            order_type: "GTC".to_string(),
        };
        let body = match serde_json::to_string(&payload) {
            Ok(b) => b,
            Err(e) => return ExecutionOutcome::Failed(e.to_string()),
        };
        let path = "/order";

        let headers = match self.auth_headers("POST", path, &body) {
            Ok(h) => h,
            Err(e) => return ExecutionOutcome::Failed(e.to_string()),
        };
        let url = format!("{}{}", self.host(), path);

        debug!(token_id = %order.token_id, side = ?order.side, price = limit_price, size = order.size, "submitting live order");

        let start = std::time::Instant::now();
        let mut request = self.client.post(&url).header("Content-Type", "application/json");
        for (k, v) in headers {
            request = request.header(&k, &v);
        }
        let response = match request.body(body).send().await {
            Ok(r) => r,
            Err(e) => return ExecutionOutcome::Failed(e.to_string()),
        };
        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.throttle.note_rate_limited();
            self.rotate_host();
            return ExecutionOutcome::Skipped(SkipReason::RateLimited);
        }

        let resp_text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            self.throttle.note_success();
            let message = normalize_error_body(&resp_text);
            return ExecutionOutcome::Skipped(SkipReason::ExchangeRejected(message));
        }
        self.throttle.note_success();

        let parsed: ClobOrderResponse = match serde_json::from_str(&resp_text) {
            Ok(p) => p,
            Err(_) => {
                return ExecutionOutcome::Skipped(SkipReason::ExchangeRejected(normalize_error_body(
                    &resp_text,
                )))
            }
        };

        let success = parsed.order_id.is_some() || !parsed.transactions_hashes.is_empty();
        if !success {
            let message = parsed.error_msg.unwrap_or_else(|| "order rejected".to_string());
            return ExecutionOutcome::Skipped(SkipReason::ExchangeRejected(message));
        }

        self.params.invalidate_position(&order.token_id);

        let order_id = parsed
            .order_id
            .unwrap_or_else(|| parsed.transactions_hashes.first().cloned().unwrap_or_default());
        let fee_rate = if params.fee_rate_bps > 0.0 {
            params.fee_rate_bps / 10_000.0
        } else {
            0.005
        };
        let fees = notional * fee_rate;

        info!(order_id = %order_id, latency_ms, "live order filled");

        ExecutionOutcome::Executed(Fill {
            order_id,
            executed_price: limit_price,
            executed_size: order.size,
            fees,
            latency_ms,
        })
    }
}

/// An HTML error page (seen when a CDN blocks or rate-limits the request
/// before it reaches the CLOB) is normalized to a stable message rather
/// than surfaced raw.
fn normalize_error_body(body: &str) -> String {
    if body.trim_start().starts_with("<!DOCTYPE") {
        "API rate limited or blocked".to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_error_body_is_normalized() {
        assert_eq!(
            normalize_error_body("<!DOCTYPE html><html></html>"),
            "API rate limited or blocked"
        );
    }

    #[test]
    fn plain_error_body_passes_through() {
        assert_eq!(normalize_error_body("invalid signature"), "invalid signature");
    }

    #[test]
    fn secret_decode_tries_url_safe_then_standard() {
        let account = Arc::new(AccountConfig {
            account_id: "acct-1".into(),
            private_key: "unused".into(),
            api_key: "key".into(),
            api_secret: base64::engine::general_purpose::STANDARD.encode("super-secret+/="),
            api_passphrase: "pass".into(),
            funder_address: Some("0xfeed".into()),
            signature_type: crate::models::SignatureType::Eoa,
        });
        let adapter = LiveExecutionAdapter::new(
            account,
            Arc::new(MarketParamsCache::new()),
            Arc::new(Throttle::new(Duration::from_millis(1))),
            0.02,
        );
        assert!(adapter.decode_secret().is_ok());
    }
}
