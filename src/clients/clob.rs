//! Read-only HTTP surface: activity feed, market metadata, positions, trades.
//! Everything here is unauthenticated GET traffic; order submission and the
//! authenticated balance/trades reads live in `execution::live` next to the
//! HMAC signing they require.

use crate::net::{Backoff, Throttle};
use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const CLOB_API_BASE: &str = "https://clob.polymarket.com";
const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

const MAX_RETRIES: u32 = 3;

/// One row of `GET /activity`. Field names match the wire payload; this is
/// normalized into an `ActivityEvent` by `ingest::normalize`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawActivity {
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    pub asset: String,
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(rename = "eventSlug", default)]
    pub event_slug: Option<String>,
    pub outcome: String,
    #[serde(rename = "outcomeIndex", default)]
    pub outcome_index: Option<i64>,
    #[serde(default)]
    pub side: Option<String>,
    pub price: f64,
    pub size: f64,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub activity_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub slug: String,
    #[serde(rename = "clobTokenIds", default)]
    pub clob_token_ids: Option<String>,
    #[serde(rename = "outcomePrices", default)]
    pub outcome_prices: Option<String>,
    #[serde(default)]
    pub outcomes: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(rename = "asset", alias = "token_id", default)]
    pub token_id: String,
    #[serde(default)]
    pub size: f64,
    #[serde(rename = "avgPrice", alias = "avg_price", default)]
    pub avg_price: f64,
    #[serde(rename = "curPrice", alias = "cur_price", default)]
    pub current_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub id: String,
    pub asset_id: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    pub market: String,
    pub match_time: String,
    pub outcome: String,
    #[serde(default)]
    pub fee_rate_bps: f64,
}

pub struct ClobClient {
    client: Client,
    throttle: Arc<Throttle>,
}

impl ClobClient {
    pub fn new(throttle: Arc<Throttle>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("polycopy-engine/0.1")
            .build()
            .expect("failed to build HTTP client");
        Self { client, throttle }
    }

    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    pub async fn fetch_activity(&self, user: &str, limit: usize) -> Result<Vec<RawActivity>> {
        let url = format!("{DATA_API_BASE}/activity");
        let params = HashMap::from([
            ("user", user.to_string()),
            ("limit", limit.to_string()),
            ("sortBy", "TIMESTAMP".to_string()),
            ("sortDirection", "DESC".to_string()),
        ]);
        let response = self.execute_with_retry(&url, &params).await?;
        response.json().await.context("parsing activity feed")
    }

    pub async fn fetch_market_by_slug(&self, slug: &str) -> Result<Option<GammaMarket>> {
        let url = format!("{GAMMA_API_BASE}/markets/{slug}");
        if let Ok(response) = self.execute_with_retry(&url, &HashMap::new()).await {
            if let Ok(market) = response.json::<GammaMarket>().await {
                return Ok(Some(market));
            }
        }
        // Fallback: some slugs are event slugs, not market slugs.
        let url = format!("{GAMMA_API_BASE}/events");
        let params = HashMap::from([("slug", slug.to_string())]);
        let response = self.execute_with_retry(&url, &params).await?;
        #[derive(Deserialize)]
        struct EventWrapper {
            #[serde(default)]
            markets: Vec<GammaMarket>,
        }
        let events: Vec<EventWrapper> = response.json().await.context("parsing events fallback")?;
        Ok(events.into_iter().next().and_then(|e| e.markets.into_iter().next()))
    }

    pub async fn fetch_markets_by_token(&self, token_ids: &[String]) -> Result<Vec<GammaMarket>> {
        let url = format!("{GAMMA_API_BASE}/markets");
        let params = HashMap::from([("clob_token_ids", token_ids.join(","))]);
        let response = self.execute_with_retry(&url, &params).await?;
        response.json().await.context("parsing markets-by-token")
    }

    pub async fn fetch_positions(&self, user: &str) -> Result<Vec<RawPosition>> {
        let url = format!("{DATA_API_BASE}/positions");
        let params = HashMap::from([
            ("user", user.to_string()),
            ("sortBy", "CURRENT".to_string()),
            ("sizeThreshold", "0.1".to_string()),
            ("limit", "500".to_string()),
            ("offset", "0".to_string()),
        ]);
        let response = self.execute_with_retry(&url, &params).await?;
        response.json().await.context("parsing positions")
    }

    async fn execute_with_retry(
        &self,
        url: &str,
        params: &HashMap<&str, String>,
    ) -> Result<reqwest::Response> {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30));

        for attempt in 0..MAX_RETRIES {
            let response = self.client.get(url).query(params).send().await;
            match response {
                Ok(resp) if resp.status().is_success() => {
                    self.throttle.note_success();
                    return Ok(resp);
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    self.throttle.note_rate_limited();
                    warn!(url, attempt, "rate limited, backing off");
                    tokio::time::sleep(backoff.next_delay() * 10).await;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    bail!("API error {status}: {text}");
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "request failed, retrying");
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            }
        }
        bail!("max retries exceeded for {url}")
    }
}
