//! Core data model shared by every component.
//!
//! Everything downstream of the ingester operates on these fully-typed
//! values; nothing past `ingest::normalize` ever looks at raw exchange JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A third-party address whose activity the engine copies. Stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetWallet(pub String);

impl TargetWallet {
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self(addr.as_ref().trim().to_lowercase())
    }
}

impl fmt::Display for TargetWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Raw activity kinds the exchange reports. `Reward`/`Conversion`/`MakerRebate`
/// are filtered upstream in `ingest::normalize` and never construct an
/// `ActivityEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityType {
    Trade,
    Split,
    Merge,
    Redeem,
}

impl ActivityType {
    /// SPLIT maps to BUY and MERGE/REDEEM to SELL for replication purposes.
    pub fn replication_side(self, trade_side: Option<Side>) -> Side {
        match self {
            ActivityType::Split => Side::Buy,
            ActivityType::Merge | ActivityType::Redeem => Side::Sell,
            ActivityType::Trade => trade_side.unwrap_or(Side::Buy),
        }
    }
}

/// Immutable record produced by the ingester (C7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub target_wallet: TargetWallet,
    /// Stable dedup key: transaction-hash × token × side × size.
    pub trade_id: String,
    /// Milliseconds, UTC.
    pub timestamp_ms: i64,
    pub token_id: String,
    pub condition_id: String,
    pub market_slug: String,
    pub outcome: Outcome,
    pub side: Side,
    /// In [0, 1].
    pub price: f64,
    pub size_shares: f64,
    pub activity_type: ActivityType,
}

impl ActivityEvent {
    pub fn notional_usd(&self) -> f64 {
        self.price * self.size_shares
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_ms).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Gtc,
}

/// An order about to be (or already) submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub token_id: String,
    pub side: Side,
    /// Rounded to tick, clamped to [0.01, 0.99].
    pub limit_price: f64,
    pub size: f64,
    pub order_type: OrderType,
    pub order_id: Option<String>,
    pub error_message: Option<String>,
}

impl Order {
    pub fn new(token_id: impl Into<String>, side: Side, limit_price: f64, size: f64) -> Self {
        Self {
            token_id: token_id.into(),
            side,
            limit_price,
            size,
            order_type: OrderType::Gtc,
            order_id: None,
            error_message: None,
        }
    }
}

/// At-most-one Fill per Order in the core's view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub executed_price: f64,
    pub executed_size: f64,
    pub fees: f64,
    pub latency_ms: u64,
}

/// Keyed by `token_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token_id: String,
    pub condition_id: String,
    pub outcome: Outcome,
    pub shares: f64,
    pub total_cost: f64,
    pub current_price: Option<f64>,
    pub fees_paid: f64,
    pub opened_at: DateTime<Utc>,
    pub settled: bool,
    pub settlement_pnl: Option<f64>,
}

impl Position {
    pub fn new(token_id: impl Into<String>, condition_id: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            token_id: token_id.into(),
            condition_id: condition_id.into(),
            outcome,
            shares: 0.0,
            total_cost: 0.0,
            current_price: None,
            fees_paid: 0.0,
            opened_at: Utc::now(),
            settled: false,
            settlement_pnl: None,
        }
    }

    pub fn avg_entry_price(&self) -> f64 {
        if self.shares > 0.0 {
            self.total_cost / self.shares
        } else {
            0.0
        }
    }
}

/// Append-only ledger entry. The system of record for paper mode; in live
/// mode it is a derived copy of what the exchange reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub token_id: String,
    pub condition_id: String,
    pub side: Side,
    pub price: f64,
    pub shares: f64,
    pub usd_value: f64,
    pub fees: f64,
    pub pnl: Option<f64>,
    pub target_wallet: Option<TargetWallet>,
    pub trade_id: Option<String>,
}

/// A single equity point appended to the bounded snapshot history (C11).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_pnl: f64,
}

/// Signature scheme used to authorize orders for a given wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    Eoa = 0,
    MagicProxy = 1,
    SafeProxy = 2,
}

/// Signing/API credentials for one account. The private key is treated as
/// opaque bytes (file-format details of key storage are out of scope); it is
/// read-only once the account is activated.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub account_id: String,
    pub private_key: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
    pub funder_address: Option<String>,
    pub signature_type: SignatureType,
}

impl AccountConfig {
    /// Reads credentials from the environment, matching the wallet's own
    /// `.env` convention. Returns `None` (not an error) when the required
    /// vars are absent — the Mode Controller (C10) treats that as "no
    /// active account" and resolves PAPER/DRY_RUN accordingly.
    pub fn from_env() -> Option<Self> {
        let account_id = std::env::var("POLY_ADDRESS").ok()?;
        let private_key = std::env::var("POLY_PRIVATE_KEY").ok()?;
        let api_key = std::env::var("POLY_API_KEY").ok()?;
        let api_secret = std::env::var("POLY_API_SECRET").ok()?;
        let api_passphrase = std::env::var("POLY_PASSPHRASE").ok()?;
        let funder_address = std::env::var("POLY_FUNDER_ADDRESS").ok();
        let signature_type = match std::env::var("POLY_SIGNATURE_TYPE").as_deref() {
            Ok("0") => SignatureType::Eoa,
            Ok("1") => SignatureType::MagicProxy,
            _ => SignatureType::SafeProxy,
        };

        Some(Self {
            account_id,
            private_key,
            api_key,
            api_secret,
            api_passphrase,
            funder_address,
            signature_type,
        })
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("account_id", &self.account_id)
            .field("api_key", &self.api_key)
            .field("private_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("api_passphrase", &"[REDACTED]")
            .field("funder_address", &self.funder_address)
            .field("signature_type", &self.signature_type)
            .finish()
    }
}

/// Reasons the risk manager or pre-flight checks can reject a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    BelowMinimumShares,
    MaxUsdPerMarketExceeded,
    MaxDailyUsdVolumeExceeded,
    MarketDenied,
    MarketNotAllowlisted,
    InsufficientFunds,
    InsufficientShares,
    RateLimited,
    ExchangeRejected(String),
    ParseError,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BelowMinimumShares => write!(f, "below_minimum_shares"),
            SkipReason::MaxUsdPerMarketExceeded => write!(f, "max_usd_per_market_exceeded"),
            SkipReason::MaxDailyUsdVolumeExceeded => write!(f, "max_daily_usd_volume_exceeded"),
            SkipReason::MarketDenied => write!(f, "market_denied"),
            SkipReason::MarketNotAllowlisted => write!(f, "market_not_allowlisted"),
            SkipReason::InsufficientFunds => write!(f, "insufficient_funds"),
            SkipReason::InsufficientShares => write!(f, "insufficient_shares"),
            SkipReason::RateLimited => write!(f, "rate_limited"),
            SkipReason::ExchangeRejected(msg) => write!(f, "exchange_rejected: {msg}"),
            SkipReason::ParseError => write!(f, "parse_error"),
        }
    }
}

/// The outcome of handing one `ActivityEvent` through the risk + executor
/// pipeline. The executor never propagates a rejection as an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Executed(Fill),
    Skipped(SkipReason),
    Failed(String),
}
