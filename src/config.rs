//! Layered config surface: `config.json` (this struct) loaded with
//! `serde_json`, overlaid with `.env` secrets for account credentials.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeFlag {
    Paper,
    Live,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizingMode {
    Proportional,
    FixedUsd,
    FixedShares,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub sizing_mode: SizingMode,
    pub fixed_usd_size: f64,
    pub fixed_shares_size: f64,
    pub proportional_multiplier: f64,
    pub min_order_size: f64,
    pub min_order_shares: f64,
    pub slippage: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            sizing_mode: SizingMode::Proportional,
            fixed_usd_size: 10.0,
            fixed_shares_size: 10.0,
            proportional_multiplier: 1.0,
            min_order_size: 1.0,
            min_order_shares: 5.0,
            slippage: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_usd_per_trade: f64,
    pub max_usd_per_market: f64,
    pub max_daily_usd_volume: f64,
    pub market_allowlist: Vec<String>,
    pub market_denylist: Vec<String>,
    pub dry_run: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_usd_per_trade: 500.0,
            max_usd_per_market: 2_000.0,
            max_daily_usd_volume: 10_000.0,
            market_allowlist: Vec::new(),
            market_denylist: Vec::new(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub trade_limit: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            trade_limit: 20,
            max_retries: 5,
            base_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperTradingConfig {
    pub starting_balance: f64,
    pub fee_rate: f64,
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
            fee_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopLossConfig {
    pub enabled: bool,
    pub percent: f64,
    pub check_interval_ms: u64,
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            percent: 0.5,
            check_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRedeemConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for AutoRedeemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5 * 60_000,
        }
    }
}

/// Optional aggregation window (C8); `0` disables the component entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub window_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { window_ms: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub targets: Vec<String>,
    pub mode: ModeFlag,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub polling: PollingConfig,
    pub paper_trading: PaperTradingConfig,
    pub stop_loss: StopLossConfig,
    pub auto_redeem: AutoRedeemConfig,
    pub aggregation: AggregationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            mode: ModeFlag::Paper,
            trading: TradingConfig::default(),
            risk: RiskConfig::default(),
            polling: PollingConfig::default(),
            paper_trading: PaperTradingConfig::default(),
            stop_loss: StopLossConfig::default(),
            auto_redeem: AutoRedeemConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl Config {
    /// Loads `config.json` if present, falling back to defaults so a missing
    /// file still boots in PAPER mode.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::store::write_json_atomic(path, self)
    }
}

/// Resolves the writable data directory from `POLYCOPY_DATA_DIR`, default `./data`.
pub fn data_dir() -> PathBuf {
    std::env::var("POLYCOPY_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}

pub fn config_path() -> PathBuf {
    std::env::var("POLYCOPY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(cfg.mode, ModeFlag::Paper);
        assert_eq!(cfg.trading.sizing_mode, SizingMode::Proportional);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config::default();
        cfg.targets.push("0xabc".to_string());
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.targets, vec!["0xabc".to_string()]);
    }
}
