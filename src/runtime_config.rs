// =============================================================================
// Runtime Configuration — engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Colosseum engine. Recognized sections:
// trading, risk, worker, autonomous, paths.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{RiskLimits, TradeMode};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_starting_capital_usd() -> f64 {
    10_000.0
}

fn default_platform_fee_bps() -> f64 {
    8.0
}

fn default_taker_fee_bps() -> f64 {
    2.0
}

fn default_supported_symbols() -> Vec<String> {
    vec![
        "SOL".to_string(),
        "BTC".to_string(),
        "ETH".to_string(),
        "JUP".to_string(),
        "BONK".to_string(),
    ]
}

fn default_max_position_size_pct() -> f64 {
    20.0
}

fn default_max_order_notional_usd() -> f64 {
    5_000.0
}

fn default_max_gross_exposure_usd() -> f64 {
    25_000.0
}

fn default_daily_loss_cap_usd() -> f64 {
    500.0
}

fn default_max_drawdown_pct() -> f64 {
    0.25
}

fn default_cooldown_seconds() -> i64 {
    0
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_max_batch_size() -> usize {
    10
}

fn default_max_drawdown_stop_pct() -> f64 {
    0.35
}

fn default_cooldown_ms() -> i64 {
    60_000
}

fn default_cooldown_after_consecutive_failures() -> u32 {
    5
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_state_file() -> String {
    "state.json".to_string()
}

fn default_log_file() -> String {
    "engine.log".to_string()
}

// =============================================================================
// Sections
// =============================================================================

/// Trading defaults applied when a request does not specify its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Cash seeded into a freshly registered agent.
    #[serde(default = "default_starting_capital_usd")]
    pub default_starting_capital_usd: f64,

    /// Mode used when an intent does not request one.
    #[serde(default)]
    pub default_mode: TradeMode,

    /// Platform fee in basis points, applied in every mode.
    #[serde(default = "default_platform_fee_bps")]
    pub platform_fee_bps: f64,

    /// Taker fee in basis points, applied on live fills only.
    #[serde(default = "default_taker_fee_bps")]
    pub taker_fee_bps: f64,

    /// Symbols the platform quotes.
    #[serde(default = "default_supported_symbols")]
    pub supported_symbols: Vec<String>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            default_starting_capital_usd: default_starting_capital_usd(),
            default_mode: TradeMode::Paper,
            platform_fee_bps: default_platform_fee_bps(),
            taker_fee_bps: default_taker_fee_bps(),
            supported_symbols: default_supported_symbols(),
        }
    }
}

/// Risk limits seeded into agents that do not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,

    #[serde(default = "default_max_order_notional_usd")]
    pub max_order_notional_usd: f64,

    #[serde(default = "default_max_gross_exposure_usd")]
    pub max_gross_exposure_usd: f64,

    #[serde(default = "default_daily_loss_cap_usd")]
    pub daily_loss_cap_usd: f64,

    /// Drawdown fraction (0.25 == 25 %).
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,

    /// Minimum seconds between an agent's trades; 0 disables the cooldown.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size_pct: default_max_position_size_pct(),
            max_order_notional_usd: default_max_order_notional_usd(),
            max_gross_exposure_usd: default_max_gross_exposure_usd(),
            daily_loss_cap_usd: default_daily_loss_cap_usd(),
            max_drawdown_pct: default_max_drawdown_pct(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl RiskConfig {
    /// Per-agent limits seeded from this section.
    pub fn to_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position_size_pct: self.max_position_size_pct,
            max_order_notional_usd: self.max_order_notional_usd,
            max_gross_exposure_usd: self.max_gross_exposure_usd,
            daily_loss_cap_usd: self.daily_loss_cap_usd,
            max_drawdown_pct: self.max_drawdown_pct,
            cooldown_seconds: self.cooldown_seconds,
        }
    }
}

/// Execution worker pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Pending intents drained per tick.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Autonomous guard thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousConfig {
    /// Drawdown fraction at which the agent is halted outright.
    #[serde(default = "default_max_drawdown_stop_pct")]
    pub max_drawdown_stop_pct: f64,

    /// Length of the cooldown window opened by a failure streak.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: i64,

    /// Failure streak length that opens a cooldown window.
    #[serde(default = "default_cooldown_after_consecutive_failures")]
    pub cooldown_after_consecutive_failures: u32,
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            max_drawdown_stop_pct: default_max_drawdown_stop_pct(),
            cooldown_ms: default_cooldown_ms(),
            cooldown_after_consecutive_failures: default_cooldown_after_consecutive_failures(),
        }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_state_file")]
    pub state_file: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_file: default_state_file(),
            log_file: default_log_file(),
        }
    }
}

impl PathsConfig {
    /// Full path of the persisted state snapshot.
    pub fn state_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.state_file)
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Colosseum engine.
///
/// Every field has a serde default so that older JSON files missing new
/// sections will still deserialize correctly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub trading: TradingConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub autonomous: AutonomousConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.trading.supported_symbols,
            default_mode = %config.trading.default_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialize runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
