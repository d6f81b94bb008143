// =============================================================================
// Shared domain types used across the Colosseum trading engine
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order primitives
// ---------------------------------------------------------------------------

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Whether a fill is simulated against the in-memory price or routed to a
/// live venue by the periphery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Paper,
    Live,
}

impl Default for TradeMode {
    fn default() -> Self {
        Self::Paper
    }
}

impl std::fmt::Display for TradeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Live => write!(f, "live"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade intent
// ---------------------------------------------------------------------------

/// Lifecycle state of a trade intent. Terminal states are never re-processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Executed,
    Rejected,
    Failed,
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Executed => write!(f, "executed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A request to buy or sell, carrying exactly one of `quantity` or
/// `notional_usd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub agent_id: String,
    /// Uppercase symbol, normalized at creation.
    pub symbol: String,
    pub side: Side,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub notional_usd: Option<f64>,
    #[serde(default)]
    pub requested_mode: TradeMode,
    /// Opaque attributes attached by the caller; the core never inspects them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub status: IntentStatus,
    /// Reason string for terminal non-success states.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Monotonic sequence assigned under the writer lock. Orders intents
    /// deterministically even when two share a creation millisecond.
    #[serde(default)]
    pub seq: u64,
    pub created_at: i64,
    pub updated_at: i64,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Terminal status of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Filled,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filled => write!(f, "filled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of processing an intent. `net_usd` is signed: negative for buys,
/// positive for sells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub intent_id: String,
    pub agent_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price_usd: f64,
    pub gross_notional_usd: f64,
    pub fee_usd: f64,
    pub net_usd: f64,
    /// Realized P&L contributed by this fill alone.
    #[serde(default)]
    pub realized_pnl_usd: f64,
    /// Lifetime realized P&L of the agent at the time of the fill.
    #[serde(default)]
    pub pnl_snapshot_usd: f64,
    pub mode: TradeMode,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Opaque venue signature when the periphery routes live fills.
    #[serde(default)]
    pub tx_signature: Option<String>,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Agent ledger
// ---------------------------------------------------------------------------

/// A single held position. Removed from the agent when quantity reaches zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price_usd: f64,
}

/// Per-agent risk limits consulted by the risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Carried for periphery position sizing; no core gate consumes it.
    pub max_position_size_pct: f64,
    pub max_order_notional_usd: f64,
    pub max_gross_exposure_usd: f64,
    pub daily_loss_cap_usd: f64,
    /// Drawdown fraction (0.25 == 25 %) beyond which new orders are refused.
    pub max_drawdown_pct: f64,
    pub cooldown_seconds: i64,
}

/// Identity and ledger of a trading participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Opaque authentication token issued at registration.
    pub api_key: String,
    pub starting_capital_usd: f64,
    /// Current free cash.
    pub cash_usd: f64,
    /// Lifetime realized P&L.
    #[serde(default)]
    pub realized_pnl_usd: f64,
    /// All-time high of equity, refreshed at trade time.
    pub peak_equity_usd: f64,
    #[serde(default)]
    pub positions: HashMap<String, Position>,
    /// Signed realized P&L per UTC calendar day (`YYYY-MM-DD`).
    #[serde(default)]
    pub daily_realized_pnl_usd: HashMap<String, f64>,
    pub risk_limits: RiskLimits,
    #[serde(default)]
    pub last_trade_at: Option<i64>,
    #[serde(default)]
    pub risk_rejections_by_reason: HashMap<String, u64>,
    #[serde(default)]
    pub strategy_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Agent {
    /// Mark-to-market equity: cash plus position values at the given prices.
    /// Positions without a quoted price fall back to their average entry.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let held: f64 = self
            .positions
            .values()
            .map(|p| {
                let price = prices
                    .get(&p.symbol)
                    .copied()
                    .unwrap_or(p.avg_entry_price_usd);
                p.quantity * price
            })
            .sum();
        self.cash_usd + held
    }

    /// Sum of absolute position values in USD.
    pub fn gross_exposure(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|p| {
                let price = prices
                    .get(&p.symbol)
                    .copied()
                    .unwrap_or(p.avg_entry_price_usd);
                p.quantity.abs() * price
            })
            .sum()
    }

    /// Drawdown fraction from the recorded peak, clamped at zero.
    pub fn drawdown_pct(&self, prices: &HashMap<String, f64>) -> f64 {
        if self.peak_equity_usd <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity_usd - self.equity(prices)) / self.peak_equity_usd).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

/// Registry entry for a client-supplied idempotency key, keyed by
/// `(agent_id, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub intent_id: String,
    /// Canonical hash of the request payload, compared on key reuse.
    pub payload_fingerprint: String,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One observed price sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts_ms: i64,
    pub price_usd: f64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Which side of the threshold fires a price alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Above,
    Below,
}

impl std::fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Above => write!(f, "above"),
            Self::Below => write!(f, "below"),
        }
    }
}

/// One-shot price alert. Deleted automatically once triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub agent_id: String,
    pub symbol: String,
    pub threshold_usd: f64,
    pub direction: AlertDirection,
    pub created_at: i64,
}

impl Alert {
    /// Whether the given price crosses this alert's threshold.
    pub fn is_triggered_by(&self, price_usd: f64) -> bool {
        match self.direction {
            AlertDirection::Above => price_usd >= self.threshold_usd,
            AlertDirection::Below => price_usd <= self.threshold_usd,
        }
    }
}

// ---------------------------------------------------------------------------
// Counters & per-agent autonomous state
// ---------------------------------------------------------------------------

/// Monotonic intent counters surfaced to observers.
///
/// Invariant: `intents_executed + intents_rejected + intents_failed +
/// pending == intents_received`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub intents_received: u64,
    #[serde(default)]
    pub intents_executed: u64,
    #[serde(default)]
    pub intents_rejected: u64,
    #[serde(default)]
    pub intents_failed: u64,
    /// Global rejection counters keyed by reason.
    #[serde(default)]
    pub rejections_by_reason: HashMap<String, u64>,
}

/// Kill-switch and cooldown state tracked per agent by the autonomous guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutonomousAgentState {
    #[serde(default)]
    pub halted: bool,
    #[serde(default)]
    pub halt_reason: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub cooldown_until_ms: i64,
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

/// Platform fee revenue accrued from fills.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Treasury {
    #[serde(default)]
    pub fees_collected_usd: f64,
    #[serde(default)]
    pub fees_by_symbol: HashMap<String, f64>,
}
