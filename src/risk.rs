// =============================================================================
// Risk Engine — ordered pre-trade gates protecting agent capital
// =============================================================================
//
// Pure and deterministic: no side effects, no clock reads, no I/O. Rules run
// in a fixed order and the first rule that denies wins:
//
//   1. Notional derivation    — malformed order or non-positive price.
//   2. Max order notional     — single-order size cap.
//   3. Gross exposure         — projected post-trade exposure cap.
//   4. Daily loss cap         — today's realized loss already at the cap.
//   5. Drawdown guard         — equity too far below the recorded peak.
//   6. Cooldown               — too soon after the agent's last trade.
//
// Boundary semantics: order notional exactly at the cap passes; drawdown
// exactly at the limit passes; a cooldown is over at exactly
// `cooldown_seconds` elapsed.
// =============================================================================

use std::collections::HashMap;

use tracing::debug;

use crate::errors::RejectReason;
use crate::types::{Agent, Side, TradeIntent};

/// Outcome of the risk evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    /// Approved, with both sizes computed (one was derived from the other).
    Approved { notional_usd: f64, quantity: f64 },
    Rejected(RejectReason),
}

impl RiskVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Evaluate an intent against the agent's risk limits at the given price.
///
/// `prices` is the market snapshot used to value existing positions for the
/// exposure and drawdown gates.
pub fn evaluate(
    agent: &Agent,
    intent: &TradeIntent,
    price_usd: f64,
    prices: &HashMap<String, f64>,
    now_ms: i64,
) -> RiskVerdict {
    let limits = &agent.risk_limits;

    // ── 1. Notional derivation ──────────────────────────────────────────
    if price_usd <= 0.0 || !price_usd.is_finite() {
        return RiskVerdict::Rejected(RejectReason::InvalidOrder);
    }
    let (notional_usd, quantity) = match (intent.quantity, intent.notional_usd) {
        (Some(q), None) if q > 0.0 && q.is_finite() => (q * price_usd, q),
        (None, Some(n)) if n > 0.0 && n.is_finite() => (n, n / price_usd),
        _ => return RiskVerdict::Rejected(RejectReason::InvalidOrder),
    };

    // ── 2. Max order notional ───────────────────────────────────────────
    if notional_usd > limits.max_order_notional_usd {
        debug!(
            agent_id = %agent.id,
            notional_usd,
            limit = limits.max_order_notional_usd,
            "order notional above cap"
        );
        return RiskVerdict::Rejected(RejectReason::MaxOrderNotionalExceeded);
    }

    // ── 3. Projected gross exposure ─────────────────────────────────────
    let current_exposure = agent.gross_exposure(prices);
    let projected_exposure = match intent.side {
        Side::Buy => current_exposure + notional_usd,
        Side::Sell => (current_exposure - notional_usd).max(0.0),
    };
    if projected_exposure > limits.max_gross_exposure_usd {
        debug!(
            agent_id = %agent.id,
            projected_exposure,
            limit = limits.max_gross_exposure_usd,
            "projected gross exposure above cap"
        );
        return RiskVerdict::Rejected(RejectReason::GrossExposureCapExceeded);
    }

    // ── 4. Daily loss cap ───────────────────────────────────────────────
    if limits.daily_loss_cap_usd > 0.0 {
        let today = crate::clock::day_key(now_ms);
        let daily = agent
            .daily_realized_pnl_usd
            .get(&today)
            .copied()
            .unwrap_or(0.0);
        if daily <= -limits.daily_loss_cap_usd {
            return RiskVerdict::Rejected(RejectReason::DailyLossCapReached);
        }
    }

    // ── 5. Drawdown guard ───────────────────────────────────────────────
    if agent.peak_equity_usd > 0.0 {
        let drawdown = agent.drawdown_pct(prices);
        if drawdown > limits.max_drawdown_pct {
            return RiskVerdict::Rejected(RejectReason::DrawdownGuardTriggered);
        }
    }

    // ── 6. Cooldown ─────────────────────────────────────────────────────
    if let Some(last_trade_at) = agent.last_trade_at {
        if limits.cooldown_seconds > 0
            && now_ms - last_trade_at < limits.cooldown_seconds * 1_000
        {
            return RiskVerdict::Rejected(RejectReason::CooldownActive);
        }
    }

    RiskVerdict::Approved {
        notional_usd,
        quantity,
    }
}

// =============================================================================
// Tests
// =============================================================================
