// =============================================================================
// Execution Service — fills pending intents against the in-memory price
// =============================================================================
//
// The whole pipeline for one intent runs inside a single store transaction:
//
//   1. Lookups: missing agent or missing price is a terminal failure.
//   2. Autonomous guard gate, then risk engine gate. A denial marks the
//      intent `rejected`, bumps counters, and leaves the ledger untouched.
//   3. Fill math: fee via the fee engine, signed net cash delta, average-
//      entry position update on buys, realized P&L (full fee attributed to
//      the sell leg) on sells. Overselling is a terminal failure.
//   4. Agent aggregates: cash, lifetime and daily realized P&L, peak equity
//      (trade-time only), last trade timestamp.
//   5. Execution record append, intent terminal transition, receipt chained
//      off the agent's previous receipt hash, treasury fee accrual.
//
// Events produced by the transaction are published after it commits, in
// order. Rejected and failed intents never store an execution record; the
// caller still receives a transient record describing a failure.
// =============================================================================

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::autonomous::AutonomousGuard;
use crate::clock::{day_key, Clock};
use crate::errors::{EngineError, FailureReason, RejectReason};
use crate::event_bus::{Event, EventBus};
use crate::fees::FeeEngine;
use crate::receipts;
use crate::risk::{self, RiskVerdict};
use crate::state_store::{AppState, StateStore};
use crate::types::{
    ExecutionRecord, ExecutionStatus, IntentStatus, Position, Side, TradeIntent,
};

/// Quantities within this epsilon of zero are treated as fully closed.
const QTY_EPSILON: f64 = 1e-9;

/// Outcome of processing one intent.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Intent filled; the record is stored and receipted.
    Filled(ExecutionRecord),
    /// A gate denied the intent. No record is stored.
    Rejected {
        intent_id: String,
        agent_id: String,
        reason: RejectReason,
        detail: String,
    },
    /// Terminal fault. The transient record is returned but not stored.
    Failed(ExecutionRecord),
    /// The intent was already terminal; nothing happened.
    Skipped {
        intent_id: String,
        status: IntentStatus,
    },
}

/// Routes intents through the guard, the risk engine, and the position
/// ledger, emitting lifecycle events.
pub struct ExecutionService {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    guard: AutonomousGuard,
    fees: FeeEngine,
}

impl ExecutionService {
    pub fn new(
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        guard: AutonomousGuard,
        fees: FeeEngine,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            guard,
            fees,
        }
    }

    /// Process one pending intent to a terminal state.
    pub fn execute(&self, intent_id: &str) -> Result<ExecutionOutcome, EngineError> {
        let now_ms = self.clock.now_ms();
        let today = day_key(now_ms);

        let (outcome, events) = self
            .store
            .transaction(|state| self.run(state, intent_id, now_ms, &today))?;

        for event in &events {
            self.bus.emit(event);
        }
        Ok(outcome)
    }

    fn run(
        &self,
        state: &mut AppState,
        intent_id: &str,
        now_ms: i64,
        today: &str,
    ) -> Result<(ExecutionOutcome, Vec<Event>), EngineError> {
        let intent = state
            .trade_intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| EngineError::IntentNotFound(intent_id.to_string()))?;

        if intent.status != IntentStatus::Pending {
            return Ok((
                ExecutionOutcome::Skipped {
                    intent_id: intent.id,
                    status: intent.status,
                },
                Vec::new(),
            ));
        }

        // ── 1. Lookups ──────────────────────────────────────────────────
        let Some(mut agent) = state.agents.get(&intent.agent_id).cloned() else {
            return Ok(fail(state, &intent, FailureReason::AgentNotFound, 0.0, now_ms));
        };
        let Some(price_usd) = state.market_prices_usd.get(&intent.symbol).copied() else {
            return Ok(fail(
                state,
                &intent,
                FailureReason::MarketPriceUnavailable,
                0.0,
                now_ms,
            ));
        };
        let prices = state.market_prices_usd.clone();

        // ── 2. Autonomous guard ─────────────────────────────────────────
        let drawdown = agent.drawdown_pct(&prices);
        let mut auto = state
            .autonomous_state
            .get(&intent.agent_id)
            .cloned()
            .unwrap_or_default();
        let guard_result = self
            .guard
            .assess(now_ms, drawdown, &intent.agent_id, &mut auto);
        state
            .autonomous_state
            .insert(intent.agent_id.clone(), auto);
        if let Err(denial) = guard_result {
            return Ok(reject(state, &intent, denial.reason, denial.detail, now_ms));
        }

        // ── 3. Risk engine ──────────────────────────────────────────────
        let (notional_usd, quantity) =
            match risk::evaluate(&agent, &intent, price_usd, &prices, now_ms) {
                RiskVerdict::Rejected(reason) => {
                    return Ok(reject(
                        state,
                        &intent,
                        reason,
                        reason.as_str().to_string(),
                        now_ms,
                    ));
                }
                RiskVerdict::Approved {
                    notional_usd,
                    quantity,
                } => (notional_usd, quantity),
            };

        // ── 4. Fill math on a working copy of the agent ─────────────────
        let gross_notional_usd = notional_usd;
        let fee_usd = self.fees.compute(gross_notional_usd, intent.requested_mode);
        let (net_usd, fill_realized_usd) = match intent.side {
            Side::Buy => {
                let position = agent
                    .positions
                    .entry(intent.symbol.clone())
                    .or_insert_with(|| Position {
                        symbol: intent.symbol.clone(),
                        quantity: 0.0,
                        avg_entry_price_usd: 0.0,
                    });
                let new_quantity = position.quantity + quantity;
                position.avg_entry_price_usd = (position.quantity
                    * position.avg_entry_price_usd
                    + quantity * price_usd)
                    / new_quantity;
                position.quantity = new_quantity;
                (-(gross_notional_usd + fee_usd), 0.0)
            }
            Side::Sell => {
                let held = agent.positions.get_mut(&intent.symbol);
                let Some(position) = held.filter(|p| quantity <= p.quantity + QTY_EPSILON) else {
                    return Ok(fail(
                        state,
                        &intent,
                        FailureReason::InsufficientPosition,
                        price_usd,
                        now_ms,
                    ));
                };
                let realized = quantity * (price_usd - position.avg_entry_price_usd) - fee_usd;
                position.quantity -= quantity;
                if position.quantity <= QTY_EPSILON {
                    agent.positions.remove(&intent.symbol);
                }
                (gross_notional_usd - fee_usd, realized)
            }
        };

        // ── 5. Agent aggregates ─────────────────────────────────────────
        agent.cash_usd += net_usd;
        agent.realized_pnl_usd += fill_realized_usd;
        *agent
            .daily_realized_pnl_usd
            .entry(today.to_string())
            .or_insert(0.0) += fill_realized_usd;
        let equity = agent.equity(&prices);
        if equity > agent.peak_equity_usd {
            agent.peak_equity_usd = equity;
        }
        agent.last_trade_at = Some(now_ms);
        agent.updated_at = now_ms;

        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            intent_id: intent.id.clone(),
            agent_id: intent.agent_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity,
            price_usd,
            gross_notional_usd,
            fee_usd,
            net_usd,
            realized_pnl_usd: fill_realized_usd,
            pnl_snapshot_usd: agent.realized_pnl_usd,
            mode: intent.requested_mode,
            status: ExecutionStatus::Filled,
            failure_reason: None,
            tx_signature: None,
            created_at: now_ms,
        };

        // ── 6. Receipt, chained off the agent's previous hash ───────────
        let prev_hash = state.receipt_heads.get(&intent.agent_id).cloned();
        let receipt = match receipts::create_receipt(&record, prev_hash.as_deref()) {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    intent_id = %intent.id,
                    error = %e,
                    "receipt creation failed; abandoning fill"
                );
                return Ok(fail(
                    state,
                    &intent,
                    FailureReason::InternalError,
                    price_usd,
                    now_ms,
                ));
            }
        };

        // ── 7. Commit ───────────────────────────────────────────────────
        state
            .receipt_heads
            .insert(intent.agent_id.clone(), receipt.receipt_hash.clone());
        state.receipts.insert(record.id.clone(), receipt);
        state.treasury.fees_collected_usd += fee_usd;
        *state
            .treasury
            .fees_by_symbol
            .entry(intent.symbol.clone())
            .or_insert(0.0) += fee_usd;
        AutonomousGuard::record_success(state.autonomous_entry(&intent.agent_id));
        state.agents.insert(intent.agent_id.clone(), agent);
        state.executions.push(record.clone());
        if let Some(stored) = state.trade_intents.get_mut(&intent.id) {
            stored.status = IntentStatus::Executed;
            stored.updated_at = now_ms;
        }
        state.metrics.intents_executed += 1;

        info!(
            execution_id = %record.id,
            intent_id = %record.intent_id,
            agent_id = %record.agent_id,
            symbol = %record.symbol,
            side = %record.side,
            quantity = record.quantity,
            price_usd = record.price_usd,
            fee_usd = record.fee_usd,
            realized_pnl_usd = record.realized_pnl_usd,
            "intent filled"
        );

        let event = Event::IntentExecuted {
            execution_id: record.id.clone(),
            intent_id: record.intent_id.clone(),
            agent_id: record.agent_id.clone(),
            symbol: record.symbol.clone(),
            side: record.side,
            quantity: record.quantity,
            price_usd: record.price_usd,
            gross_notional_usd: record.gross_notional_usd,
            fee_usd: record.fee_usd,
            net_usd: record.net_usd,
            realized_pnl_usd: record.realized_pnl_usd,
            mode: record.mode,
        };
        Ok((ExecutionOutcome::Filled(record), vec![event]))
    }
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("guard", &self.guard)
            .field("fees", &self.fees)
            .finish()
    }
}

/// Mark an intent rejected by a gate: counters, per-reason maps, event.
/// The position ledger is untouched and the failure streak is not extended.
fn reject(
    state: &mut AppState,
    intent: &TradeIntent,
    reason: RejectReason,
    detail: String,
    now_ms: i64,
) -> (ExecutionOutcome, Vec<Event>) {
    if let Some(stored) = state.trade_intents.get_mut(&intent.id) {
        stored.status = IntentStatus::Rejected;
        stored.status_reason = Some(detail.clone());
        stored.updated_at = now_ms;
    }
    state.metrics.intents_rejected += 1;
    *state
        .metrics
        .rejections_by_reason
        .entry(reason.as_str().to_string())
        .or_insert(0) += 1;
    if let Some(agent) = state.agents.get_mut(&intent.agent_id) {
        *agent
            .risk_rejections_by_reason
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
        agent.updated_at = now_ms;
    }

    warn!(
        intent_id = %intent.id,
        agent_id = %intent.agent_id,
        reason = reason.as_str(),
        detail = %detail,
        "intent rejected"
    );

    let event = Event::IntentRejected {
        intent_id: intent.id.clone(),
        agent_id: intent.agent_id.clone(),
        reason: detail.clone(),
    };
    (
        ExecutionOutcome::Rejected {
            intent_id: intent.id.clone(),
            agent_id: intent.agent_id.clone(),
            reason,
            detail,
        },
        vec![event],
    )
}

/// Mark an intent terminally failed. The ledger is untouched; the failure
/// streak is extended.
fn fail(
    state: &mut AppState,
    intent: &TradeIntent,
    reason: FailureReason,
    price_usd: f64,
    now_ms: i64,
) -> (ExecutionOutcome, Vec<Event>) {
    if let Some(stored) = state.trade_intents.get_mut(&intent.id) {
        stored.status = IntentStatus::Failed;
        stored.status_reason = Some(reason.as_str().to_string());
        stored.updated_at = now_ms;
    }
    state.metrics.intents_failed += 1;
    AutonomousGuard::record_failure(state.autonomous_entry(&intent.agent_id));

    let pnl_snapshot_usd = state
        .agents
        .get(&intent.agent_id)
        .map(|a| a.realized_pnl_usd)
        .unwrap_or(0.0);

    warn!(
        intent_id = %intent.id,
        agent_id = %intent.agent_id,
        reason = reason.as_str(),
        "intent failed"
    );

    let record = ExecutionRecord {
        id: Uuid::new_v4().to_string(),
        intent_id: intent.id.clone(),
        agent_id: intent.agent_id.clone(),
        symbol: intent.symbol.clone(),
        side: intent.side,
        quantity: intent.quantity.unwrap_or(0.0),
        price_usd,
        gross_notional_usd: 0.0,
        fee_usd: 0.0,
        net_usd: 0.0,
        realized_pnl_usd: 0.0,
        pnl_snapshot_usd,
        mode: intent.requested_mode,
        status: ExecutionStatus::Failed,
        failure_reason: Some(reason.as_str().to_string()),
        tx_signature: None,
        created_at: now_ms,
    };

    let event = Event::IntentFailed {
        intent_id: intent.id.clone(),
        agent_id: intent.agent_id.clone(),
        reason: reason.as_str().to_string(),
    };
    (ExecutionOutcome::Failed(record), vec![event])
}

// =============================================================================
// Tests
// =============================================================================
