// =============================================================================
// Market Data Service — price ingestion, bounded history, alert arming
// =============================================================================
//
// Prices arrive as input events from the periphery (venue feeds, replay
// tapes). Each update rewrites the latest quote, appends to a bounded
// per-symbol ring (drop-oldest), fires any crossed one-shot alerts, and
// publishes `price.updated`.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::event_bus::{Event, EventBus};
use crate::state_store::StateStore;
use crate::types::{Alert, PricePoint};

/// Samples retained per symbol.
pub const PRICE_HISTORY_CAPACITY: usize = 500;

/// Ingests price updates into the state store.
pub struct MarketDataService {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl MarketDataService {
    pub fn new(store: Arc<StateStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    /// Record the latest price for a symbol. Non-positive or non-finite
    /// prices are dropped with a warning.
    pub fn record_price(&self, symbol: &str, price_usd: f64) {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return;
        }
        if price_usd <= 0.0 || !price_usd.is_finite() {
            warn!(symbol = %symbol, price_usd, "dropping invalid price update");
            return;
        }

        let ts_ms = self.clock.now_ms();
        let sym = symbol.clone();
        let fired: Vec<Alert> = self.store.transaction(move |state| {
            state.market_prices_usd.insert(sym.clone(), price_usd);

            let ring = state
                .market_price_history_usd
                .entry(sym.clone())
                .or_insert_with(|| VecDeque::with_capacity(PRICE_HISTORY_CAPACITY));
            ring.push_back(PricePoint { ts_ms, price_usd });
            while ring.len() > PRICE_HISTORY_CAPACITY {
                ring.pop_front();
            }

            // One-shot alerts: collect the crossed ones, then remove them.
            let triggered: Vec<String> = state
                .alerts
                .values()
                .filter(|a| a.symbol == sym && a.is_triggered_by(price_usd))
                .map(|a| a.id.clone())
                .collect();
            triggered
                .iter()
                .filter_map(|id| state.alerts.remove(id))
                .collect()
        });

        debug!(symbol = %symbol, price_usd, "price updated");
        self.bus.emit(&Event::PriceUpdated {
            symbol: symbol.clone(),
            price_usd,
        });

        for alert in fired {
            info!(
                alert_id = %alert.id,
                agent_id = %alert.agent_id,
                symbol = %alert.symbol,
                threshold_usd = alert.threshold_usd,
                direction = %alert.direction,
                price_usd,
                "price alert triggered"
            );
            self.bus.emit(&Event::AlertDeleted {
                alert_id: alert.id,
                agent_id: alert.agent_id,
                symbol: alert.symbol,
            });
        }
    }

    /// Latest quote for a symbol.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.store
            .snapshot()
            .market_prices_usd
            .get(&symbol.trim().to_uppercase())
            .copied()
    }

    /// The most recent `count` samples for a symbol, oldest first.
    pub fn history(&self, symbol: &str, count: usize) -> Vec<PricePoint> {
        let snap = self.store.snapshot();
        match snap
            .market_price_history_usd
            .get(&symbol.trim().to_uppercase())
        {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).copied().collect()
            }
            None => Vec::new(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
