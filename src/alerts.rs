// =============================================================================
// Alert Service — one-shot price alerts owned by agents
// =============================================================================

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::EngineError;
use crate::event_bus::{Event, EventBus};
use crate::state_store::StateStore;
use crate::types::{Alert, AlertDirection};

/// Creates and deletes price alerts. Triggering (and the resulting
/// auto-delete) happens in the market data service on price updates.
pub struct AlertService {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl AlertService {
    pub fn new(store: Arc<StateStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    /// Register a one-shot alert for an agent.
    pub fn create(
        &self,
        agent_id: &str,
        symbol: &str,
        threshold_usd: f64,
        direction: AlertDirection,
    ) -> Result<Alert, EngineError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(EngineError::InvalidOrder("symbol is required".into()));
        }
        if threshold_usd <= 0.0 || !threshold_usd.is_finite() {
            return Err(EngineError::InvalidOrder(
                "alert threshold must be positive".into(),
            ));
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            symbol,
            threshold_usd,
            direction,
            created_at: self.clock.now_ms(),
        };

        let stored = alert.clone();
        self.store.transaction(move |state| {
            if !state.agents.contains_key(&stored.agent_id) {
                return Err(EngineError::AgentNotFound(stored.agent_id.clone()));
            }
            state.alerts.insert(stored.id.clone(), stored);
            Ok(())
        })?;

        info!(
            alert_id = %alert.id,
            agent_id = %alert.agent_id,
            symbol = %alert.symbol,
            threshold_usd = alert.threshold_usd,
            direction = %alert.direction,
            "alert created"
        );
        self.bus.emit(&Event::AlertCreated {
            alert_id: alert.id.clone(),
            agent_id: alert.agent_id.clone(),
            symbol: alert.symbol.clone(),
            threshold_usd: alert.threshold_usd,
        });

        Ok(alert)
    }

    /// Delete an alert. Returns false when the id is unknown.
    pub fn delete(&self, alert_id: &str) -> bool {
        let id = alert_id.to_string();
        let removed = self.store.transaction(move |state| state.alerts.remove(&id));

        match removed {
            Some(alert) => {
                info!(alert_id = %alert.id, "alert deleted");
                self.bus.emit(&Event::AlertDeleted {
                    alert_id: alert.id,
                    agent_id: alert.agent_id,
                    symbol: alert.symbol,
                });
                true
            }
            None => false,
        }
    }

    /// Alerts, optionally filtered to one agent, oldest first.
    pub fn list(&self, agent_id: Option<&str>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .store
            .snapshot()
            .alerts
            .into_values()
            .filter(|a| agent_id.map_or(true, |id| a.agent_id == id))
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        alerts
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentRegistry, RegisterAgentInput};
    use crate::clock::ManualClock;
    use crate::runtime_config::{RiskConfig, TradingConfig};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("colosseum-test-{}.json", Uuid::new_v4()))
    }

    struct Fixture {
        service: AlertService,
        bus: Arc<EventBus>,
        agent_id: String,
    }

    fn fixture() -> Fixture {
        let store = StateStore::open(temp_state_path());
        let bus = Arc::new(EventBus::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = AgentRegistry::new(
            Arc::clone(&store),
            clock.clone() as Arc<dyn Clock>,
            TradingConfig::default(),
            RiskConfig::default(),
        );
        let agent = registry
            .register(RegisterAgentInput {
                name: "alpha".into(),
                ..Default::default()
            })
            .unwrap();
        let service = AlertService::new(store, Arc::clone(&bus), clock as Arc<dyn Clock>);
        Fixture {
            service,
            bus,
            agent_id: agent.id,
        }
    }

    #[tokio::test]
    async fn create_and_delete_emit_contract_events() {
        let fx = fixture();
        let created = Arc::new(AtomicUsize::new(0));
        let deleted = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::clone(&created);
        let d2 = Arc::clone(&deleted);
        fx.bus.on("alert.created", move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        fx.bus.on("alert.deleted", move |_| {
            d2.fetch_add(1, Ordering::SeqCst);
        });

        let alert = fx
            .service
            .create(&fx.agent_id, "sol", 200.0, AlertDirection::Above)
            .unwrap();
        assert_eq!(alert.symbol, "SOL");
        assert_eq!(created.load(Ordering::SeqCst), 1);

        assert!(fx.service.delete(&alert.id));
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        assert!(!fx.service.delete(&alert.id));
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_validates_inputs() {
        let fx = fixture();
        assert!(matches!(
            fx.service.create("ghost", "SOL", 10.0, AlertDirection::Above),
            Err(EngineError::AgentNotFound(_))
        ));
        assert!(matches!(
            fx.service
                .create(&fx.agent_id, "SOL", 0.0, AlertDirection::Below),
            Err(EngineError::InvalidOrder(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_by_agent() {
        let fx = fixture();
        fx.service
            .create(&fx.agent_id, "SOL", 100.0, AlertDirection::Above)
            .unwrap();
        fx.service
            .create(&fx.agent_id, "BTC", 70_000.0, AlertDirection::Below)
            .unwrap();

        assert_eq!(fx.service.list(Some(&fx.agent_id)).len(), 2);
        assert_eq!(fx.service.list(Some("other")).len(), 0);
        assert_eq!(fx.service.list(None).len(), 2);
    }
}
