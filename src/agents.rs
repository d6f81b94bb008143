// =============================================================================
// Agent Registry — participant identities, seeded capital, admin resets
// =============================================================================

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::EngineError;
use crate::runtime_config::{RiskConfig, TradingConfig};
use crate::state_store::StateStore;
use crate::types::{Agent, AutonomousAgentState, RiskLimits};

/// Inputs for registering a new agent. Omitted fields fall back to the
/// configured trading/risk defaults.
#[derive(Debug, Clone, Default)]
pub struct RegisterAgentInput {
    pub name: String,
    pub strategy_id: Option<String>,
    pub starting_capital_usd: Option<f64>,
    pub risk_limits: Option<RiskLimits>,
}

/// Creates and looks up agents inside the state store.
pub struct AgentRegistry {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    trading: TradingConfig,
    risk: RiskConfig,
}

impl AgentRegistry {
    pub fn new(
        store: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        trading: TradingConfig,
        risk: RiskConfig,
    ) -> Self {
        Self {
            store,
            clock,
            trading,
            risk,
        }
    }

    /// Register a new agent with an opaque api key and seeded ledger.
    pub fn register(&self, input: RegisterAgentInput) -> Result<Agent, EngineError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(EngineError::InvalidOrder("agent name is required".into()));
        }
        let capital = input
            .starting_capital_usd
            .unwrap_or(self.trading.default_starting_capital_usd);
        if capital <= 0.0 || !capital.is_finite() {
            return Err(EngineError::InvalidOrder(
                "starting capital must be positive".into(),
            ));
        }

        let now = self.clock.now_ms();
        let agent = Agent {
            id: Uuid::new_v4().to_string(),
            name,
            api_key: format!("csk_{}", Uuid::new_v4().simple()),
            starting_capital_usd: capital,
            cash_usd: capital,
            realized_pnl_usd: 0.0,
            peak_equity_usd: capital,
            positions: Default::default(),
            daily_realized_pnl_usd: Default::default(),
            risk_limits: input.risk_limits.unwrap_or_else(|| self.risk.to_limits()),
            last_trade_at: None,
            risk_rejections_by_reason: Default::default(),
            strategy_id: input.strategy_id,
            created_at: now,
            updated_at: now,
        };

        let stored = agent.clone();
        self.store.transaction(move |state| {
            state
                .autonomous_state
                .insert(stored.id.clone(), AutonomousAgentState::default());
            state.agents.insert(stored.id.clone(), stored);
        });

        info!(
            agent_id = %agent.id,
            name = %agent.name,
            starting_capital_usd = agent.starting_capital_usd,
            "agent registered"
        );
        Ok(agent)
    }

    pub fn get(&self, agent_id: &str) -> Option<Agent> {
        self.store.snapshot().agents.get(agent_id).cloned()
    }

    /// Lookup by the opaque api key, for periphery authentication.
    pub fn get_by_api_key(&self, api_key: &str) -> Option<Agent> {
        self.store
            .snapshot()
            .agents
            .into_values()
            .find(|a| a.api_key == api_key)
    }

    /// All agents, oldest first.
    pub fn list(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.store.snapshot().agents.into_values().collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        agents
    }

    /// Admin intervention: clear a halt, cooldown window, and failure streak.
    pub fn reset_autonomous(&self, agent_id: &str) -> Result<(), EngineError> {
        let agent_id = agent_id.to_string();
        self.store.transaction(move |state| {
            if !state.agents.contains_key(&agent_id) {
                return Err(EngineError::AgentNotFound(agent_id.clone()));
            }
            state
                .autonomous_state
                .insert(agent_id.clone(), AutonomousAgentState::default());
            info!(agent_id = %agent_id, "autonomous state reset by admin");
            Ok(())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::AutonomousAgentState;
    use std::path::PathBuf;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("colosseum-test-{}.json", Uuid::new_v4()))
    }

    fn registry() -> AgentRegistry {
        AgentRegistry::new(
            StateStore::open(temp_state_path()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            TradingConfig::default(),
            RiskConfig::default(),
        )
    }

    #[tokio::test]
    async fn register_seeds_capital_and_limits() {
        let reg = registry();
        let agent = reg
            .register(RegisterAgentInput {
                name: "alpha".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(agent.cash_usd, 10_000.0);
        assert_eq!(agent.peak_equity_usd, 10_000.0);
        assert!(agent.api_key.starts_with("csk_"));
        assert_eq!(agent.risk_limits.max_order_notional_usd, 5_000.0);

        let fetched = reg.get(&agent.id).unwrap();
        assert_eq!(fetched.name, "alpha");
    }

    #[tokio::test]
    async fn register_rejects_blank_name_and_bad_capital() {
        let reg = registry();
        assert!(matches!(
            reg.register(RegisterAgentInput {
                name: "  ".into(),
                ..Default::default()
            }),
            Err(EngineError::InvalidOrder(_))
        ));
        assert!(matches!(
            reg.register(RegisterAgentInput {
                name: "alpha".into(),
                starting_capital_usd: Some(-5.0),
                ..Default::default()
            }),
            Err(EngineError::InvalidOrder(_))
        ));
    }

    #[tokio::test]
    async fn api_key_lookup_finds_the_agent() {
        let reg = registry();
        let agent = reg
            .register(RegisterAgentInput {
                name: "alpha".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(reg.get_by_api_key(&agent.api_key).unwrap().id, agent.id);
        assert!(reg.get_by_api_key("csk_nope").is_none());
    }

    #[tokio::test]
    async fn reset_autonomous_clears_halt() {
        let reg = registry();
        let agent = reg
            .register(RegisterAgentInput {
                name: "alpha".into(),
                ..Default::default()
            })
            .unwrap();

        reg.store.transaction(|state| {
            state.autonomous_state.insert(
                agent.id.clone(),
                AutonomousAgentState {
                    halted: true,
                    halt_reason: Some("drawdown stop".into()),
                    consecutive_failures: 3,
                    cooldown_until_ms: i64::MAX,
                },
            );
        });

        reg.reset_autonomous(&agent.id).unwrap();
        let state = reg.store.snapshot();
        let auto = state.autonomous_state.get(&agent.id).unwrap();
        assert!(!auto.halted);
        assert_eq!(auto.consecutive_failures, 0);
        assert_eq!(auto.cooldown_until_ms, 0);

        assert!(matches!(
            reg.reset_autonomous("missing"),
            Err(EngineError::AgentNotFound(_))
        ));
    }
}
