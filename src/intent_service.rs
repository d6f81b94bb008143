// =============================================================================
// Trade Intent Service — creation, idempotent replay, pending queue
// =============================================================================
//
// Creation validates the order shape (exactly one of quantity/notional, both
// positive) and the agent, normalizes the symbol to uppercase, and registers
// the intent as `pending`.
//
// Idempotency: a client-supplied key is scoped to the agent. Reusing the key
// with a byte-equivalent canonical payload replays the original intent
// (`replayed = true`, no mutation, no counters); reusing it with a different
// payload is an `idempotency_key_conflict`.
// =============================================================================

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::EngineError;
use crate::event_bus::{Event, EventBus};
use crate::hashing;
use crate::state_store::{AppState, StateStore};
use crate::types::{IdempotencyRecord, IntentStatus, Side, TradeIntent, TradeMode};

/// Caller-facing inputs for a new intent.
#[derive(Debug, Clone)]
pub struct CreateIntentInput {
    pub agent_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Option<f64>,
    pub notional_usd: Option<f64>,
    pub mode: Option<TradeMode>,
    pub meta: Option<serde_json::Value>,
}

/// Result of `create`: the intent plus whether it was an idempotent replay.
#[derive(Debug, Clone)]
pub struct IntentSubmission {
    pub intent: TradeIntent,
    pub replayed: bool,
}

/// Creates and queries trade intents.
pub struct TradeIntentService {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    default_mode: TradeMode,
}

impl TradeIntentService {
    pub fn new(
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        default_mode: TradeMode,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            default_mode,
        }
    }

    /// Create a pending intent, or replay an identical one under the same
    /// idempotency key.
    pub fn create(
        &self,
        input: CreateIntentInput,
        idempotency_key: Option<&str>,
    ) -> Result<IntentSubmission, EngineError> {
        let symbol = input.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(EngineError::InvalidOrder("symbol is required".into()));
        }
        match (input.quantity, input.notional_usd) {
            (Some(q), None) if q > 0.0 && q.is_finite() => {}
            (None, Some(n)) if n > 0.0 && n.is_finite() => {}
            (Some(_), Some(_)) => {
                return Err(EngineError::InvalidOrder(
                    "provide exactly one of quantity or notional_usd".into(),
                ))
            }
            _ => {
                return Err(EngineError::InvalidOrder(
                    "a positive quantity or notional_usd is required".into(),
                ))
            }
        }

        let mode = input.mode.unwrap_or(self.default_mode);
        let now = self.clock.now_ms();
        let fingerprint = request_fingerprint(&input.agent_id, &symbol, input.side, &input, mode);

        let agent_id = input.agent_id.clone();
        let key = idempotency_key.map(str::to_string);
        let submission = self.store.transaction(move |state| {
            if !state.agents.contains_key(&agent_id) {
                return Err(EngineError::AgentNotFound(agent_id.clone()));
            }

            if let Some(client_key) = &key {
                let composite = AppState::idempotency_key(&agent_id, client_key);
                if let Some(existing) = state.idempotency.get(&composite) {
                    if existing.payload_fingerprint == fingerprint {
                        let intent = state
                            .trade_intents
                            .get(&existing.intent_id)
                            .cloned()
                            .ok_or_else(|| {
                                EngineError::IntentNotFound(existing.intent_id.clone())
                            })?;
                        return Ok(IntentSubmission {
                            intent,
                            replayed: true,
                        });
                    }
                    return Err(EngineError::IdempotencyKeyConflict(client_key.clone()));
                }
            }

            let intent = TradeIntent {
                id: Uuid::new_v4().to_string(),
                agent_id: agent_id.clone(),
                symbol,
                side: input.side,
                quantity: input.quantity,
                notional_usd: input.notional_usd,
                requested_mode: mode,
                meta: input.meta,
                status: IntentStatus::Pending,
                status_reason: None,
                seq: state.intent_seq,
                created_at: now,
                updated_at: now,
            };
            state.intent_seq += 1;
            state.metrics.intents_received += 1;

            if let Some(client_key) = &key {
                let composite = AppState::idempotency_key(&agent_id, client_key);
                state.idempotency.insert(
                    composite,
                    IdempotencyRecord {
                        key: client_key.clone(),
                        intent_id: intent.id.clone(),
                        payload_fingerprint: fingerprint,
                        created_at: now,
                    },
                );
            }

            state.trade_intents.insert(intent.id.clone(), intent.clone());
            Ok(IntentSubmission {
                intent,
                replayed: false,
            })
        })?;

        if !submission.replayed {
            let intent = &submission.intent;
            info!(
                intent_id = %intent.id,
                agent_id = %intent.agent_id,
                symbol = %intent.symbol,
                side = %intent.side,
                "intent created"
            );
            self.bus.emit(&Event::IntentCreated {
                intent_id: intent.id.clone(),
                agent_id: intent.agent_id.clone(),
                symbol: intent.symbol.clone(),
                side: intent.side,
            });
        }

        Ok(submission)
    }

    pub fn get_by_id(&self, intent_id: &str) -> Option<TradeIntent> {
        self.store.snapshot().trade_intents.get(intent_id).cloned()
    }

    /// Up to `limit` pending intents, oldest first.
    pub fn list_pending(&self, limit: usize) -> Vec<TradeIntent> {
        let mut pending: Vec<TradeIntent> = self
            .store
            .snapshot()
            .trade_intents
            .into_values()
            .filter(|i| i.status == IntentStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        pending.truncate(limit);
        pending
    }
}

/// Canonical fingerprint of the request, hashed over the fields that define
/// its identity. Optional sizes are omitted, not nulled, so quantity- and
/// notional-shaped requests never collide.
fn request_fingerprint(
    agent_id: &str,
    symbol: &str,
    side: Side,
    input: &CreateIntentInput,
    mode: TradeMode,
) -> String {
    let mut payload = json!({
        "agentId": agent_id,
        "symbol": symbol,
        "side": side,
        "mode": mode,
    });
    if let Some(q) = input.quantity {
        payload["quantity"] = json!(q);
    }
    if let Some(n) = input.notional_usd {
        payload["notionalUsd"] = json!(n);
    }
    hashing::hash_value(&payload)
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
        service: TradeIntentService,
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        clock: Arc<ManualClock>,
        agent_id: String,
    }

    fn fixture() -> Fixture {
        let store = StateStore::open(temp_state_path());
        let bus = Arc::new(EventBus::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
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
        let service = TradeIntentService::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            clock.clone() as Arc<dyn Clock>,
            TradeMode::Paper,
        );
        Fixture {
            service,
            store,
            bus,
            clock,
            agent_id: agent.id,
        }
    }

    fn buy(agent_id: &str, notional: f64) -> CreateIntentInput {
        CreateIntentInput {
            agent_id: agent_id.to_string(),
            symbol: "sol".to_string(),
            side: Side::Buy,
            quantity: None,
            notional_usd: Some(notional),
            mode: None,
            meta: None,
        }
    }

    #[tokio::test]
    async fn create_normalizes_symbol_and_emits_event() {
        let fx = fixture();
        let created = Arc::new(AtomicUsize::new(0));
        let created2 = Arc::clone(&created);
        fx.bus.on("intent.created", move |_| {
            created2.fetch_add(1, Ordering::SeqCst);
        });

        let submission = fx.service.create(buy(&fx.agent_id, 100.0), None).unwrap();
        assert!(!submission.replayed);
        assert_eq!(submission.intent.symbol, "SOL");
        assert_eq!(submission.intent.status, IntentStatus::Pending);
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let snap = fx.store.snapshot();
        assert_eq!(snap.metrics.intents_received, 1);
    }

    #[tokio::test]
    async fn create_validates_order_shape() {
        let fx = fixture();

        let mut both = buy(&fx.agent_id, 100.0);
        both.quantity = Some(1.0);
        assert!(matches!(
            fx.service.create(both, None),
            Err(EngineError::InvalidOrder(_))
        ));

        let mut neither = buy(&fx.agent_id, 100.0);
        neither.notional_usd = None;
        assert!(matches!(
            fx.service.create(neither, None),
            Err(EngineError::InvalidOrder(_))
        ));

        let negative = buy(&fx.agent_id, -5.0);
        assert!(matches!(
            fx.service.create(negative, None),
            Err(EngineError::InvalidOrder(_))
        ));

        assert!(matches!(
            fx.service.create(buy("ghost", 100.0), None),
            Err(EngineError::AgentNotFound(_))
        ));

        // Failed validation mutates nothing.
        assert_eq!(fx.store.snapshot().metrics.intents_received, 0);
    }

    #[tokio::test]
    async fn idempotent_replay_returns_same_intent_without_mutation() {
        let fx = fixture();

        let first = fx
            .service
            .create(buy(&fx.agent_id, 100.0), Some("order-1"))
            .unwrap();
        let before = fx.store.snapshot();

        let second = fx
            .service
            .create(buy(&fx.agent_id, 100.0), Some("order-1"))
            .unwrap();
        assert!(second.replayed);
        assert_eq!(second.intent.id, first.intent.id);

        let after = fx.store.snapshot();
        assert_eq!(after.metrics.intents_received, 1);
        assert_eq!(
            serde_json::to_string(&before).unwrap(),
            serde_json::to_string(&after).unwrap(),
            "replay must leave the state byte-identical"
        );
    }

    #[tokio::test]
    async fn key_reuse_with_different_payload_conflicts() {
        let fx = fixture();
        fx.service
            .create(buy(&fx.agent_id, 100.0), Some("order-1"))
            .unwrap();

        let err = fx
            .service
            .create(buy(&fx.agent_id, 250.0), Some("order-1"))
            .unwrap_err();
        assert!(matches!(err, EngineError::IdempotencyKeyConflict(_)));
    }

    #[tokio::test]
    async fn same_key_different_agents_do_not_collide() {
        let fx = fixture();
        let registry = AgentRegistry::new(
            Arc::clone(&fx.store),
            fx.clock.clone() as Arc<dyn Clock>,
            TradingConfig::default(),
            RiskConfig::default(),
        );
        let other = registry
            .register(RegisterAgentInput {
                name: "beta".into(),
                ..Default::default()
            })
            .unwrap();

        let a = fx
            .service
            .create(buy(&fx.agent_id, 100.0), Some("shared"))
            .unwrap();
        let b = fx.service.create(buy(&other.id, 100.0), Some("shared")).unwrap();
        assert_ne!(a.intent.id, b.intent.id);
        assert!(!b.replayed);
    }

    #[tokio::test]
    async fn list_pending_orders_oldest_first_with_limit() {
        let fx = fixture();

        let i1 = fx.service.create(buy(&fx.agent_id, 10.0), None).unwrap();
        fx.clock.advance(5);
        let i2 = fx.service.create(buy(&fx.agent_id, 20.0), None).unwrap();
        fx.clock.advance(5);
        let i3 = fx.service.create(buy(&fx.agent_id, 30.0), None).unwrap();

        let pending = fx.service.list_pending(2);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, i1.intent.id);
        assert_eq!(pending[1].id, i2.intent.id);

        let all = fx.service.list_pending(10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, i3.intent.id);
    }

    #[tokio::test]
    async fn same_millisecond_intents_keep_submission_order() {
        let fx = fixture();
        let first = fx.service.create(buy(&fx.agent_id, 10.0), None).unwrap();
        let second = fx.service.create(buy(&fx.agent_id, 20.0), None).unwrap();

        let pending = fx.service.list_pending(10);
        assert_eq!(pending[0].id, first.intent.id);
        assert_eq!(pending[1].id, second.intent.id);
    }

    #[tokio::test]
    async fn quantity_and_notional_requests_have_distinct_fingerprints() {
        let fx = fixture();
        let mut by_qty = buy(&fx.agent_id, 100.0);
        by_qty.notional_usd = None;
        by_qty.quantity = Some(100.0);

        fx.service.create(by_qty, Some("order-1")).unwrap();
        let err = fx
            .service
            .create(buy(&fx.agent_id, 100.0), Some("order-1"))
            .unwrap_err();
        assert!(matches!(err, EngineError::IdempotencyKeyConflict(_)));
    }
}
