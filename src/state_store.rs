// =============================================================================
// State Store — single source of truth with serialized writers and
// atomic snapshot persistence
// =============================================================================
//
// Holds the full domain snapshot: agents, intents, executions, receipts,
// idempotency registry, market prices, metrics, autonomous state, alerts,
// treasury.
//
// Concurrency discipline:
//   - Writers are serialized: `transaction` holds the write lock for the
//     duration of the mutation closure. At most one closure runs at a time.
//   - Readers call `snapshot()` and receive a deep copy; they never observe
//     a partial write.
//
// Persistence is best-effort and asynchronous: each transaction nudges a
// background persister task, which coalesces bursts into one atomic
// tmp + rename write. Save failures are logged and retried on the next
// transaction, never raised to the caller. `flush` waits for the persister
// to complete a write that includes every prior transaction.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::receipts::Receipt;
use crate::types::{
    Agent, Alert, AutonomousAgentState, ExecutionRecord, IdempotencyRecord, Metrics, PricePoint,
    TradeIntent, Treasury,
};

// ---------------------------------------------------------------------------
// App State
// ---------------------------------------------------------------------------

/// The whole domain snapshot. Exposed to readers only by value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub agents: HashMap<String, Agent>,

    #[serde(default)]
    pub trade_intents: HashMap<String, TradeIntent>,

    #[serde(default)]
    pub executions: Vec<ExecutionRecord>,

    /// Receipts keyed by execution id.
    #[serde(default)]
    pub receipts: HashMap<String, Receipt>,

    /// Latest receipt hash per agent; the tail of each agent's chain.
    #[serde(default)]
    pub receipt_heads: HashMap<String, String>,

    /// Idempotency registry keyed by `agent_id + '\u{1f}' + client key`.
    #[serde(default)]
    pub idempotency: HashMap<String, IdempotencyRecord>,

    #[serde(default)]
    pub market_prices_usd: HashMap<String, f64>,

    /// Bounded per-symbol ring of recent price samples, oldest first.
    #[serde(default)]
    pub market_price_history_usd: HashMap<String, VecDeque<PricePoint>>,

    #[serde(default)]
    pub metrics: Metrics,

    #[serde(default)]
    pub autonomous_state: HashMap<String, AutonomousAgentState>,

    #[serde(default)]
    pub alerts: HashMap<String, Alert>,

    #[serde(default)]
    pub treasury: Treasury,

    /// Next intent sequence number; assigned under the writer lock.
    #[serde(default)]
    pub intent_seq: u64,
}

impl AppState {
    /// Composite idempotency key for `(agent_id, client_key)`.
    pub fn idempotency_key(agent_id: &str, client_key: &str) -> String {
        format!("{agent_id}\u{1f}{client_key}")
    }

    /// Count of intents still pending.
    pub fn pending_intent_count(&self) -> usize {
        self.trade_intents
            .values()
            .filter(|i| i.status == crate::types::IntentStatus::Pending)
            .count()
    }

    /// Mutable autonomous state for an agent, created on first touch.
    pub fn autonomous_entry(&mut self, agent_id: &str) -> &mut AutonomousAgentState {
        self.autonomous_state
            .entry(agent_id.to_string())
            .or_default()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

enum PersistCommand {
    /// Write the current snapshot; optionally acknowledge completion.
    Save(Option<oneshot::Sender<()>>),
}

/// Owner of the in-memory `AppState` and its persisted file.
pub struct StateStore {
    state: RwLock<AppState>,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
    path: PathBuf,
}

impl StateStore {
    /// Load the state file (or start from defaults) and spawn the background
    /// persister. Load failure is a warning, never a crash.
    pub fn open(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let state = load_or_default(&path);

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            state: RwLock::new(state),
            persist_tx,
            path: path.clone(),
        });

        tokio::spawn(run_persister(path, Arc::downgrade(&store), persist_rx));
        store
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> AppState {
        self.state.read().clone()
    }

    /// Run `work` with exclusive access to the state, then schedule an
    /// asynchronous save. Returns once the in-memory mutation is complete.
    pub fn transaction<T>(&self, work: impl FnOnce(&mut AppState) -> T) -> T {
        let result = {
            let mut state = self.state.write();
            work(&mut state)
        };
        // The persister may already be gone during shutdown; the final flush
        // is what guarantees durability then.
        let _ = self.persist_tx.send(PersistCommand::Save(None));
        result
    }

    /// Force persistence of everything written so far.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.persist_tx.send(PersistCommand::Save(Some(ack_tx))).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Path of the owned state file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("agents", &state.agents.len())
            .field("trade_intents", &state.trade_intents.len())
            .field("executions", &state.executions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Persistence internals
// ---------------------------------------------------------------------------

fn load_or_default(path: &Path) -> AppState {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppState>(&content) {
            Ok(state) => {
                info!(
                    path = %path.display(),
                    agents = state.agents.len(),
                    intents = state.trade_intents.len(),
                    executions = state.executions.len(),
                    "state loaded"
                );
                state
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "state file is corrupt; starting from defaults"
                );
                AppState::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no state file; starting from defaults");
            AppState::default()
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "state file is unreadable; starting from defaults"
            );
            AppState::default()
        }
    }
}

async fn run_persister(
    path: PathBuf,
    store: Weak<StateStore>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
) {
    while let Some(first) = rx.recv().await {
        let mut acks = Vec::new();
        let mut collect = |cmd: PersistCommand| {
            let PersistCommand::Save(ack) = cmd;
            if let Some(ack) = ack {
                acks.push(ack);
            }
        };
        collect(first);
        // Coalesce a burst of transactions into a single write.
        while let Ok(next) = rx.try_recv() {
            collect(next);
        }

        let Some(store) = store.upgrade() else { break };
        let serialized = {
            let state = store.state.read();
            serde_json::to_string_pretty(&*state)
        };
        drop(store);

        match serialized {
            Ok(body) => {
                let target = path.clone();
                let write = tokio::task::spawn_blocking(move || write_atomic(&target, &body)).await;
                match write {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "state save failed; will retry on next transaction");
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "state save task failed; will retry on next transaction");
                    }
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state serialization failed; will retry on next transaction");
            }
        }

        for ack in acks {
            let _ = ack.send(());
        }
    }
}

/// Write to a temporary sibling file, then rename over the target.
fn write_atomic(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntentStatus;
    use uuid::Uuid;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("colosseum-test-{}.json", Uuid::new_v4()))
    }

    fn sample_intent(id: &str, seq: u64) -> TradeIntent {
        TradeIntent {
            id: id.to_string(),
            agent_id: "agent-1".to_string(),
            symbol: "SOL".to_string(),
            side: crate::types::Side::Buy,
            quantity: Some(1.0),
            notional_usd: None,
            requested_mode: crate::types::TradeMode::Paper,
            meta: None,
            status: IntentStatus::Pending,
            status_reason: None,
            seq,
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    #[tokio::test]
    async fn snapshot_is_a_deep_copy() {
        let store = StateStore::open(temp_state_path());
        store.transaction(|state| {
            state.market_prices_usd.insert("SOL".into(), 150.0);
        });

        let mut snap = store.snapshot();
        snap.market_prices_usd.insert("SOL".into(), 999.0);

        assert_eq!(
            store.snapshot().market_prices_usd.get("SOL"),
            Some(&150.0),
            "mutating a snapshot must not touch the store"
        );
    }

    #[tokio::test]
    async fn flush_persists_and_reopen_restores() {
        let path = temp_state_path();

        {
            let store = StateStore::open(path.clone());
            store.transaction(|state| {
                state.market_prices_usd.insert("BTC".into(), 64_000.0);
                state.trade_intents.insert("i1".into(), sample_intent("i1", 0));
                state.metrics.intents_received = 1;
            });
            store.flush().await;
        }

        let reopened = StateStore::open(path.clone());
        let snap = reopened.snapshot();
        assert_eq!(snap.market_prices_usd.get("BTC"), Some(&64_000.0));
        assert_eq!(snap.trade_intents.len(), 1);
        assert_eq!(snap.metrics.intents_received, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn corrupt_state_file_falls_back_to_defaults() {
        let path = temp_state_path();
        std::fs::write(&path, "{ not json at all").unwrap();

        let store = StateStore::open(path.clone());
        let snap = store.snapshot();
        assert!(snap.agents.is_empty());
        assert!(snap.trade_intents.is_empty());
        assert_eq!(snap.metrics.intents_received, 0);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn transaction_result_is_returned() {
        let store = StateStore::open(temp_state_path());
        let count = store.transaction(|state| {
            state.trade_intents.insert("i1".into(), sample_intent("i1", 0));
            state.trade_intents.len()
        });
        assert_eq!(count, 1);
        assert_eq!(store.snapshot().pending_intent_count(), 1);
    }

    #[test]
    fn idempotency_key_distinguishes_agents() {
        let a = AppState::idempotency_key("agent-1", "key");
        let b = AppState::idempotency_key("agent-2", "key");
        assert_ne!(a, b);
        // The separator cannot collide with a key that merely contains the
        // other agent's id as a prefix.
        let c = AppState::idempotency_key("agent", "1-key");
        assert_ne!(a, c);
    }
}
