// =============================================================================
// Execution Worker — periodic drain of the pending intent queue
// =============================================================================
//
// Runs as a background Tokio task, waking every `interval_ms` to:
//   1. Read up to `max_batch_size` pending intents, oldest first.
//   2. Execute them sequentially through the execution service.
//
// A tick completes before the next interval is honored, so ticks never
// overlap; a busy flag additionally skips a tick that lands while a drain is
// still running. Execution errors are logged and the loop continues — a bad
// intent never kills the worker. `stop` is cooperative: the in-flight intent
// finishes, the loop exits before the next tick, and `stop` resolves once
// the task is gone.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::execution_service::{ExecutionOutcome, ExecutionService};
use crate::intent_service::TradeIntentService;
use crate::runtime_config::WorkerConfig;

/// Background pump draining pending intents into the execution service.
pub struct ExecutionWorker {
    intents: Arc<TradeIntentService>,
    executor: Arc<ExecutionService>,
    interval_ms: u64,
    max_batch_size: usize,
    busy: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionWorker {
    pub fn new(
        intents: Arc<TradeIntentService>,
        executor: Arc<ExecutionService>,
        config: &WorkerConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            intents,
            executor,
            interval_ms: config.interval_ms.max(1),
            max_batch_size: config.max_batch_size.max(1),
            busy: Arc::new(AtomicBool::new(false)),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Launch the repeating drain task. A second call while running is a
    /// no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            warn!("execution worker already running");
            return;
        }

        let intents = Arc::clone(&self.intents);
        let executor = Arc::clone(&self.executor);
        let busy = Arc::clone(&self.busy);
        let mut shutdown_rx = self.shutdown.subscribe();
        let interval_ms = self.interval_ms;
        let max_batch_size = self.max_batch_size;

        *handle = Some(tokio::spawn(async move {
            info!(interval_ms, max_batch_size, "execution worker started");
            let mut ticker = interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if busy.swap(true, Ordering::SeqCst) {
                            warn!("previous drain still running; skipping tick");
                            continue;
                        }
                        drain_batch(&intents, &executor, max_batch_size);
                        busy.store(false, Ordering::SeqCst);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("execution worker stopped");
        }));
    }

    /// Signal shutdown and wait for the loop to exit. The current in-flight
    /// intent finishes first.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for ExecutionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionWorker")
            .field("interval_ms", &self.interval_ms)
            .field("max_batch_size", &self.max_batch_size)
            .field("running", &self.handle.lock().is_some())
            .finish()
    }
}

/// One tick: execute up to `max_batch_size` pending intents, oldest first.
fn drain_batch(
    intents: &TradeIntentService,
    executor: &ExecutionService,
    max_batch_size: usize,
) {
    let batch = intents.list_pending(max_batch_size);
    if batch.is_empty() {
        return;
    }
    debug!(count = batch.len(), "draining pending intents");

    for intent in batch {
        match executor.execute(&intent.id) {
            Ok(ExecutionOutcome::Filled(record)) => {
                debug!(intent_id = %intent.id, execution_id = %record.id, "drained: filled");
            }
            Ok(ExecutionOutcome::Rejected { reason, .. }) => {
                debug!(intent_id = %intent.id, reason = reason.as_str(), "drained: rejected");
            }
            Ok(ExecutionOutcome::Failed(record)) => {
                debug!(
                    intent_id = %intent.id,
                    reason = record.failure_reason.as_deref().unwrap_or("unknown"),
                    "drained: failed"
                );
            }
            Ok(ExecutionOutcome::Skipped { status, .. }) => {
                debug!(intent_id = %intent.id, status = %status, "drained: already terminal");
            }
            Err(e) => {
                error!(intent_id = %intent.id, error = %e, "execution error; intent skipped");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentRegistry, RegisterAgentInput};
    use crate::autonomous::AutonomousGuard;
    use crate::clock::{Clock, ManualClock};
    use crate::event_bus::{Event, EventBus};
    use crate::fees::{FeeEngine, FeePolicy};
    use crate::intent_service::CreateIntentInput;
    use crate::market::MarketDataService;
    use crate::runtime_config::{AutonomousConfig, RiskConfig, TradingConfig};
    use crate::state_store::StateStore;
    use crate::types::{IntentStatus, Side, TradeMode};
    use parking_lot::Mutex as PMutex;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("colosseum-test-{}.json", Uuid::new_v4()))
    }

    struct Fixture {
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        clock: Arc<ManualClock>,
        intents: Arc<TradeIntentService>,
        executor: Arc<ExecutionService>,
        market: MarketDataService,
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

        let intents = Arc::new(TradeIntentService::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            clock.clone() as Arc<dyn Clock>,
            TradeMode::Paper,
        ));
        let executor = Arc::new(ExecutionService::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            clock.clone() as Arc<dyn Clock>,
            AutonomousGuard::new(&AutonomousConfig::default()),
            FeeEngine::new(FeePolicy {
                platform_fee_bps: 8.0,
                taker_fee_bps: 2.0,
            }),
        ));
        let market = MarketDataService::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            clock.clone() as Arc<dyn Clock>,
        );

        Fixture {
            store,
            bus,
            clock,
            intents,
            executor,
            market,
            agent_id: agent.id,
        }
    }

    fn submit(fx: &Fixture, notional: f64) -> String {
        fx.intents
            .create(
                CreateIntentInput {
                    agent_id: fx.agent_id.clone(),
                    symbol: "SOL".into(),
                    side: Side::Buy,
                    quantity: None,
                    notional_usd: Some(notional),
                    mode: None,
                    meta: None,
                },
                None,
            )
            .unwrap()
            .intent
            .id
    }

    #[tokio::test(start_paused = true)]
    async fn drains_in_creation_order_across_ticks() {
        let fx = fixture();
        fx.market.record_price("SOL", 100.0);

        let executed = Arc::new(PMutex::new(Vec::new()));
        let executed2 = Arc::clone(&executed);
        fx.bus.on("intent.executed", move |e| {
            if let Event::IntentExecuted { intent_id, .. } = e {
                executed2.lock().push(intent_id.clone());
            }
        });

        let i1 = submit(&fx, 10.0);
        fx.clock.advance(1);
        let i2 = submit(&fx, 20.0);
        fx.clock.advance(1);
        let i3 = submit(&fx, 30.0);

        let worker = ExecutionWorker::new(
            Arc::clone(&fx.intents),
            Arc::clone(&fx.executor),
            &WorkerConfig {
                interval_ms: 100,
                max_batch_size: 2,
            },
        );
        worker.start();

        // First tick fires immediately and drains a batch of two.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*executed.lock(), vec![i1.clone(), i2.clone()]);

        // Second tick picks up the remainder.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*executed.lock(), vec![i1, i2, i3]);

        worker.stop().await;
        assert_eq!(fx.store.snapshot().metrics.intents_executed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_cooperative_and_idempotent() {
        let fx = fixture();
        fx.market.record_price("SOL", 100.0);

        let worker = ExecutionWorker::new(
            Arc::clone(&fx.intents),
            Arc::clone(&fx.executor),
            &WorkerConfig {
                interval_ms: 50,
                max_batch_size: 10,
            },
        );
        worker.start();
        // A second start is a no-op.
        worker.start();

        submit(&fx, 10.0);
        tokio::time::sleep(Duration::from_millis(10)).await;

        worker.stop().await;
        worker.stop().await;

        // Intents created after shutdown are not drained.
        submit(&fx, 20.0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.store.snapshot().metrics.intents_executed, 1);
        assert_eq!(fx.store.snapshot().pending_intent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_bad_intent_does_not_kill_the_worker() {
        let fx = fixture();
        // No price for SOL: every execution fails terminally, the worker
        // keeps going.
        let i1 = submit(&fx, 10.0);
        let i2 = submit(&fx, 20.0);

        let worker = ExecutionWorker::new(
            Arc::clone(&fx.intents),
            Arc::clone(&fx.executor),
            &WorkerConfig {
                interval_ms: 50,
                max_batch_size: 10,
            },
        );
        worker.start();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snap = fx.store.snapshot();
        assert_eq!(snap.metrics.intents_failed, 2);
        assert_eq!(
            snap.trade_intents.get(&i1).unwrap().status,
            IntentStatus::Failed
        );
        assert_eq!(
            snap.trade_intents.get(&i2).unwrap().status,
            IntentStatus::Failed
        );

        // Now quote the price; a fresh intent fills on a later tick.
        fx.market.record_price("SOL", 100.0);
        let i3 = submit(&fx, 30.0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            fx.store.snapshot().trade_intents.get(&i3).unwrap().status,
            IntentStatus::Executed
        );

        worker.stop().await;
    }
}
