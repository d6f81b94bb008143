// =============================================================================
// Event Bus — in-process publish/subscribe of typed engine events
// =============================================================================
//
// Dispatch is synchronous: `emit` invokes subscribers inline, in registration
// order, on the publishing thread. A panicking subscriber is caught and
// logged; it never takes down the publisher. Subscribers register for a named
// event or for `"*"` (every event) and receive an id usable for unsubscribe.
//
// The handler list is mutated under a lock; `emit` snapshots the list before
// iterating so handlers may subscribe/unsubscribe reentrantly.
// =============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

use crate::types::{Side, TradeMode};

/// Wildcard topic matching every event name.
pub const TOPIC_ALL: &str = "*";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Every event the core publishes. Names are a contract with external
/// consumers; payload fields serialize in camelCase.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum Event {
    #[serde(rename = "intent.created")]
    IntentCreated {
        intent_id: String,
        agent_id: String,
        symbol: String,
        side: Side,
    },

    #[serde(rename = "intent.executed")]
    IntentExecuted {
        execution_id: String,
        intent_id: String,
        agent_id: String,
        symbol: String,
        side: Side,
        quantity: f64,
        price_usd: f64,
        gross_notional_usd: f64,
        fee_usd: f64,
        net_usd: f64,
        realized_pnl_usd: f64,
        mode: TradeMode,
    },

    #[serde(rename = "intent.rejected")]
    IntentRejected {
        intent_id: String,
        agent_id: String,
        reason: String,
    },

    #[serde(rename = "intent.failed")]
    IntentFailed {
        intent_id: String,
        agent_id: String,
        reason: String,
    },

    #[serde(rename = "price.updated")]
    PriceUpdated { symbol: String, price_usd: f64 },

    #[serde(rename = "alert.created")]
    AlertCreated {
        alert_id: String,
        agent_id: String,
        symbol: String,
        threshold_usd: f64,
    },

    #[serde(rename = "alert.deleted")]
    AlertDeleted {
        alert_id: String,
        agent_id: String,
        symbol: String,
    },
}

impl Event {
    /// The dotted contract name subscribers match on.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IntentCreated { .. } => "intent.created",
            Self::IntentExecuted { .. } => "intent.executed",
            Self::IntentRejected { .. } => "intent.rejected",
            Self::IntentFailed { .. } => "intent.failed",
            Self::PriceUpdated { .. } => "price.updated",
            Self::AlertCreated { .. } => "alert.created",
            Self::AlertDeleted { .. } => "alert.deleted",
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by `on`, accepted by `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: u64,
    topic: String,
    handler: Handler,
}

/// Process-local synchronous event bus.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to a named event, or to `"*"` for every event. Handlers run
    /// inline on the publisher's thread, in registration order.
    pub fn on(
        &self,
        topic: &str,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().push(Subscriber {
            id,
            topic: topic.to_string(),
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id.0);
        subs.len() != before
    }

    /// Publish an event to all matching subscribers.
    pub fn emit(&self, event: &Event) {
        let name = event.name();
        let matched: Vec<Handler> = {
            let subs = self.subscribers.lock();
            subs.iter()
                .filter(|s| s.topic == TOPIC_ALL || s.topic == name)
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in matched {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(event = name, "event subscriber panicked; continuing");
            }
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
