// =============================================================================
// Colosseum Engine — Main Entry Point
// =============================================================================
//
// Wires the core together: state store, event bus, services, and the
// execution worker. Without a live venue attached, an optional built-in
// paper tape keeps quotes moving so agents can trade in paper mode.
// =============================================================================

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use colosseum_engine::agents::{AgentRegistry, RegisterAgentInput};
use colosseum_engine::autonomous::AutonomousGuard;
use colosseum_engine::clock::{Clock, SystemClock};
use colosseum_engine::event_bus::{EventBus, TOPIC_ALL};
use colosseum_engine::execution_service::ExecutionService;
use colosseum_engine::fees::{FeeEngine, FeePolicy};
use colosseum_engine::hashing;
use colosseum_engine::intent_service::TradeIntentService;
use colosseum_engine::market::MarketDataService;
use colosseum_engine::runtime_config::RuntimeConfig;
use colosseum_engine::state_store::StateStore;
use colosseum_engine::worker::ExecutionWorker;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    let (mut config, config_error) = match RuntimeConfig::load(CONFIG_PATH) {
        Ok(config) => (config, None),
        Err(e) => (RuntimeConfig::default(), Some(e)),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_to_file =
        std::env::var("COLOSSEUM_LOG_TO_FILE").map(|v| v == "1").unwrap_or(false);
    if log_to_file {
        let log_path = std::path::Path::new(&config.paths.data_dir).join(&config.paths.log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Colosseum Engine — Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("COLOSSEUM_SYMBOLS") {
        let parsed: Vec<String> = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !parsed.is_empty() {
            config.trading.supported_symbols = parsed;
        }
    }

    info!(
        symbols = ?config.trading.supported_symbols,
        default_mode = %config.trading.default_mode,
        "Configured trading symbols"
    );

    // ── 2. Build shared core ─────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = StateStore::open(config.paths.state_path());
    let bus = Arc::new(EventBus::new());

    // Every published event is visible in the logs.
    bus.on(TOPIC_ALL, |event| {
        debug!(event = event.name(), "event published");
    });

    let registry = AgentRegistry::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        config.trading.clone(),
        config.risk.clone(),
    );
    let intents = Arc::new(TradeIntentService::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&clock),
        config.trading.default_mode,
    ));
    let market = Arc::new(MarketDataService::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&clock),
    ));
    let executor = Arc::new(ExecutionService::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&clock),
        AutonomousGuard::new(&config.autonomous),
        FeeEngine::new(FeePolicy {
            platform_fee_bps: config.trading.platform_fee_bps,
            taker_fee_bps: config.trading.taker_fee_bps,
        }),
    ));

    // ── 3. Seed a house agent on first boot ──────────────────────────────
    {
        let snapshot = store.snapshot();
        info!(
            agents = snapshot.agents.len(),
            pending_intents = snapshot.pending_intent_count(),
            executions = snapshot.executions.len(),
            "state loaded"
        );
        if snapshot.agents.is_empty() {
            match registry.register(RegisterAgentInput {
                name: "house".into(),
                strategy_id: Some("manual".into()),
                ..Default::default()
            }) {
                Ok(agent) => info!(agent_id = %agent.id, "seeded house agent"),
                Err(e) => warn!(error = %e, "failed to seed house agent"),
            }
        }
    }

    // ── 4. Paper tape (disable with COLOSSEUM_PAPER_FEED=0) ──────────────
    let paper_feed_enabled =
        std::env::var("COLOSSEUM_PAPER_FEED").map(|v| v != "0").unwrap_or(true);
    if paper_feed_enabled {
        let tape_market = Arc::clone(&market);
        let symbols = config.trading.supported_symbols.clone();
        tokio::spawn(async move {
            run_paper_tape(tape_market, symbols).await;
        });
        info!("paper tape started");
    }

    // ── 5. Execution worker ──────────────────────────────────────────────
    let worker = ExecutionWorker::new(
        Arc::clone(&intents),
        Arc::clone(&executor),
        &config.worker,
    );
    worker.start();

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    worker.stop().await;
    store.flush().await;

    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Colosseum Engine shut down complete.");
    Ok(())
}

/// Deterministic pseudo-random walk that keeps paper-mode quotes moving when
/// no venue feed is attached. Each step derives from a hash of
/// `(symbol, tick)`, bounded to ±0.2 % per step.
async fn run_paper_tape(market: Arc<MarketDataService>, symbols: Vec<String>) {
    let mut prices: Vec<(String, f64)> = symbols
        .into_iter()
        .map(|s| {
            let base = base_price(&s);
            (s, base)
        })
        .collect();

    // Publish the opening quotes immediately.
    for (symbol, price) in &prices {
        market.record_price(symbol, *price);
    }

    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(5));
    let mut tick: u64 = 0;
    loop {
        ticker.tick().await;
        tick += 1;
        for (symbol, price) in prices.iter_mut() {
            let digest = hashing::hash_message(&format!("{symbol}:{tick}"));
            // First hex byte of the digest -> drift in [-0.002, 0.002].
            let byte = u8::from_str_radix(&digest[..2], 16).unwrap_or(128);
            let drift = (f64::from(byte) - 127.5) / 127.5 * 0.002;
            *price *= 1.0 + drift;
            market.record_price(symbol, *price);
        }
    }
}

fn base_price(symbol: &str) -> f64 {
    match symbol {
        "SOL" => 150.0,
        "BTC" => 65_000.0,
        "ETH" => 3_500.0,
        "JUP" => 1.2,
        "BONK" => 0.000025,
        _ => 100.0,
    }
}
