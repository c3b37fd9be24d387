// =============================================================================
// Helios Engine — Main Entry Point
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use helios_core::clock::Clock;
use helios_core::config::EngineConfig;
use helios_core::engine::Engine;
use helios_core::market_data::InMemoryMarketData;
use helios_core::repository::Repository;
use helios_core::selector::{StaticParamStore, StaticSymbolSelector};
use helios_core::types::{Bar, Symbol};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("helios-engine starting up");

    let config_path = std::env::var("HELIOS_CONFIG").unwrap_or_else(|_| "helios_config.json".to_string());
    let config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "failed to load config, using defaults");
        EngineConfig::default()
    });

    info!(symbols = ?config.symbols, interval_secs = config.interval_secs, "engine configured");

    let market_data = InMemoryMarketData::new();
    seed_demo_series(&market_data, &config.symbols);

    let selector = Arc::new(StaticSymbolSelector::new(&config.symbols));
    let params = Arc::new(StaticParamStore::empty());
    let repository = Repository::open(&config.db_path, config.snapshot_every_k)?;

    let interval = config.interval();
    let mut engine = Engine::new(config, market_data, selector, params, repository);
    let mut clock = Clock::new(interval);

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = clock.next_tick() => {
                engine.step().await;
                info!(tick = engine.tick_count(), "tick complete");
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, exiting after current tick");
                break;
            }
        }
    }

    Ok(())
}

/// Populate the in-memory market data with a deterministic synthetic series
/// per symbol, enough history to satisfy regime/indicator lookbacks on the
/// first tick. Intended for standalone/demo runs; a production deployment
/// wires a real `MarketDataPort` implementation instead.
fn seed_demo_series(market_data: &Arc<InMemoryMarketData>, symbols: &[String]) {
    let mut tables = HashMap::new();
    for (idx, raw_symbol) in symbols.iter().enumerate() {
        let symbol = Symbol::new(raw_symbol);
        let base = 100.0 + idx as f64 * 10.0;
        let bars: Vec<Bar> = (0..200)
            .map(|i| {
                let drift = (i as f64 * 0.05).sin() * 2.0 + i as f64 * 0.02;
                let close = base + drift;
                Bar {
                    ts: i as i64 * 60_000,
                    open: close - 0.1,
                    high: close + 0.3,
                    low: close - 0.3,
                    close,
                    volume: 1_000.0 + (i as f64 * 7.0).cos().abs() * 500.0,
                }
            })
            .collect();
        tables.insert(symbol, bars);
    }
    for (symbol, bars) in tables {
        market_data.set_series(&symbol, bars);
    }
}
