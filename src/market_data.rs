// =============================================================================
// MarketDataPort — external contract for fetching recent bars
// =============================================================================
//
// The engine never talks to a vendor transport directly; it calls
// `MarketDataPort::fetch` and tolerates partial results. This module ships
// one reference implementation, `InMemoryMarketData`, backed by a fixed
// table of pre-loaded bar series — enough to run the engine standalone and
// under test. A production deployment supplies its own impl over a real
// vendor connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::types::{Bar, Symbol};

#[async_trait::async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fetch up to `lookback` recent bars per symbol. Implementations should
    /// return bars ending at or before the call time. Missing symbols are
    /// reported via a partial-failure list rather than failing the whole
    /// call, so the engine can proceed with whatever subset is available.
    async fn fetch(
        &self,
        symbols: &[Symbol],
        lookback: usize,
    ) -> (HashMap<Symbol, Vec<Bar>>, Vec<EngineError>);
}

/// Reference implementation: a fixed table of bar series per symbol,
/// assembled by tests or by `main.rs`'s demo wiring from a static fixture.
pub struct InMemoryMarketData {
    tables: parking_lot::RwLock<HashMap<Symbol, Vec<Bar>>>,
}

impl InMemoryMarketData {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: parking_lot::RwLock::new(HashMap::new()),
        })
    }

    pub fn from_tables(tables: HashMap<Symbol, Vec<Bar>>) -> Arc<Self> {
        Arc::new(Self {
            tables: parking_lot::RwLock::new(tables),
        })
    }

    /// Append a bar to a symbol's series, simulating the next tick's data
    /// arriving. Used by tests and by the demo bootstrap in `main.rs`.
    pub fn push_bar(&self, symbol: &Symbol, bar: Bar) {
        self.tables.write().entry(symbol.clone()).or_default().push(bar);
    }

    pub fn set_series(&self, symbol: &Symbol, bars: Vec<Bar>) {
        self.tables.write().insert(symbol.clone(), bars);
    }
}

#[async_trait::async_trait]
impl MarketDataPort for InMemoryMarketData {
    async fn fetch(
        &self,
        symbols: &[Symbol],
        lookback: usize,
    ) -> (HashMap<Symbol, Vec<Bar>>, Vec<EngineError>) {
        // Simulate the I/O boundary with a sub-tick yield so the fetch
        // timeout wrapper in Engine::step has something real to race
        // against under test.
        tokio::time::sleep(Duration::from_micros(1)).await;

        let tables = self.tables.read();
        let mut out = HashMap::with_capacity(symbols.len());
        let mut errors = Vec::new();

        for symbol in symbols {
            match tables.get(symbol) {
                Some(series) if !series.is_empty() => {
                    let start = series.len().saturating_sub(lookback);
                    out.insert(symbol.clone(), series[start..].to_vec());
                }
                _ => errors.push(EngineError::DataUnavailable {
                    symbol: symbol.to_string(),
                }),
            }
        }

        (out, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar { ts, open: close, high: close, low: close, close, volume: 10.0 }
    }

    #[tokio::test]
    async fn fetch_returns_partial_results_for_missing_symbols() {
        let md = InMemoryMarketData::new();
        let a = Symbol::new("a");
        md.set_series(&a, vec![bar(1, 10.0), bar(2, 11.0)]);

        let b = Symbol::new("b");
        let (bars, errors) = md.fetch(&[a.clone(), b.clone()], 50).await;

        assert_eq!(bars.len(), 1);
        assert!(bars.contains_key(&a));
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn fetch_truncates_to_lookback() {
        let md = InMemoryMarketData::new();
        let a = Symbol::new("a");
        md.set_series(&a, (0..100).map(|i| bar(i, i as f64)).collect());

        let (bars, _) = md.fetch(&[a.clone()], 10).await;
        assert_eq!(bars[&a].len(), 10);
        assert_eq!(bars[&a].last().unwrap().ts, 99);
    }
}
