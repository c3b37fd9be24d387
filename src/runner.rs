// =============================================================================
// StrategyRunner — bounded-parallel evaluation of registered strategies
// =============================================================================
//
// Evaluations for distinct (symbol, strategy) pairs run concurrently on a
// fixed-size worker pool (a `tokio::sync::Semaphore` of size `workers`,
// following this codebase's convention of bounding concurrency with Tokio
// primitives rather than a dedicated thread-pool crate). A task exceeding
// its timeout is coerced to Hold/0 and never cancels its siblings — the
// runner always returns a complete, deterministically ordered map.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::indicators::cache::IndicatorTable;
use crate::strategy::Strategy;
use crate::types::{Bar, StrategyOutput, Symbol};

pub struct StrategyRunner {
    strategies: Vec<Arc<dyn Strategy>>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl StrategyRunner {
    pub fn new(strategies: Vec<Box<dyn Strategy>>, workers: usize, timeout: Duration) -> Self {
        Self {
            strategies: strategies.into_iter().map(Arc::from).collect(),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Evaluate every registered strategy against every symbol's bars.
    /// Returns a map ordered by `(symbol, strategy_id)` so downstream
    /// ensemble blending is reproducible given identical inputs.
    pub async fn run(
        &self,
        inputs: &BTreeMap<Symbol, (Vec<Bar>, IndicatorTable)>,
    ) -> BTreeMap<Symbol, BTreeMap<String, StrategyOutput>> {
        let mut handles = Vec::with_capacity(inputs.len() * self.strategies.len());

        for (symbol, (bars, indicators)) in inputs {
            for strategy in &self.strategies {
                let symbol = symbol.clone();
                let bars = bars.clone();
                let indicators = indicators.clone();
                let strategy = strategy.clone();
                let semaphore = self.semaphore.clone();
                let timeout = self.timeout;

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let strategy_id = strategy.id().to_string();

                    // Strategies are synchronous CPU work; run them on the
                    // blocking pool so a hung strategy can't starve the
                    // runtime, and so `timeout` can actually race it instead
                    // of just measuring how long one un-yielding poll took.
                    let eval = tokio::task::spawn_blocking(move || strategy.evaluate(&bars, &indicators));
                    let result = tokio::time::timeout(timeout, eval).await;

                    let output = match result {
                        Ok(Ok(out)) => out,
                        Ok(Err(e)) => {
                            warn!(symbol = %symbol, strategy = %strategy_id, error = %e, "strategy task panicked — coercing to Hold");
                            StrategyOutput::hold()
                        }
                        Err(_) => {
                            warn!(symbol = %symbol, strategy = %strategy_id, "strategy evaluation timed out — coercing to Hold");
                            StrategyOutput::hold()
                        }
                    };

                    (symbol, strategy_id, output)
                }));
            }
        }

        let mut out: BTreeMap<Symbol, BTreeMap<String, StrategyOutput>> = BTreeMap::new();
        for handle in handles {
            match handle.await {
                Ok((symbol, strategy_id, output)) => {
                    out.entry(symbol).or_default().insert(strategy_id, output);
                }
                Err(e) => {
                    warn!(error = %e, "strategy task panicked — skipped from this tick's results");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBuy;
    impl Strategy for AlwaysBuy {
        fn id(&self) -> &'static str {
            "always_buy"
        }
        fn evaluate(&self, _bars: &[Bar], _indicators: &IndicatorTable) -> StrategyOutput {
            StrategyOutput { signal: crate::types::Signal::Buy, confidence: 0.9, indicators: Default::default() }
        }
    }

    struct Sleeper;
    impl Strategy for Sleeper {
        fn id(&self) -> &'static str {
            "sleeper"
        }
        fn evaluate(&self, _bars: &[Bar], _indicators: &IndicatorTable) -> StrategyOutput {
            std::thread::sleep(Duration::from_millis(50));
            StrategyOutput { signal: crate::types::Signal::Sell, confidence: 0.5, indicators: Default::default() }
        }
    }

    fn sample_bars() -> Vec<Bar> {
        vec![Bar { ts: 0, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1.0 }]
    }

    #[tokio::test]
    async fn runs_all_strategies_for_all_symbols() {
        let runner = StrategyRunner::new(vec![Box::new(AlwaysBuy)], 4, Duration::from_secs(1));
        let mut inputs = BTreeMap::new();
        inputs.insert(Symbol::new("a"), (sample_bars(), IndicatorTable::default()));
        inputs.insert(Symbol::new("b"), (sample_bars(), IndicatorTable::default()));

        let results = runner.run(&inputs).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[&Symbol::new("a")]["always_buy"].signal, crate::types::Signal::Buy);
    }

    #[tokio::test]
    async fn timeout_coerces_to_hold() {
        let runner = StrategyRunner::new(vec![Box::new(Sleeper)], 4, Duration::from_millis(5));
        let mut inputs = BTreeMap::new();
        inputs.insert(Symbol::new("a"), (sample_bars(), IndicatorTable::default()));

        let results = runner.run(&inputs).await;
        let out = &results[&Symbol::new("a")]["sleeper"];
        assert_eq!(out.signal, crate::types::Signal::Hold);
        assert_eq!(out.confidence, 0.0);
    }
}
