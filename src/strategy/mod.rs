// =============================================================================
// Strategy — pure signal generators
// =============================================================================
//
// A strategy maps bars + indicators to a `StrategyOutput`. It must be
// deterministic and stateless between calls — any internal state belongs to
// the caller (StrategyRunner), never to the strategy itself. Strategies
// never panic or return an error; `evaluate` is an infallible function by
// construction so the runner can never observe a strategy exception.

pub mod breakout;
pub mod mean_reversion;
pub mod momentum;

use crate::indicators::cache::IndicatorTable;
use crate::types::{Bar, StrategyOutput};

pub trait Strategy: Send + Sync {
    /// Stable identifier used as the ensemble's weight-table key and in
    /// persisted decisions.
    fn id(&self) -> &'static str;

    fn evaluate(&self, bars: &[Bar], indicators: &IndicatorTable) -> StrategyOutput;
}

/// The three strategies that participate by default. Callers may register
/// additional strategies; nothing in the engine depends on this exact set.
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(mean_reversion::MeanReversionRsi::default()),
        Box::new(breakout::AtrBreakout::default()),
        Box::new(momentum::MacdVolumeMomentum::default()),
    ]
}
