// =============================================================================
// Mean-reversion strategy — RSI extremes
// =============================================================================
//
// Mirrors the RSI signal construction in the ensemble-scoring pipeline this
// codebase was adapted from: oversold (RSI < 30) votes Buy, overbought
// (RSI > 70) votes Sell, confidence scales with distance from the 50 midline.

use super::Strategy;
use crate::indicators::cache::IndicatorTable;
use crate::types::{Bar, Signal, StrategyOutput};

#[derive(Default)]
pub struct MeanReversionRsi;

impl Strategy for MeanReversionRsi {
    fn id(&self) -> &'static str {
        "mean_reversion"
    }

    fn evaluate(&self, _bars: &[Bar], indicators: &IndicatorTable) -> StrategyOutput {
        let Some(rsi) = indicators.rsi else {
            return StrategyOutput::hold();
        };

        let (signal, confidence) = if rsi < 30.0 {
            (Signal::Buy, ((30.0 - rsi) / 30.0).min(1.0))
        } else if rsi > 70.0 {
            (Signal::Sell, ((rsi - 70.0) / 30.0).min(1.0))
        } else {
            (Signal::Hold, 0.0)
        };

        let mut out = StrategyOutput { signal, confidence, indicators: Default::default() };
        out.indicators.insert("rsi".into(), rsi);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rsi: Option<f64>) -> IndicatorTable {
        IndicatorTable { rsi, ..Default::default() }
    }

    #[test]
    fn holds_when_rsi_missing() {
        let out = MeanReversionRsi.evaluate(&[], &table(None));
        assert_eq!(out.signal, Signal::Hold);
    }

    #[test]
    fn buys_when_oversold() {
        let out = MeanReversionRsi.evaluate(&[], &table(Some(20.0)));
        assert_eq!(out.signal, Signal::Buy);
        assert!(out.confidence > 0.0);
    }

    #[test]
    fn sells_when_overbought() {
        let out = MeanReversionRsi.evaluate(&[], &table(Some(85.0)));
        assert_eq!(out.signal, Signal::Sell);
        assert!(out.confidence > 0.0);
    }

    #[test]
    fn holds_in_neutral_zone() {
        let out = MeanReversionRsi.evaluate(&[], &table(Some(50.0)));
        assert_eq!(out.signal, Signal::Hold);
        assert_eq!(out.confidence, 0.0);
    }
}
