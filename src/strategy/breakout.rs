// =============================================================================
// Breakout strategy — ATR-normalized range break
// =============================================================================
//
// Votes Buy when the close breaks above the recent high by more than one
// ATR, Sell on the mirrored break below the recent low. Confidence scales
// with how many ATRs past the threshold the breakout reaches.

use super::Strategy;
use crate::indicators::cache::IndicatorTable;
use crate::types::{Bar, Signal, StrategyOutput};

pub struct AtrBreakout {
    lookback: usize,
}

impl Default for AtrBreakout {
    fn default() -> Self {
        Self { lookback: 20 }
    }
}

impl Strategy for AtrBreakout {
    fn id(&self) -> &'static str {
        "breakout"
    }

    fn evaluate(&self, bars: &[Bar], indicators: &IndicatorTable) -> StrategyOutput {
        let Some(atr) = indicators.atr else {
            return StrategyOutput::hold();
        };
        if atr <= 0.0 || bars.len() < self.lookback + 1 {
            return StrategyOutput::hold();
        }

        let window = &bars[bars.len() - self.lookback - 1..bars.len() - 1];
        let recent_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let recent_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = bars.last().unwrap().close;

        let (signal, confidence) = if close > recent_high + atr {
            let atrs_past = (close - recent_high) / atr;
            (Signal::Buy, (atrs_past / 3.0).min(1.0))
        } else if close < recent_low - atr {
            let atrs_past = (recent_low - close) / atr;
            (Signal::Sell, (atrs_past / 3.0).min(1.0))
        } else {
            (Signal::Hold, 0.0)
        };

        let mut out = StrategyOutput { signal, confidence, indicators: Default::default() };
        out.indicators.insert("atr".into(), atr);
        out.indicators.insert("recent_high".into(), recent_high);
        out.indicators.insert("recent_low".into(), recent_low);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bars(n: usize, level: f64) -> Vec<Bar> {
        (0..n as i64)
            .map(|i| Bar { ts: i, open: level, high: level + 1.0, low: level - 1.0, close: level, volume: 1.0 })
            .collect()
    }

    #[test]
    fn holds_when_atr_missing() {
        let out = AtrBreakout::default().evaluate(&flat_bars(25, 100.0), &IndicatorTable::default());
        assert_eq!(out.signal, Signal::Hold);
    }

    #[test]
    fn buys_on_upside_breakout() {
        let mut bars = flat_bars(25, 100.0);
        bars.push(Bar { ts: 99, open: 104.0, high: 105.0, low: 103.0, close: 105.0, volume: 1.0 });
        let table = IndicatorTable { atr: Some(1.0), ..Default::default() };
        let out = AtrBreakout::default().evaluate(&bars, &table);
        assert_eq!(out.signal, Signal::Buy);
        assert!(out.confidence > 0.0);
    }

    #[test]
    fn sells_on_downside_breakout() {
        let mut bars = flat_bars(25, 100.0);
        bars.push(Bar { ts: 99, open: 96.0, high: 97.0, low: 95.0, close: 95.0, volume: 1.0 });
        let table = IndicatorTable { atr: Some(1.0), ..Default::default() };
        let out = AtrBreakout::default().evaluate(&bars, &table);
        assert_eq!(out.signal, Signal::Sell);
    }

    #[test]
    fn holds_within_range() {
        let bars = flat_bars(25, 100.0);
        let table = IndicatorTable { atr: Some(1.0), ..Default::default() };
        let out = AtrBreakout::default().evaluate(&bars, &table);
        assert_eq!(out.signal, Signal::Hold);
    }
}
