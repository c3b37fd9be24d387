// =============================================================================
// Momentum strategy — MACD histogram confirmed by volume
// =============================================================================
//
// Votes the direction of the MACD histogram, but only when the latest bar's
// volume exceeds its recent average — an unconfirmed histogram flip (no
// volume behind it) is treated as noise and held.

use super::Strategy;
use crate::indicators::cache::IndicatorTable;
use crate::types::{Bar, Signal, StrategyOutput};

pub struct MacdVolumeMomentum {
    volume_lookback: usize,
}

impl Default for MacdVolumeMomentum {
    fn default() -> Self {
        Self { volume_lookback: 20 }
    }
}

impl Strategy for MacdVolumeMomentum {
    fn id(&self) -> &'static str {
        "momentum"
    }

    fn evaluate(&self, bars: &[Bar], indicators: &IndicatorTable) -> StrategyOutput {
        let Some(macd) = indicators.macd else {
            return StrategyOutput::hold();
        };
        if bars.len() < self.volume_lookback + 1 {
            return StrategyOutput::hold();
        }

        let window = &bars[bars.len() - self.volume_lookback - 1..bars.len() - 1];
        let avg_volume: f64 = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
        let last_volume = bars.last().unwrap().volume;

        if avg_volume <= 0.0 || last_volume <= avg_volume {
            return StrategyOutput::hold();
        }

        let volume_boost = ((last_volume / avg_volume) - 1.0).min(1.0);
        let (signal, base_confidence) = if macd.histogram > 0.0 {
            (Signal::Buy, (macd.histogram.abs() / macd.macd.abs().max(1e-9)).min(1.0))
        } else if macd.histogram < 0.0 {
            (Signal::Sell, (macd.histogram.abs() / macd.macd.abs().max(1e-9)).min(1.0))
        } else {
            (Signal::Hold, 0.0)
        };

        let confidence = (base_confidence * 0.7 + volume_boost * 0.3).clamp(0.0, 1.0);

        let mut out = StrategyOutput { signal, confidence, indicators: Default::default() };
        out.indicators.insert("macd_histogram".into(), macd.histogram);
        out.indicators.insert("volume_ratio".into(), last_volume / avg_volume);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::macd::MacdValue;

    fn bars_with_volume(n: usize, last: f64) -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..n as i64)
            .map(|i| Bar { ts: i, open: 100.0, high: 101.0, low: 99.0, close: 100.0, volume: 10.0 })
            .collect();
        bars.last_mut().unwrap().volume = last;
        bars
    }

    #[test]
    fn holds_when_macd_missing() {
        let out = MacdVolumeMomentum::default().evaluate(&bars_with_volume(25, 10.0), &IndicatorTable::default());
        assert_eq!(out.signal, Signal::Hold);
    }

    #[test]
    fn holds_without_volume_confirmation() {
        let table = IndicatorTable {
            macd: Some(MacdValue { macd: 1.0, signal: 0.5, histogram: 0.5 }),
            ..Default::default()
        };
        let out = MacdVolumeMomentum::default().evaluate(&bars_with_volume(25, 10.0), &table);
        assert_eq!(out.signal, Signal::Hold);
    }

    #[test]
    fn buys_on_positive_histogram_with_volume_spike() {
        let table = IndicatorTable {
            macd: Some(MacdValue { macd: 1.0, signal: 0.5, histogram: 0.5 }),
            ..Default::default()
        };
        let out = MacdVolumeMomentum::default().evaluate(&bars_with_volume(25, 50.0), &table);
        assert_eq!(out.signal, Signal::Buy);
        assert!(out.confidence > 0.0);
    }

    #[test]
    fn sells_on_negative_histogram_with_volume_spike() {
        let table = IndicatorTable {
            macd: Some(MacdValue { macd: -1.0, signal: -0.5, histogram: -0.5 }),
            ..Default::default()
        };
        let out = MacdVolumeMomentum::default().evaluate(&bars_with_volume(25, 50.0), &table);
        assert_eq!(out.signal, Signal::Sell);
    }
}
