// =============================================================================
// RegimeDetector — classifies recent bars into a market regime
// =============================================================================
//
// Thread-safe detector that caches the latest classification and tracks how
// long the current regime has persisted, following the same
// RwLock-guarded-state-plus-age-tracking shape this codebase uses elsewhere
// for regime detection — but with the trend-strength/vol-ratio formulas and
// the five-way {TrendUp, TrendDown, Range, Volatile, Unknown} taxonomy this
// engine requires instead of the ADX/BBW/Hurst/entropy rule set.

use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::atr::calculate_atr;
use crate::indicators::ema::calculate_sma;
use crate::types::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    TrendUp,
    TrendDown,
    Range,
    Volatile,
    Unknown,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrendUp => write!(f, "TrendUp"),
            Self::TrendDown => write!(f, "TrendDown"),
            Self::Range => write!(f, "Range"),
            Self::Volatile => write!(f, "Volatile"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub trend_strength: f64,
    pub vol_ratio: f64,
    pub confidence: f64,
    pub window_len: usize,
}

pub struct RegimeDetector {
    window: usize,
    min_window: usize,
    state: RwLock<Option<RegimeState>>,
    #[allow(dead_code)]
    last_change_time: RwLock<Instant>,
}

impl RegimeDetector {
    pub fn new(window: usize, min_window: usize) -> Self {
        Self {
            window,
            min_window,
            state: RwLock::new(None),
            last_change_time: RwLock::new(Instant::now()),
        }
    }

    /// Classify the trailing `window` bars. Fewer than `min_window` bars
    /// yields `Unknown/0`. Emits a debug log (and updates the age tracker)
    /// only when the classification differs from the prior tick's.
    pub fn update(&self, bars: &[Bar]) -> RegimeState {
        if bars.len() < self.min_window {
            let state = RegimeState {
                regime: Regime::Unknown,
                trend_strength: 0.0,
                vol_ratio: 0.0,
                confidence: 0.0,
                window_len: bars.len(),
            };
            *self.state.write() = Some(state.clone());
            return state;
        }

        let tail_len = self.window.min(bars.len());
        let window = &bars[bars.len() - tail_len..];
        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();

        let ma_fast = calculate_sma(&closes, (tail_len / 4).max(2)).unwrap_or(closes[closes.len() - 1]);
        let ma_slow = calculate_sma(&closes, tail_len).unwrap_or(ma_fast);
        let atr = calculate_atr(window, (tail_len / 2).max(2)).unwrap_or(1.0).max(1e-9);

        let trend_strength = (ma_fast - ma_slow) / atr;

        let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]) / w[0].max(1e-9)).collect();
        let half = returns.len() / 2;
        let recent_std = stdev(&returns[half..]);
        let baseline_std = stdev(&returns[..half]).max(1e-9);
        let vol_ratio = recent_std / baseline_std;

        let (regime, confidence) = classify(trend_strength, vol_ratio);

        let prev_regime = self.state.read().as_ref().map(|s| s.regime);
        if prev_regime != Some(regime) {
            *self.last_change_time.write() = Instant::now();
            debug!(old = ?prev_regime, new = %regime, trend_strength, vol_ratio, "regime changed");
        }

        let state = RegimeState { regime, trend_strength, vol_ratio, confidence, window_len: tail_len };
        *self.state.write() = Some(state.clone());
        state
    }

    pub fn current(&self) -> Option<RegimeState> {
        self.state.read().clone()
    }
}

fn classify(trend_strength: f64, vol_ratio: f64) -> (Regime, f64) {
    if trend_strength.abs() >= 0.65 && vol_ratio < 1.5 {
        let conf = remap(trend_strength.abs(), 0.65, 1.5, 0.6, 1.0);
        let regime = if trend_strength > 0.0 { Regime::TrendUp } else { Regime::TrendDown };
        return (regime, conf);
    }
    if vol_ratio >= 1.5 {
        let conf = remap(vol_ratio, 1.5, 3.0, 0.6, 1.0);
        return (Regime::Volatile, conf);
    }
    if trend_strength.abs() <= 0.35 {
        let conf = remap(trend_strength.abs(), 0.35, 0.0, 0.5, 1.0);
        return (Regime::Range, conf);
    }
    (Regime::Unknown, 0.3)
}

fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    out_lo + t.clamp(0.0, 1.0) * (out_hi - out_lo)
}

fn stdev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_trend_up() {
        let (regime, conf) = classify(0.8, 1.0);
        assert_eq!(regime, Regime::TrendUp);
        assert!(conf > 0.0);
    }

    #[test]
    fn classify_trend_down() {
        let (regime, _) = classify(-0.8, 1.0);
        assert_eq!(regime, Regime::TrendDown);
    }

    #[test]
    fn classify_volatile_overrides_moderate_trend() {
        let (regime, _) = classify(0.4, 2.0);
        assert_eq!(regime, Regime::Volatile);
    }

    #[test]
    fn classify_range() {
        let (regime, _) = classify(0.1, 1.0);
        assert_eq!(regime, Regime::Range);
    }

    #[test]
    fn classify_unknown_when_no_rule_fires() {
        let (regime, conf) = classify(0.5, 1.0);
        assert_eq!(regime, Regime::Unknown);
        assert!((conf - 0.3).abs() < 1e-10);
    }

    #[test]
    fn insufficient_bars_yields_unknown() {
        let detector = RegimeDetector::new(50, 35);
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar { ts: i, open: 100.0, high: 101.0, low: 99.0, close: 100.0, volume: 1.0 })
            .collect();
        let state = detector.update(&bars);
        assert_eq!(state.regime, Regime::Unknown);
        assert_eq!(state.confidence, 0.0);
    }

    #[test]
    fn clean_uptrend_classifies_trend_up() {
        let detector = RegimeDetector::new(50, 35);
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5;
                Bar { ts: i, open: close, high: close + 0.2, low: close - 0.2, close, volume: 1.0 }
            })
            .collect();
        let state = detector.update(&bars);
        assert_eq!(state.regime, Regime::TrendUp);
    }
}
