// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow); signal line = EMA(MACD line, signal).
// Built directly on top of `calculate_ema` — MACD has no smoothing logic of
// its own beyond composing two EMA passes.

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Most recent MACD reading for `(fast, slow, signal)` periods (typically
/// 12, 26, 9). `None` when there isn't enough data for all three EMAs.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdValue> {
    if slow == 0 || fast == 0 || signal == 0 || fast >= slow {
        return None;
    }
    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);
    if ema_fast.len() < ema_slow.len() {
        return None;
    }

    // Align series: ema_fast starts earlier than ema_slow by (slow - fast)
    // samples, so drop that leading offset before zipping.
    let offset = ema_fast.len() - ema_slow.len();
    let macd_line: Vec<f64> = ema_fast[offset..]
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < signal {
        return None;
    }
    let signal_line = calculate_ema(&macd_line, signal);
    let macd = *macd_line.last()?;
    let sig = *signal_line.last()?;

    Some(MacdValue { macd, signal: sig, histogram: macd - sig })
}
