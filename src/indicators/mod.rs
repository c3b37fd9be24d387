// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the
// trading engine. Every public function returns an `Option`/empty-`Vec` so
// callers are forced to handle insufficient-data and numerical edge cases.

pub mod atr;
pub mod cache;
pub mod ema;
pub mod macd;
pub mod rsi;
