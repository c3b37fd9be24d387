// =============================================================================
// IndicatorCache — memoizes derived indicator tables keyed by a bar-tail
// fingerprint
// =============================================================================
//
// Fingerprint: a SHA-256 digest (truncated to a u64 cache key) over the
// big-endian encoding of each `(ts, close)` pair in the trailing window —
// stable across runs and platforms, and avoids the float-formatting
// nondeterminism a stringified fingerprint would carry. `sha2` is already
// part of this codebase's dependency stack for content hashing elsewhere;
// this reuses it for a different purpose rather than adding a new crate.
//
// Eviction: LRU by capacity. Single-writer discipline via `parking_lot::RwLock`
// — reads take a read lock, a miss promotes to a write lock to insert.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::types::{Bar, Symbol};

#[derive(Debug, Clone, Default)]
pub struct IndicatorTable {
    pub sma_fast: Option<f64>,
    pub sma_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<crate::indicators::macd::MacdValue>,
    pub atr: Option<f64>,
    pub atr_ratio: Option<f64>,
}

pub fn fingerprint(bars: &[Bar]) -> u64 {
    let mut hasher = Sha256::new();
    for bar in bars {
        hasher.update(bar.ts.to_be_bytes());
        hasher.update(bar.close.to_be_bytes());
    }
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

struct Entry {
    value: IndicatorTable,
    last_used: u64,
}

pub struct IndicatorCache {
    capacity: usize,
    entries: RwLock<HashMap<Symbol, HashMap<u64, Entry>>>,
    clock: std::sync::atomic::AtomicU64,
}

impl IndicatorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
            clock: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Return the cached table for this bar tail if present; otherwise
    /// compute it with `f`, insert it (evicting the least-recently-used
    /// entry for this symbol if at capacity), and return it.
    pub fn get_or_compute(
        &self,
        symbol: &Symbol,
        bars: &[Bar],
        f: impl FnOnce(&[Bar]) -> IndicatorTable,
    ) -> IndicatorTable {
        let key = fingerprint(bars);
        let now = self.tick();

        {
            let mut entries = self.entries.write();
            if let Some(per_symbol) = entries.get_mut(symbol) {
                if let Some(entry) = per_symbol.get_mut(&key) {
                    entry.last_used = now;
                    return entry.value.clone();
                }
            }
        }

        let value = f(bars);

        let mut entries = self.entries.write();
        let per_symbol = entries.entry(symbol.clone()).or_default();
        if per_symbol.len() >= self.capacity && !per_symbol.contains_key(&key) {
            let lru_key = per_symbol
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(lru_key) = lru_key {
                per_symbol.remove(&lru_key);
            }
        }
        per_symbol.insert(key, Entry { value: value.clone(), last_used: now });
        value
    }

    pub fn len_for(&self, symbol: &Symbol) -> usize {
        self.entries.read().get(symbol).map(|m| m.len()).unwrap_or(0)
    }
}

/// Standard indicator set computed over a symbol's bar tail, used by
/// `IndicatorCache::get_or_compute` as the default population function.
pub fn compute_indicators(bars: &[Bar]) -> IndicatorTable {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    IndicatorTable {
        sma_fast: super::ema::calculate_sma(&closes, 10),
        sma_slow: super::ema::calculate_sma(&closes, 30),
        rsi: super::rsi::current_rsi(&closes, 14),
        macd: super::macd::calculate_macd(&closes, 12, 26, 9),
        atr: super::atr::calculate_atr(bars, 14),
        atr_ratio: super::atr::calculate_atr_ratio(bars, 14),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n as i64)
            .map(|i| Bar { ts: i, open: 100.0, high: 101.0, low: 99.0, close: 100.0 + i as f64, volume: 1.0 })
            .collect()
    }

    #[test]
    fn identical_fingerprint_for_identical_tail() {
        let a = bars(60);
        let b = bars(60);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_tail_changes_fingerprint() {
        let a = bars(60);
        let mut b = bars(60);
        b.last_mut().unwrap().close += 1.0;
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn cache_hit_returns_equal_value_without_recomputing() {
        let cache = IndicatorCache::new(10);
        let sym = Symbol::new("a");
        let data = bars(60);

        let mut calls = 0;
        let v1 = cache.get_or_compute(&sym, &data, |b| {
            calls += 1;
            compute_indicators(b)
        });
        let v2 = cache.get_or_compute(&sym, &data, |b| {
            calls += 1;
            compute_indicators(b)
        });

        assert_eq!(calls, 1);
        assert_eq!(v1.rsi, v2.rsi);
        assert_eq!(cache.len_for(&sym), 1);
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = IndicatorCache::new(2);
        let sym = Symbol::new("a");
        for i in 0..5 {
            let mut data = bars(60);
            data.last_mut().unwrap().close += i as f64;
            cache.get_or_compute(&sym, &data, compute_indicators);
        }
        assert!(cache.len_for(&sym) <= 2);
    }
}
