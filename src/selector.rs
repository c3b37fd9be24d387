// =============================================================================
// Symbol selection and per-symbol parameter overrides
// =============================================================================
//
// Narrow seams so the engine doesn't hard-code its universe or per-symbol
// tuning: `SymbolSelector` decides which symbols are in play this tick,
// `ParamStore` resolves per-symbol overrides of otherwise-global knobs (a
// tighter stop on a historically choppy symbol, say). Both ship a static
// reference implementation backed directly by `EngineConfig` — swapping in a
// dynamic universe or a live parameter feed means implementing the trait,
// not touching the engine.

use std::collections::BTreeMap;

use crate::types::Symbol;

pub trait SymbolSelector: Send + Sync {
    fn symbols(&self) -> Vec<Symbol>;
}

pub trait ParamStore: Send + Sync {
    /// A symbol-specific override of `stop_pct`, or `None` to use the global default.
    fn stop_pct_override(&self, symbol: &Symbol) -> Option<f64>;
}

pub struct StaticSymbolSelector {
    symbols: Vec<Symbol>,
}

impl StaticSymbolSelector {
    pub fn new(symbols: &[String]) -> Self {
        Self { symbols: symbols.iter().map(|s| Symbol::new(s)).collect() }
    }
}

impl SymbolSelector for StaticSymbolSelector {
    fn symbols(&self) -> Vec<Symbol> {
        self.symbols.clone()
    }
}

pub struct StaticParamStore {
    overrides: BTreeMap<Symbol, f64>,
}

impl StaticParamStore {
    pub fn new(overrides: BTreeMap<Symbol, f64>) -> Self {
        Self { overrides }
    }

    pub fn empty() -> Self {
        Self { overrides: BTreeMap::new() }
    }
}

impl ParamStore for StaticParamStore {
    fn stop_pct_override(&self, symbol: &Symbol) -> Option<f64> {
        self.overrides.get(symbol).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_selector_normalizes_symbols() {
        let selector = StaticSymbolSelector::new(&["abc".to_string(), "XYZ".to_string()]);
        let symbols = selector.symbols();
        assert_eq!(symbols, vec![Symbol::new("ABC"), Symbol::new("XYZ")]);
    }

    #[test]
    fn empty_param_store_has_no_overrides() {
        let store = StaticParamStore::empty();
        assert_eq!(store.stop_pct_override(&Symbol::new("ABC")), None);
    }

    #[test]
    fn param_store_returns_configured_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert(Symbol::new("ABC"), 0.01);
        let store = StaticParamStore::new(overrides);
        assert_eq!(store.stop_pct_override(&Symbol::new("ABC")), Some(0.01));
    }
}
