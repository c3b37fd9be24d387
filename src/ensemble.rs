// =============================================================================
// Ensemble — blends per-strategy votes into one decision via learned weights
// =============================================================================
//
// Keeps one multiplicative weight per (symbol, strategy) pair and blends
// votes through a softmax, the same weighted-sum-of-signals shape this
// codebase already used for combining indicator sub-scores — but with the
// weights now *learned online* from realized outcomes instead of fixed at
// construction, and with per-regime additive log-space biases layered on
// top of the softmax so a strategy's influence can swing with the market
// regime without losing its accumulated track record.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::BiasEntry;
use crate::regime::Regime;
use crate::types::{Signal, StrategyOutput, Symbol};

/// Memoized softmax output for a symbol: valid as long as `update_count`
/// hasn't moved past `as_of_count` and the regime used to compute it hasn't
/// changed underneath it.
#[derive(Debug, Clone, Default)]
struct NormalizedCache {
    as_of_count: u64,
    regime: Option<Regime>,
    normalized: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub signal: Signal,
    pub confidence: f64,
}

/// Per-symbol weight vector, one entry per strategy id.
#[derive(Debug, Default, Clone)]
struct WeightVec(BTreeMap<String, f64>);

impl WeightVec {
    fn weight_of(&self, strategy_id: &str) -> f64 {
        *self.0.get(strategy_id).unwrap_or(&1.0)
    }
}

pub struct Ensemble {
    eta0: f64,
    eta_decay_denom: f64,
    confidence_enter_threshold: f64,
    weight_min: f64,
    weight_max: f64,
    biases: BTreeMap<(String, String), f64>,
    weights: RwLock<BTreeMap<Symbol, WeightVec>>,
    update_count: RwLock<BTreeMap<Symbol, u64>>,
    normalized_cache: RwLock<BTreeMap<Symbol, NormalizedCache>>,
}

impl Ensemble {
    pub fn new(
        eta0: f64,
        eta_decay_denom: f64,
        confidence_enter_threshold: f64,
        weight_min: f64,
        weight_max: f64,
        bias_table: &[BiasEntry],
    ) -> Self {
        let biases = bias_table
            .iter()
            .map(|b| ((b.strategy_id.clone(), b.regime.clone()), b.bias))
            .collect();
        Self {
            eta0,
            eta_decay_denom,
            confidence_enter_threshold,
            weight_min,
            weight_max,
            biases,
            weights: RwLock::new(BTreeMap::new()),
            update_count: RwLock::new(BTreeMap::new()),
            normalized_cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Normalized softmax weights for `symbol` under `regime`, one entry per
    /// strategy id currently holding a learned weight. Memoized: reused as
    /// long as no `update()` has landed for this symbol since it was built
    /// and the regime hasn't moved out from under it (the cache is stale iff
    /// `update_count` changed), so repeated ticks against a settled regime
    /// are O(1) after the first.
    fn normalized_weights(&self, symbol: &Symbol, regime: Regime, strategy_ids: impl Iterator<Item = String>) -> BTreeMap<String, f64> {
        let current_count = *self.update_count.read().get(symbol).unwrap_or(&0);

        {
            let cache = self.normalized_cache.read();
            if let Some(entry) = cache.get(symbol) {
                if entry.as_of_count == current_count && entry.regime == Some(regime) {
                    return entry.normalized.clone();
                }
            }
        }

        let weights = self.weights.read();
        let wv = weights.get(symbol).cloned().unwrap_or_default();
        drop(weights);

        let regime_label = regime.to_string();
        let mut log_scores: Vec<(String, f64)> = strategy_ids
            .map(|id| {
                let bias = self.biases.get(&(id.clone(), regime_label.clone())).copied().unwrap_or(0.0);
                let log_w = wv.weight_of(&id).max(self.weight_min).ln();
                (id, log_w + bias)
            })
            .collect();

        // Softmax over (biased) log-weights, numerically stabilized.
        let max_log = log_scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
        let mut norm = 0.0;
        for (_, s) in log_scores.iter_mut() {
            *s = (*s - max_log).exp();
            norm += *s;
        }
        let normalized: BTreeMap<String, f64> = if norm > 0.0 {
            log_scores.into_iter().map(|(id, s)| (id, s / norm)).collect()
        } else {
            BTreeMap::new()
        };

        self.normalized_cache.write().insert(
            symbol.clone(),
            NormalizedCache { as_of_count: current_count, regime: Some(regime), normalized: normalized.clone() },
        );
        normalized
    }

    /// Combine every strategy's vote for `symbol` into a single decision,
    /// conditioning strategy influence on the current `regime`.
    pub fn decide(&self, symbol: &Symbol, regime: Regime, votes: &BTreeMap<String, StrategyOutput>) -> Decision {
        if votes.is_empty() {
            return Decision { signal: Signal::Hold, confidence: 0.0 };
        }

        let normalized = self.normalized_weights(symbol, regime, votes.keys().cloned());
        if normalized.is_empty() {
            return Decision { signal: Signal::Hold, confidence: 0.0 };
        }

        let mut buy_mass = 0.0;
        let mut sell_mass = 0.0;
        for (id, p) in &normalized {
            let Some(out) = votes.get(id) else { continue };
            match out.signal {
                Signal::Buy => buy_mass += p * out.confidence,
                Signal::Sell => sell_mass += p * out.confidence,
                Signal::Hold => {}
            }
        }

        let net = buy_mass - sell_mass;
        if net.abs() < self.confidence_enter_threshold {
            return Decision { signal: Signal::Hold, confidence: net.abs() };
        }

        let signal = if net > 0.0 { Signal::Buy } else { Signal::Sell };
        Decision { signal, confidence: net.abs().min(1.0) }
    }

    /// Apply a realized outcome for `symbol`/`strategy_id`: `log_return` is the
    /// signed return realized since that strategy's vote, `vote_sign` is +1
    /// for Buy, -1 for Sell. Weight update is multiplicative with a learning
    /// rate that decays as `1 / (1 + updates / eta_decay_denom)`, clamped to
    /// `[weight_min, weight_max]` so no strategy can be silenced or dominate
    /// permanently.
    pub fn update(&self, symbol: &Symbol, strategy_id: &str, vote_sign: f64, log_return: f64) {
        let mut counts = self.update_count.write();
        let count = counts.entry(symbol.clone()).or_insert(0);
        let eta = self.eta0 / (1.0 + (*count as f64) / self.eta_decay_denom);
        *count += 1;
        drop(counts);

        let reward = sigmoid(4.0 * vote_sign.signum() * log_return);
        let mut weights = self.weights.write();
        let wv = weights.entry(symbol.clone()).or_default();
        let current = wv.weight_of(strategy_id);
        let updated = (current * (eta * (reward - 0.5)).exp()).clamp(self.weight_min, self.weight_max);
        wv.0.insert(strategy_id.to_string(), updated);
        drop(weights);

        debug!(symbol = %symbol, strategy = strategy_id, reward, eta, updated, "ensemble weight updated");
    }

    pub fn weight_of(&self, symbol: &Symbol, strategy_id: &str) -> f64 {
        self.weights.read().get(symbol).map(|wv| wv.weight_of(strategy_id)).unwrap_or(1.0)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
