// =============================================================================
// EngineConfig — typed, hot-loadable configuration for the decision engine
// =============================================================================
//
// Every tunable the engine reads lives here. All fields carry
// `#[serde(default = "...")]` so that adding a new key never breaks loading
// an older config file — the same discipline the rest of this codebase
// uses for its runtime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// --- Default-value helpers (required by serde `default = "..."`) -----------

fn default_symbols() -> Vec<String> {
    vec!["ALPHA".to_string(), "BETA".to_string(), "GAMMA".to_string()]
}

fn default_interval_secs() -> u64 {
    60
}

fn default_lookback() -> usize {
    120
}

fn default_max_positions() -> u32 {
    5
}

fn default_max_position_pct() -> f64 {
    20.0
}

fn default_max_daily_loss() -> f64 {
    0.02
}

fn default_max_drawdown() -> f64 {
    0.06
}

fn default_risk_per_trade() -> f64 {
    0.01
}

fn default_stop_pct() -> f64 {
    0.02
}

fn default_tp_ladder() -> Vec<(f64, f64)> {
    vec![(0.015, 0.5), (0.03, 0.25), (0.05, 0.25)]
}

fn default_t_max_bars() -> u32 {
    20
}

fn default_time_exit_return_floor() -> f64 {
    0.01
}

fn default_trail_give_back() -> f64 {
    0.005
}

fn default_eta0() -> f64 {
    0.3
}

fn default_eta_decay_denom() -> f64 {
    1000.0
}

fn default_confidence_enter_threshold() -> f64 {
    0.3
}

fn default_weight_min() -> f64 {
    1e-3
}

fn default_weight_max() -> f64 {
    1e3
}

fn default_workers() -> usize {
    4
}

fn default_strategy_timeout_secs() -> u64 {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_snapshot_every_k() -> u64 {
    10
}

fn default_commission_bps() -> f64 {
    2.0
}

fn default_slippage_bps() -> f64 {
    3.0
}

fn default_min_fee() -> f64 {
    0.01
}

fn default_start_cash() -> f64 {
    100_000.0
}

fn default_market_open_utc_secs() -> u32 {
    13 * 3600 + 1800 // 13:30 UTC
}

fn default_market_close_utc_secs() -> u32 {
    20 * 3600 // 20:00 UTC
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_indicator_cache_capacity() -> usize {
    50
}

fn default_regime_window() -> usize {
    50
}

fn default_regime_min_window() -> usize {
    35
}

fn default_db_path() -> String {
    "helios.sqlite3".to_string()
}

/// Biases applied to a strategy's log-weight before the ensemble softmax,
/// keyed by `(strategy_id, regime_label)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasEntry {
    pub strategy_id: String,
    pub regime: String,
    pub bias: f64,
}

fn default_bias_table() -> Vec<BiasEntry> {
    vec![
        BiasEntry { strategy_id: "breakout".into(), regime: "TrendUp".into(), bias: 0.4 },
        BiasEntry { strategy_id: "breakout".into(), regime: "TrendDown".into(), bias: 0.4 },
        BiasEntry { strategy_id: "mean_reversion".into(), regime: "TrendUp".into(), bias: -0.4 },
        BiasEntry { strategy_id: "mean_reversion".into(), regime: "TrendDown".into(), bias: -0.4 },
        BiasEntry { strategy_id: "mean_reversion".into(), regime: "Range".into(), bias: 0.4 },
        BiasEntry { strategy_id: "momentum".into(), regime: "Volatile".into(), bias: -0.2 },
    ]
}

/// Top-level configuration for the decision engine. Every field has a serde
/// default so older JSON config files missing new fields still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_lookback")]
    pub lookback: usize,

    // --- Risk caps -----------------------------------------------------
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: f64,
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,

    // --- Sizing / exits --------------------------------------------------
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    #[serde(default = "default_stop_pct")]
    pub stop_pct: f64,
    #[serde(default = "default_tp_ladder")]
    pub tp_ladder: Vec<(f64, f64)>,
    #[serde(default = "default_t_max_bars")]
    pub t_max_bars: u32,
    #[serde(default = "default_time_exit_return_floor")]
    pub time_exit_return_floor: f64,
    #[serde(default = "default_false")]
    pub trail_enabled: bool,
    #[serde(default = "default_trail_give_back")]
    pub trail_give_back: f64,

    // --- Ensemble knobs --------------------------------------------------
    #[serde(default = "default_eta0")]
    pub eta0: f64,
    #[serde(default = "default_eta_decay_denom")]
    pub eta_decay_denom: f64,
    #[serde(default = "default_confidence_enter_threshold")]
    pub confidence_enter_threshold: f64,
    #[serde(default = "default_weight_min")]
    pub weight_min: f64,
    #[serde(default = "default_weight_max")]
    pub weight_max: f64,
    #[serde(default = "default_bias_table")]
    pub bias_table: Vec<BiasEntry>,

    // --- Regime detector --------------------------------------------------
    #[serde(default = "default_regime_window")]
    pub regime_window: usize,
    #[serde(default = "default_regime_min_window")]
    pub regime_min_window: usize,

    // --- Concurrency / IO knobs -------------------------------------------
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_strategy_timeout_secs")]
    pub strategy_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_snapshot_every_k")]
    pub snapshot_every_k: u64,
    #[serde(default = "default_indicator_cache_capacity")]
    pub indicator_cache_capacity: usize,

    // --- Broker knobs ------------------------------------------------------
    #[serde(default = "default_commission_bps")]
    pub commission_bps: f64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: f64,
    #[serde(default = "default_min_fee")]
    pub min_fee: f64,
    #[serde(default = "default_start_cash")]
    pub start_cash: f64,

    // --- Session gate -------------------------------------------------------
    #[serde(default = "default_true")]
    pub ignore_market_hours: bool,
    #[serde(default = "default_market_open_utc_secs")]
    pub market_open_utc_secs: u32,
    #[serde(default = "default_market_close_utc_secs")]
    pub market_close_utc_secs: u32,

    // --- Persistence ----------------------------------------------------
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            interval_secs: default_interval_secs(),
            lookback: default_lookback(),
            max_positions: default_max_positions(),
            max_position_pct: default_max_position_pct(),
            max_daily_loss: default_max_daily_loss(),
            max_drawdown: default_max_drawdown(),
            risk_per_trade: default_risk_per_trade(),
            stop_pct: default_stop_pct(),
            tp_ladder: default_tp_ladder(),
            t_max_bars: default_t_max_bars(),
            time_exit_return_floor: default_time_exit_return_floor(),
            trail_enabled: default_false(),
            trail_give_back: default_trail_give_back(),
            eta0: default_eta0(),
            eta_decay_denom: default_eta_decay_denom(),
            confidence_enter_threshold: default_confidence_enter_threshold(),
            weight_min: default_weight_min(),
            weight_max: default_weight_max(),
            bias_table: default_bias_table(),
            regime_window: default_regime_window(),
            regime_min_window: default_regime_min_window(),
            workers: default_workers(),
            strategy_timeout_secs: default_strategy_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            snapshot_every_k: default_snapshot_every_k(),
            indicator_cache_capacity: default_indicator_cache_capacity(),
            commission_bps: default_commission_bps(),
            slippage_bps: default_slippage_bps(),
            min_fee: default_min_fee(),
            start_cash: default_start_cash(),
            ignore_market_hours: default_true(),
            market_open_utc_secs: default_market_open_utc_secs(),
            market_close_utc_secs: default_market_close_utc_secs(),
            db_path: default_db_path(),
        }
    }
}

impl EngineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Load configuration from a JSON file; missing file or parse error is
    /// surfaced to the caller so it can fall back to defaults with a warning.
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config from {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config from {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.symbols.len(), 3);
        assert_eq!(cfg.max_positions, 5);
        assert!(!cfg.trail_enabled);
        assert!(cfg.ignore_market_hours);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.t_max_bars, 20);
        assert!((cfg.eta0 - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialize_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["XYZ"], "max_positions": 9 }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["XYZ"]);
        assert_eq!(cfg.max_positions, 9);
        assert!((cfg.risk_per_trade - 0.01).abs() < f64::EPSILON);
    }
}
