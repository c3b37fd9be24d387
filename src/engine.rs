// =============================================================================
// Engine — ties the pipeline together, one tick at a time
// =============================================================================
//
// `step` runs the full decision pipeline for a single tick: fetch bars
// (bounded by a timeout, tolerating partial symbol coverage), compute
// indicators through the cache, evaluate strategies on the bounded worker
// pool, classify regime, blend votes through the ensemble, gate and size
// through the risk gate, advance each symbol's position state machine, and
// record every outcome through the repository. A symbol that fails at any
// stage is skipped for that tick; the tick always completes for the rest.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::broker::{PaperBroker, PortfolioView};
use crate::config::EngineConfig;
use crate::ensemble::Ensemble;
use crate::error::EngineError;
use crate::indicators::cache::{compute_indicators, IndicatorCache};
use crate::market_data::MarketDataPort;
use crate::position_manager::{ExitAction, PositionManager};
use crate::regime::RegimeDetector;
use crate::repository::Repository;
use crate::risk_gate::RiskGate;
use crate::runner::StrategyRunner;
use crate::selector::{ParamStore, SymbolSelector};
use crate::types::{Action, Side, Signal, Symbol};

pub struct Engine {
    config: EngineConfig,
    market_data: Arc<dyn MarketDataPort>,
    selector: Arc<dyn SymbolSelector>,
    params: Arc<dyn ParamStore>,
    indicator_cache: IndicatorCache,
    runner: StrategyRunner,
    regime_detectors: parking_lot::RwLock<BTreeMap<Symbol, Arc<RegimeDetector>>>,
    ensemble: Ensemble,
    risk_gate: RiskGate,
    positions: PositionManager,
    broker: PaperBroker,
    repository: Repository,
    tick: u64,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        market_data: Arc<dyn MarketDataPort>,
        selector: Arc<dyn SymbolSelector>,
        params: Arc<dyn ParamStore>,
        repository: Repository,
    ) -> Self {
        let runner = StrategyRunner::new(crate::strategy::default_strategies(), config.workers, config.strategy_timeout());
        let ensemble = Ensemble::new(
            config.eta0,
            config.eta_decay_denom,
            config.confidence_enter_threshold,
            config.weight_min,
            config.weight_max,
            &config.bias_table,
        );
        let risk_gate = RiskGate::new(
            config.ignore_market_hours,
            config.market_open_utc_secs,
            config.market_close_utc_secs,
            config.max_daily_loss,
            config.max_drawdown,
            config.max_positions,
            config.max_position_pct,
            config.confidence_enter_threshold,
            config.risk_per_trade,
            config.stop_pct,
            config.start_cash,
        );
        let positions = PositionManager::new(
            config.stop_pct,
            config.tp_ladder.clone(),
            config.t_max_bars,
            config.time_exit_return_floor,
            config.trail_enabled,
            config.trail_give_back,
        );
        let broker = PaperBroker::new(config.start_cash, config.commission_bps, config.slippage_bps, config.min_fee);
        let indicator_cache = IndicatorCache::new(config.indicator_cache_capacity);

        Self {
            config,
            market_data,
            selector,
            params,
            indicator_cache,
            runner,
            regime_detectors: parking_lot::RwLock::new(BTreeMap::new()),
            ensemble,
            risk_gate,
            positions,
            broker,
            repository,
            tick: 0,
        }
    }

    fn regime_detector_for(&self, symbol: &Symbol) -> Arc<RegimeDetector> {
        let mut detectors = self.regime_detectors.write();
        detectors
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RegimeDetector::new(self.config.regime_window, self.config.regime_min_window)))
            .clone()
    }

    /// Run one full tick. Never panics on a single symbol's failure; errors
    /// for one symbol are logged and that symbol is skipped for this tick.
    pub async fn step(&mut self) {
        self.tick += 1;
        let tick = self.tick;
        let symbols = self.selector.symbols();

        let fetch = tokio::time::timeout(self.config.fetch_timeout(), self.market_data.fetch(&symbols, self.config.lookback));
        let (bar_tables, fetch_errors) = match fetch.await {
            Ok(result) => result,
            Err(_) => {
                warn!(tick, "market data fetch timed out — skipping this tick entirely");
                return;
            }
        };
        for err in &fetch_errors {
            warn!(tick, error = %err, "symbol skipped this tick");
        }

        let mut inputs = BTreeMap::new();
        let mut last_price = BTreeMap::new();
        for (symbol, bars) in &bar_tables {
            if bars.len() < 2 {
                continue;
            }
            last_price.insert(symbol.clone(), bars.last().unwrap().close);
            let indicators = self.indicator_cache.get_or_compute(symbol, bars, compute_indicators);
            inputs.insert(symbol.clone(), (bars.clone(), indicators));
        }

        let votes = self.runner.run(&inputs).await;

        for (symbol, (bars, _indicators)) in &inputs {
            let regime_detector = self.regime_detector_for(symbol);
            let regime_state = regime_detector.update(bars);
            if let Err(e) = self.repository.record_regime_change(
                tick,
                symbol,
                &regime_state.regime.to_string(),
                regime_state.trend_strength,
                regime_state.vol_ratio,
            ) {
                error!(tick, symbol = %symbol, error = %e, "failed to persist regime history");
            }

            let symbol_votes = votes.get(symbol).cloned().unwrap_or_default();
            let decision = self.ensemble.decide(symbol, regime_state.regime, &symbol_votes);
            let price = *last_price.get(symbol).unwrap();

            self.apply_decision(
                tick,
                symbol,
                decision.signal,
                decision.confidence,
                price,
                regime_state.regime,
                regime_state.vol_ratio,
                &symbol_votes,
            );
        }

        let equity = self.broker.equity(&last_price);
        self.risk_gate.record_fill_pnl(0.0, equity);
        if let Ok(flushed) = self.repository.maybe_snapshot(tick, equity, self.broker.cash(), self.positions.open_count()) {
            if flushed {
                info!(tick, equity, "snapshot flushed");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_decision(
        &mut self,
        tick: u64,
        symbol: &Symbol,
        signal: Signal,
        confidence: f64,
        price: f64,
        regime: crate::regime::Regime,
        vol_ratio: f64,
        votes: &BTreeMap<String, crate::types::StrategyOutput>,
    ) {
        if let Some(action) = self.positions.on_tick(symbol, price) {
            self.execute_exit(tick, symbol, price, action);
        }

        let action = if self.positions.is_flat(symbol) { Action::Open } else { Action::Hold };
        if let Err(e) = self.repository.record_decision(tick, symbol, signal, confidence, &action.to_string()) {
            error!(tick, symbol = %symbol, error = %e, "failed to persist decision");
        }

        if !matches!(signal, Signal::Buy | Signal::Sell) {
            return;
        }
        if !self.positions.is_flat(symbol) {
            return;
        }
        if !self.positions.confirm_signal(symbol, signal) {
            return;
        }

        let stop_pct = self.params.stop_pct_override(symbol).unwrap_or(self.config.stop_pct);
        let equity = self.broker.equity(&BTreeMap::from([(symbol.clone(), price)]));
        // Flat by construction here (guarded above), so this symbol carries no
        // pre-existing exposure for the exposure-cap check to add to.
        let symbol_exposure_pct = 0.0;
        let sizing = self.risk_gate.check(
            signal,
            confidence,
            self.positions.open_count(),
            equity,
            stop_pct,
            price,
            regime,
            vol_ratio,
            symbol_exposure_pct,
        );

        match sizing {
            Ok(quantity) => {
                let Some(side) = Side::from_signal(signal) else { return };
                let fill = self.broker.execute(symbol, side, quantity, price);
                let entry_strategies: Vec<String> = votes
                    .iter()
                    .filter(|(_, out)| out.signal == signal)
                    .map(|(id, _)| id.clone())
                    .collect();
                self.positions.open(symbol, side, fill.fill_price, quantity, entry_strategies);
                if let Err(e) = self.repository.record_fill(tick, symbol, side, quantity, fill.fill_price, fill.commission) {
                    error!(tick, symbol = %symbol, error = %e, "failed to persist fill");
                }
            }
            Err(reason) => {
                let err: EngineError = reason.into();
                if let Err(e) = self.repository.record_rejection(tick, symbol, &reason.to_string()) {
                    error!(tick, symbol = %symbol, error = %e, "failed to persist rejection");
                }
                info!(tick, symbol = %symbol, reason = %err, "entry rejected");
            }
        }
    }

    fn execute_exit(&mut self, tick: u64, symbol: &Symbol, price: f64, action: ExitAction) {
        let Some(position) = self.positions.get(symbol) else { return };

        match action {
            ExitAction::Partial { fraction_of_original, reason } => {
                if let Some(qty) = self.positions.reduce(symbol, fraction_of_original) {
                    let pnl = self.broker.settle_close(symbol, position.side, qty, position.entry_price, price);
                    info!(tick, symbol = %symbol, reason = %reason, qty, pnl, "partial exit executed");
                    self.risk_gate.record_fill_pnl(pnl, self.broker.cash());
                    if let Err(e) = self.repository.record_fill(tick, symbol, position.side, qty, price, 0.0) {
                        error!(tick, symbol = %symbol, error = %e, "failed to persist partial exit fill");
                    }
                }
            }
            ExitAction::Full { reason } => {
                if let Some(closed) = self.positions.close(symbol) {
                    let pnl = self.broker.settle_close(symbol, closed.side, closed.quantity, closed.entry_price, price);
                    info!(tick, symbol = %symbol, reason = %reason, pnl, "position fully exited");
                    self.risk_gate.record_fill_pnl(pnl, self.broker.cash());
                    if let Err(e) = self.repository.record_fill(tick, symbol, closed.side, closed.quantity, price, 0.0) {
                        error!(tick, symbol = %symbol, error = %e, "failed to persist full exit fill");
                    }
                    let sign = closed.side.direction();
                    let ret = (price - closed.entry_price) / closed.entry_price.max(1e-9);
                    let log_return = sign * (1.0 + ret).ln();
                    for strategy_id in &closed.entry_strategies {
                        self.ensemble.update(symbol, strategy_id, sign, log_return);
                        let weight = self.ensemble.weight_of(symbol, strategy_id);
                        if let Err(e) = self.repository.record_weight(symbol, strategy_id, weight) {
                            error!(symbol = %symbol, error = %e, "failed to persist ensemble weight");
                        }
                    }
                }
            }
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn open_position_count(&self) -> u32 {
        self.positions.open_count()
    }

    pub fn equity(&self, mark_prices: &BTreeMap<Symbol, f64>) -> f64 {
        self.broker.equity(mark_prices)
    }
}
