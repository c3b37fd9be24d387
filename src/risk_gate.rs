// =============================================================================
// RiskGate — circuit breakers and position sizing
// =============================================================================
//
// Carries over this codebase's circuit-breaker shape for daily loss,
// consecutive losses, and drawdown limits — including the date-rollover
// `maybe_reset_daily` idiom — and adds the session-hours and open-position
// gates this engine's decision pipeline needs ahead of sizing. Gates are
// checked in a fixed order and the first failure wins, so a rejection always
// names one unambiguous reason.

use chrono::{NaiveTime, Timelike, Utc};
use parking_lot::RwLock;
use tracing::warn;

use crate::error::EngineError;
use crate::regime::Regime;
use crate::types::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    OutsideSession,
    KillSwitchDailyLoss,
    KillSwitchDrawdown,
    PositionCapReached,
    ExposureCapReached,
    BelowConfidenceFloor,
    SizeBelowOneUnit,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OutsideSession => "outside_session",
            Self::KillSwitchDailyLoss => "kill_switch_daily_loss",
            Self::KillSwitchDrawdown => "kill_switch_drawdown",
            Self::PositionCapReached => "position_cap_reached",
            Self::ExposureCapReached => "exposure_cap_reached",
            Self::BelowConfidenceFloor => "below_confidence_floor",
            Self::SizeBelowOneUnit => "size_below_one_unit",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
struct DailyCounters {
    date: chrono::NaiveDate,
    realized_pnl: f64,
    peak_equity: f64,
    daily_loss_killed: bool,
}

pub struct RiskGate {
    ignore_market_hours: bool,
    market_open_utc_secs: u32,
    market_close_utc_secs: u32,
    max_daily_loss: f64,
    max_drawdown: f64,
    max_positions: u32,
    max_position_pct: f64,
    confidence_enter_threshold: f64,
    risk_per_trade: f64,
    stop_pct: f64,
    counters: RwLock<DailyCounters>,
}

impl RiskGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ignore_market_hours: bool,
        market_open_utc_secs: u32,
        market_close_utc_secs: u32,
        max_daily_loss: f64,
        max_drawdown: f64,
        max_positions: u32,
        max_position_pct: f64,
        confidence_enter_threshold: f64,
        risk_per_trade: f64,
        stop_pct: f64,
        start_equity: f64,
    ) -> Self {
        Self {
            ignore_market_hours,
            market_open_utc_secs,
            market_close_utc_secs,
            max_daily_loss,
            max_drawdown,
            max_positions,
            max_position_pct,
            confidence_enter_threshold,
            risk_per_trade,
            stop_pct,
            counters: RwLock::new(DailyCounters {
                date: Utc::now().date_naive(),
                realized_pnl: 0.0,
                peak_equity: start_equity,
                daily_loss_killed: false,
            }),
        }
    }

    fn maybe_reset_daily(&self) {
        let today = Utc::now().date_naive();
        let mut counters = self.counters.write();
        if counters.date != today {
            counters.date = today;
            counters.realized_pnl = 0.0;
            counters.daily_loss_killed = false;
        }
    }

    /// Folds a realized fill's PnL into the day's running total and latches
    /// the daily-loss kill-switch once tripped: the switch stays engaged for
    /// the rest of the UTC day even if later fills bring `realized_pnl` back
    /// above the threshold.
    pub fn record_fill_pnl(&self, realized_pnl: f64, equity_after: f64) {
        self.maybe_reset_daily();
        let mut counters = self.counters.write();
        counters.realized_pnl += realized_pnl;
        counters.peak_equity = counters.peak_equity.max(equity_after);
        if !counters.daily_loss_killed
            && counters.realized_pnl < 0.0
            && (-counters.realized_pnl / equity_after.max(1e-9)) >= self.max_daily_loss
        {
            counters.daily_loss_killed = true;
            warn!(realized_pnl = counters.realized_pnl, "daily loss kill-switch latched for the rest of the day");
        }
    }

    fn in_session(&self) -> bool {
        if self.ignore_market_hours {
            return true;
        }
        let now = Utc::now().time();
        let secs = now.num_seconds_from_midnight();
        let open = NaiveTime::from_num_seconds_from_midnight_opt(self.market_open_utc_secs, 0);
        let close = NaiveTime::from_num_seconds_from_midnight_opt(self.market_close_utc_secs, 0);
        match (open, close) {
            (Some(_), Some(_)) => secs >= self.market_open_utc_secs && secs < self.market_close_utc_secs,
            _ => true,
        }
    }

    /// Run every gate in order against a candidate entry, then size it.
    /// Returns the final order quantity on success, or the first failing
    /// reason. `symbol_exposure_pct` is the candidate symbol's current
    /// exposure as a percent of equity (0 when flat, since this engine only
    /// opens a new position from a flat state).
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &self,
        signal: Signal,
        confidence: f64,
        open_position_count: u32,
        equity: f64,
        stop_distance_pct: f64,
        price: f64,
        regime: Regime,
        vol_ratio: f64,
        symbol_exposure_pct: f64,
    ) -> Result<f64, RejectReason> {
        self.maybe_reset_daily();

        if !self.in_session() {
            return Err(RejectReason::OutsideSession);
        }

        let counters = *self.counters.read();
        if counters.daily_loss_killed {
            return Err(RejectReason::KillSwitchDailyLoss);
        }
        let drawdown = (counters.peak_equity - equity) / counters.peak_equity.max(1e-9);
        if drawdown >= self.max_drawdown {
            warn!(drawdown, "drawdown kill-switch tripped");
            return Err(RejectReason::KillSwitchDrawdown);
        }

        if matches!(signal, Signal::Buy | Signal::Sell) && open_position_count >= self.max_positions {
            return Err(RejectReason::PositionCapReached);
        }

        let stop_pct_eff = self.stop_pct_eff(stop_distance_pct, vol_ratio);
        let qty0 = (equity * self.risk_per_trade) / (price.max(1e-9) * stop_pct_eff);
        let candidate_notional = qty0 * price;
        let candidate_pct = (candidate_notional / equity.max(1e-9)) * 100.0;
        if matches!(signal, Signal::Buy | Signal::Sell) && symbol_exposure_pct + candidate_pct > self.max_position_pct {
            return Err(RejectReason::ExposureCapReached);
        }

        if confidence < self.confidence_enter_threshold {
            return Err(RejectReason::BelowConfidenceFloor);
        }

        let qty = (qty0 * confidence_multiplier(confidence) * regime_multiplier(regime)).floor();
        if qty < 1.0 {
            return Err(RejectReason::SizeBelowOneUnit);
        }
        Ok(qty)
    }

    /// `clamp(0.5*vol_ratio + 0.5, 0.5, 2.0) * stop_pct`, widening the
    /// effective stop in choppier markets and tightening it in calm ones.
    /// Falls back to the configured default stop when the caller's override
    /// is non-positive.
    fn stop_pct_eff(&self, stop_distance_pct: f64, vol_ratio: f64) -> f64 {
        let stop = if stop_distance_pct > 0.0 { stop_distance_pct } else { self.stop_pct };
        let vol_mult = (0.5 * vol_ratio + 0.5).clamp(0.5, 2.0);
        (stop * vol_mult).max(1e-6)
    }
}

fn confidence_multiplier(confidence: f64) -> f64 {
    if confidence >= 0.75 {
        1.3
    } else if confidence >= 0.60 {
        1.0
    } else if confidence >= 0.40 {
        0.7
    } else {
        0.4
    }
}

fn regime_multiplier(regime: Regime) -> f64 {
    match regime {
        Regime::TrendUp | Regime::TrendDown => 1.2,
        Regime::Range => 0.8,
        Regime::Volatile => 0.7,
        Regime::Unknown => 1.0,
    }
}

impl From<RejectReason> for EngineError {
    fn from(reason: RejectReason) -> Self {
        EngineError::Rejection { reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> RiskGate {
        RiskGate::new(true, 0, 86400, 0.02, 0.06, 5, 60.0, 0.3, 0.01, 0.02, 100_000.0)
    }

    #[test]
    fn passes_with_room_under_every_gate() {
        let g = gate();
        let result = g.check(Signal::Buy, 0.9, 0, 100_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_below_confidence_floor() {
        let g = gate();
        let result = g.check(Signal::Buy, 0.1, 0, 100_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0);
        assert_eq!(result, Err(RejectReason::BelowConfidenceFloor));
    }

    #[test]
    fn rejects_at_position_cap() {
        let g = gate();
        let result = g.check(Signal::Buy, 0.9, 5, 100_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0);
        assert_eq!(result, Err(RejectReason::PositionCapReached));
    }

    #[test]
    fn rejects_at_exposure_cap() {
        let g = gate();
        let result = g.check(Signal::Buy, 0.9, 0, 100_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 15.0);
        assert_eq!(result, Err(RejectReason::ExposureCapReached));
    }

    #[test]
    fn rejects_on_daily_loss_kill_switch() {
        let g = gate();
        g.record_fill_pnl(-3000.0, 97_000.0);
        let result = g.check(Signal::Buy, 0.9, 0, 97_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0);
        assert_eq!(result, Err(RejectReason::KillSwitchDailyLoss));
    }

    #[test]
    fn daily_loss_kill_switch_latches_even_after_pnl_recovers() {
        let g = gate();
        g.record_fill_pnl(-3000.0, 97_000.0);
        // A later, fully offsetting gain brings realized PnL back to zero...
        g.record_fill_pnl(3000.0, 100_000.0);
        // ...but the kill-switch, once tripped, stays latched for the day.
        let result = g.check(Signal::Buy, 0.9, 0, 100_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0);
        assert_eq!(result, Err(RejectReason::KillSwitchDailyLoss));
    }

    #[test]
    fn rejects_on_drawdown_kill_switch() {
        let g = gate();
        g.record_fill_pnl(0.0, 130_000.0);
        g.record_fill_pnl(-20_000.0, 110_000.0);
        let result = g.check(Signal::Buy, 0.9, 0, 110_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0);
        assert_eq!(result, Err(RejectReason::KillSwitchDrawdown));
    }

    #[test]
    fn sizing_scales_inversely_with_stop_distance() {
        let g = gate();
        let tight = g.stop_pct_eff(0.01, 1.0);
        let wide = g.stop_pct_eff(0.04, 1.0);
        assert!(tight < wide);
    }

    #[test]
    fn higher_confidence_yields_larger_quantity() {
        let g = gate();
        let low = g.check(Signal::Buy, 0.45, 0, 1_000_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0).unwrap();
        let high = g.check(Signal::Buy, 0.9, 0, 1_000_000.0, 0.02, 100.0, Regime::Unknown, 1.0, 0.0).unwrap();
        assert!(high > low);
    }

    #[test]
    fn trend_regime_sizes_larger_than_volatile_regime() {
        let g = gate();
        let trend = g.check(Signal::Buy, 0.9, 0, 1_000_000.0, 0.02, 100.0, Regime::TrendUp, 1.0, 0.0).unwrap();
        let volatile = g.check(Signal::Buy, 0.9, 0, 1_000_000.0, 0.02, 100.0, Regime::Volatile, 1.0, 0.0).unwrap();
        assert!(trend > volatile);
    }

    #[test]
    fn rejects_when_sized_quantity_rounds_below_one_unit() {
        let g = gate();
        let result = g.check(Signal::Buy, 0.9, 0, 50.0, 0.02, 10_000.0, Regime::Unknown, 1.0, 0.0);
        assert_eq!(result, Err(RejectReason::SizeBelowOneUnit));
    }
}
