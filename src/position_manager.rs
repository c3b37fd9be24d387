// =============================================================================
// PositionManager — per-symbol position state machine
// =============================================================================
//
// Adapted from this codebase's open/partial/closed position tracker: the
// same `RwLock`-guarded position list, UUID identity, and highest-price
// trailing-stop tracking, generalized from a fixed TP1/TP2 pair to a
// configurable take-profit ladder and a Flat -> Opening -> Open -> Closing
// -> Flat life cycle with an explicit two-tick signal confirmation gate
// before a new position opens.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Side, Signal, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit(usize),
    TimeExit,
    TrailingStop,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit(level) => write!(f, "take_profit_{level}"),
            Self::TimeExit => write!(f, "time_exit"),
            Self::TrailingStop => write!(f, "trailing_stop"),
        }
    }
}

/// Instruction returned from a tick: either a partial reduction (ladder
/// level hit, position stays open) or a full close.
#[derive(Clone, Copy)]
pub enum ExitAction {
    Partial { fraction_of_original: f64, reason: ExitReason },
    Full { reason: ExitReason },
}

#[derive(Debug, Clone)]
pub struct Position {
    pub id: Uuid,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: f64,
    pub original_quantity: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub highest_price: f64,
    pub trailing_stop: Option<f64>,
    pub bars_held: u32,
    pub tp_levels_taken: Vec<bool>,
    pub opened_at: chrono::DateTime<Utc>,
    pub state: PositionState,
    /// Strategy ids whose vote agreed with the entry direction, for ensemble
    /// credit assignment when the position eventually closes.
    pub entry_strategies: Vec<String>,
}

impl Position {
    fn unrealized_return(&self, price: f64) -> f64 {
        self.side.direction() * (price - self.entry_price) / self.entry_price.max(1e-9)
    }
}

pub struct PositionManager {
    stop_pct: f64,
    tp_ladder: Vec<(f64, f64)>,
    t_max_bars: u32,
    time_exit_return_floor: f64,
    trail_enabled: bool,
    trail_give_back: f64,
    positions: RwLock<BTreeMap<Symbol, Position>>,
    pending: RwLock<BTreeMap<Symbol, (Signal, u32)>>,
}

impl PositionManager {
    pub fn new(
        stop_pct: f64,
        tp_ladder: Vec<(f64, f64)>,
        t_max_bars: u32,
        time_exit_return_floor: f64,
        trail_enabled: bool,
        trail_give_back: f64,
    ) -> Self {
        Self {
            stop_pct,
            tp_ladder,
            t_max_bars,
            time_exit_return_floor,
            trail_enabled,
            trail_give_back,
            positions: RwLock::new(BTreeMap::new()),
            pending: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn is_flat(&self, symbol: &Symbol) -> bool {
        !self.positions.read().contains_key(symbol)
    }

    pub fn open_count(&self) -> u32 {
        self.positions.read().len() as u32
    }

    /// Require the same non-Hold signal on two consecutive ticks before
    /// treating it as confirmed. Returns true on the confirming tick.
    pub fn confirm_signal(&self, symbol: &Symbol, signal: Signal) -> bool {
        if matches!(signal, Signal::Hold) {
            self.pending.write().remove(symbol);
            return false;
        }
        let mut pending = self.pending.write();
        let existing = pending.get(symbol).copied();
        match existing {
            Some((prev, count)) if prev == signal => {
                let confirmed = count + 1 >= 2;
                if confirmed {
                    pending.remove(symbol);
                } else {
                    pending.insert(symbol.clone(), (signal, count + 1));
                }
                confirmed
            }
            _ => {
                pending.insert(symbol.clone(), (signal, 1));
                false
            }
        }
    }

    pub fn open(&self, symbol: &Symbol, side: Side, entry_price: f64, quantity: f64, entry_strategies: Vec<String>) -> Uuid {
        let id = Uuid::new_v4();
        let stop_loss = entry_price * (1.0 - side.direction() * self.stop_pct);
        let position = Position {
            id,
            symbol: symbol.clone(),
            side,
            entry_price,
            original_quantity: quantity,
            quantity,
            stop_loss,
            highest_price: entry_price,
            trailing_stop: None,
            bars_held: 0,
            tp_levels_taken: vec![false; self.tp_ladder.len()],
            opened_at: Utc::now(),
            state: PositionState::Open,
            entry_strategies,
        };
        info!(symbol = %symbol, side = %side, entry_price, quantity, stop_loss, id = %id, "position opened");
        self.positions.write().insert(symbol.clone(), position);
        id
    }

    /// Advance one bar for `symbol` at `price`, returning the first exit
    /// action to apply. Checks run in order: take-profit ladder, time exit,
    /// stop-loss, trailing stop — the first match wins.
    pub fn on_tick(&self, symbol: &Symbol, price: f64) -> Option<ExitAction> {
        let mut positions = self.positions.write();
        let pos = positions.get_mut(symbol)?;
        pos.bars_held += 1;

        let dir = pos.side.direction();
        let is_favorable_extreme = dir * price > dir * pos.highest_price;
        if is_favorable_extreme {
            pos.highest_price = price;
            if self.trail_enabled {
                let trail = pos.highest_price * (1.0 - dir * self.trail_give_back);
                pos.trailing_stop = Some(trail);
                debug!(symbol = %symbol, trail, "trailing stop updated");
            }
        }

        // 1. Take-profit ladder, in order; highest untaken level that's
        // crossed wins, earlier (smaller) levels are implied to have fired.
        let ret = pos.unrealized_return(price);
        for (level, (threshold, fraction)) in self.tp_ladder.iter().enumerate() {
            if !pos.tp_levels_taken[level] && ret >= *threshold {
                let is_last_level = level == self.tp_ladder.len() - 1;
                pos.tp_levels_taken[level] = true;
                if is_last_level {
                    return Some(ExitAction::Full { reason: ExitReason::TakeProfit(level + 1) });
                }
                return Some(ExitAction::Partial {
                    fraction_of_original: *fraction,
                    reason: ExitReason::TakeProfit(level + 1),
                });
            }
        }

        // 2. Time exit — held too long without reaching the minimum return.
        if pos.bars_held >= self.t_max_bars && ret < self.time_exit_return_floor {
            return Some(ExitAction::Full { reason: ExitReason::TimeExit });
        }

        // 3. Stop-loss.
        let sl_hit = dir * price <= dir * pos.stop_loss;
        if sl_hit {
            return Some(ExitAction::Full { reason: ExitReason::StopLoss });
        }

        // 4. Trailing stop.
        if let Some(trail) = pos.trailing_stop {
            if dir * price <= dir * trail {
                return Some(ExitAction::Full { reason: ExitReason::TrailingStop });
            }
        }

        None
    }

    /// Reduce the open position's quantity by a fraction of its *original*
    /// size (a ladder level firing). The position remains open.
    pub fn reduce(&self, symbol: &Symbol, fraction_of_original: f64) -> Option<f64> {
        let mut positions = self.positions.write();
        let pos = positions.get_mut(symbol)?;
        let close_qty = (pos.original_quantity * fraction_of_original).min(pos.quantity);
        pos.quantity -= close_qty;
        Some(close_qty)
    }

    /// Remove and return the position entirely (a full close).
    pub fn close(&self, symbol: &Symbol) -> Option<Position> {
        let mut pos = self.positions.write().remove(symbol)?;
        pos.state = PositionState::Closing;
        info!(symbol = %symbol, id = %pos.id, remaining_qty = pos.quantity, "position closed");
        Some(pos)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.read().get(symbol).cloned()
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PositionManager {
        PositionManager::new(0.02, vec![(0.015, 0.5), (0.03, 0.25), (0.05, 0.25)], 20, 0.01, true, 0.005)
    }

    #[test]
    fn confirm_signal_requires_two_consecutive_ticks() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        assert!(!mgr.confirm_signal(&symbol, Signal::Buy));
        assert!(mgr.confirm_signal(&symbol, Signal::Buy));
    }

    #[test]
    fn confirm_signal_resets_on_hold() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        assert!(!mgr.confirm_signal(&symbol, Signal::Buy));
        assert!(!mgr.confirm_signal(&symbol, Signal::Hold));
        assert!(!mgr.confirm_signal(&symbol, Signal::Buy));
    }

    #[test]
    fn stop_loss_triggers_full_exit() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        mgr.open(&symbol, Side::Long, 100.0, 10.0, vec!["mean_reversion".to_string()]);
        let action = mgr.on_tick(&symbol, 97.0);
        assert!(matches!(action, Some(ExitAction::Full { reason: ExitReason::StopLoss })));
    }

    #[test]
    fn first_tp_level_triggers_partial_exit() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        mgr.open(&symbol, Side::Long, 100.0, 10.0, vec!["mean_reversion".to_string()]);
        let action = mgr.on_tick(&symbol, 102.0);
        match action {
            Some(ExitAction::Partial { fraction_of_original, reason }) => {
                assert_eq!(fraction_of_original, 0.5);
                assert_eq!(reason, ExitReason::TakeProfit(1));
            }
            other => panic!("expected partial exit, got {other:?}"),
        }
    }

    #[test]
    fn final_tp_level_triggers_full_exit() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        mgr.open(&symbol, Side::Long, 100.0, 10.0, vec!["mean_reversion".to_string()]);
        let action = mgr.on_tick(&symbol, 106.0);
        assert!(matches!(action, Some(ExitAction::Full { reason: ExitReason::TakeProfit(3) })));
    }

    #[test]
    fn time_exit_fires_after_max_bars_without_progress() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        mgr.open(&symbol, Side::Long, 100.0, 10.0, vec!["mean_reversion".to_string()]);
        let mut last = None;
        for _ in 0..20 {
            last = mgr.on_tick(&symbol, 100.2);
        }
        assert!(matches!(last, Some(ExitAction::Full { reason: ExitReason::TimeExit })));
    }

    #[test]
    fn reduce_shrinks_remaining_quantity() {
        let mgr = manager();
        let symbol = Symbol::new("x");
        mgr.open(&symbol, Side::Long, 100.0, 10.0, vec!["mean_reversion".to_string()]);
        let closed = mgr.reduce(&symbol, 0.5).unwrap();
        assert_eq!(closed, 5.0);
        assert_eq!(mgr.get(&symbol).unwrap().quantity, 5.0);
    }
}

impl std::fmt::Debug for ExitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Partial { fraction_of_original, reason } => {
                write!(f, "Partial({fraction_of_original}, {reason})")
            }
            Self::Full { reason } => write!(f, "Full({reason})"),
        }
    }
}
