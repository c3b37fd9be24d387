// =============================================================================
// PaperBroker — simulated market-order execution and cash/equity bookkeeping
// =============================================================================
//
// Fills are marked against the requested price with slippage and commission
// applied the way this codebase already separates "decision" from
// "execution" — the broker never second-guesses a sizing decision, it only
// prices the fill and updates cash. `PortfolioView` is the narrow read-only
// seam both the risk gate and the position manager consume, so neither has
// to depend on the concrete broker type (breaking what would otherwise be a
// risk <-> broker <-> position cyclic dependency).

use parking_lot::RwLock;
use tracing::info;

use crate::types::{Side, Symbol};

pub trait PortfolioView: Send + Sync {
    fn cash(&self) -> f64;
    fn equity(&self, mark_prices: &std::collections::BTreeMap<Symbol, f64>) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub side: Side,
    pub quantity: f64,
    pub requested_price: f64,
    pub fill_price: f64,
    pub commission: f64,
}

struct Ledger {
    cash: f64,
    holdings: std::collections::BTreeMap<Symbol, (Side, f64)>,
}

pub struct PaperBroker {
    commission_bps: f64,
    slippage_bps: f64,
    min_fee: f64,
    ledger: RwLock<Ledger>,
}

impl PaperBroker {
    pub fn new(start_cash: f64, commission_bps: f64, slippage_bps: f64, min_fee: f64) -> Self {
        Self {
            commission_bps,
            slippage_bps,
            min_fee,
            ledger: RwLock::new(Ledger { cash: start_cash, holdings: Default::default() }),
        }
    }

    /// Execute a market order. Buys slip the price up, sells slip it down;
    /// commission is `max(min_fee, notional * commission_bps / 1e4)`.
    pub fn execute(&self, symbol: &Symbol, side: Side, quantity: f64, reference_price: f64) -> Fill {
        let slip = reference_price * self.slippage_bps / 1e4;
        let fill_price = reference_price + side.direction() * slip;
        let notional = fill_price * quantity;
        let commission = (notional.abs() * self.commission_bps / 1e4).max(self.min_fee);

        let mut ledger = self.ledger.write();
        ledger.cash -= side.direction() * notional + commission;
        ledger.holdings.insert(symbol.clone(), (side, quantity));

        info!(symbol = %symbol, side = %side, quantity, fill_price, commission, "order filled");

        Fill { side, quantity, requested_price: reference_price, fill_price, commission }
    }

    /// Settle a close: realize PnL against the entry price and release cash.
    /// Returns the realized PnL.
    pub fn settle_close(&self, symbol: &Symbol, side: Side, quantity: f64, entry_price: f64, exit_price: f64) -> f64 {
        let slip = exit_price * self.slippage_bps / 1e4;
        let fill_price = exit_price - side.direction() * slip;
        let notional = fill_price * quantity;
        let commission = (notional.abs() * self.commission_bps / 1e4).max(self.min_fee);
        let pnl = side.direction() * (fill_price - entry_price) * quantity - commission;

        let mut ledger = self.ledger.write();
        ledger.cash += side.direction() * notional - commission;
        if let Some(holding) = ledger.holdings.get_mut(symbol) {
            holding.1 -= quantity;
            if holding.1 <= 1e-9 {
                ledger.holdings.remove(symbol);
            }
        }

        info!(symbol = %symbol, fill_price, commission, pnl, "position closed");
        pnl
    }

    pub fn cash(&self) -> f64 {
        self.ledger.read().cash
    }
}

impl PortfolioView for PaperBroker {
    fn cash(&self) -> f64 {
        self.ledger.read().cash
    }

    fn equity(&self, mark_prices: &std::collections::BTreeMap<Symbol, f64>) -> f64 {
        let ledger = self.ledger.read();
        let mark_to_market: f64 = ledger
            .holdings
            .iter()
            .filter_map(|(symbol, (_side, qty))| mark_prices.get(symbol).map(|price| price * qty))
            .sum();
        ledger.cash + mark_to_market
    }
}
