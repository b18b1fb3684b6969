use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::models::{BacktestConfig, DailyStats, EquityPoint, SlippageModel, Trade};

/// The at-most-one open long position (spec §3, §4.3).
#[derive(Debug, Clone)]
struct Position {
    entry_time: DateTime<Utc>,
    entry_price: f64,
    quantity: f64,
    entry_reason: String,
    /// Commission charged on the entry leg, already debited from cash.
    entry_commission: f64,
    entry_slippage: f64,
}

/// Holds cash and at most one position; applies slippage and commissions;
/// records closed trades, daily stats, and the equity curve; enforces the
/// daily-loss halt (spec §4.3).
pub struct SimulatedExecutor {
    symbol: String,
    cash: f64,
    position: Option<Position>,
    max_position_size: f64,
    commission_fixed: f64,
    commission_pct: f64,
    slippage_pct: f64,
    slippage_model: SlippageModel,
    max_daily_loss: f64,
    max_daily_loss_pct: f64,

    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    daily_stats: Vec<DailyStats>,
    next_trade_id: u64,

    current_day: Option<NaiveDate>,
    day_starting_cash: f64,
    day_pnl: f64,
    day_commission: f64,
    day_slippage: f64,
    day_trades: u32,
    day_wins: u32,
    day_losses: u32,
}

impl SimulatedExecutor {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            cash: config.initial_capital,
            position: None,
            max_position_size: config.max_position_size,
            commission_fixed: config.commission,
            commission_pct: config.commission_pct,
            slippage_pct: config.slippage_pct,
            slippage_model: config.slippage_model,
            max_daily_loss: config.max_daily_loss,
            max_daily_loss_pct: config.max_daily_loss_pct,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            daily_stats: Vec::new(),
            next_trade_id: 1,
            current_day: None,
            day_starting_cash: config.initial_capital,
            day_pnl: 0.0,
            day_commission: 0.0,
            day_slippage: 0.0,
            day_trades: 0,
            day_wins: 0,
            day_losses: 0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn daily_stats(&self) -> &[DailyStats] {
        &self.daily_stats
    }

    /// Effective slippage fraction for an order of `qty` shares against a bar
    /// that traded `bar_volume` shares. `Fixed` just returns the configured
    /// rate; `VolumeBased` widens it by the order's participation in the
    /// bar's volume (an open question the spec leaves unresolved — see
    /// DESIGN.md).
    fn effective_slippage_pct(&self, qty: f64, bar_volume: f64) -> f64 {
        match self.slippage_model {
            SlippageModel::Fixed => self.slippage_pct,
            SlippageModel::VolumeBased => {
                if bar_volume > 0.0 {
                    self.slippage_pct * (1.0 + qty / bar_volume)
                } else {
                    self.slippage_pct
                }
            }
        }
    }

    /// Opens a long position. Caps `qty` at `max_position_size`. No-op (with
    /// a warning) if a position is already open — the one-at-a-time rule
    /// (spec §4.3, testable property 1).
    pub fn execute_buy(
        &mut self,
        price: f64,
        qty: f64,
        bar_volume: f64,
        ts: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), ExecutionError> {
        if self.position.is_some() {
            warn!(symbol = %self.symbol, "buy signal ignored: position already open");
            return Err(ExecutionError::PositionAlreadyOpen);
        }
        if qty <= 0.0 {
            return Err(ExecutionError::InvalidQuantity);
        }
        if price <= 0.0 {
            return Err(ExecutionError::InvalidPrice);
        }

        let qty = qty.min(self.max_position_size);
        let slippage_pct = self.effective_slippage_pct(qty, bar_volume);
        let execution_price = price * (1.0 + slippage_pct);
        let commission = self.commission_fixed + self.commission_pct * execution_price * qty;
        let cost = execution_price * qty + commission;

        if cost > self.cash {
            debug!(symbol = %self.symbol, cost, cash = self.cash, "buy rejected: insufficient capital");
            return Err(ExecutionError::InsufficientCapital);
        }

        self.cash -= cost;
        let slippage = (execution_price - price).abs() * qty;

        self.position = Some(Position {
            entry_time: ts,
            entry_price: execution_price,
            quantity: qty,
            entry_reason: reason.to_string(),
            entry_commission: commission,
            entry_slippage: slippage,
        });

        Ok(())
    }

    /// Closes the open position at `price` (adjusted for slippage). Errs with
    /// `NoPosition` if flat.
    pub fn execute_sell(
        &mut self,
        price: f64,
        bar_volume: f64,
        ts: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), ExecutionError> {
        if price <= 0.0 {
            return Err(ExecutionError::InvalidPrice);
        }
        let position = self.position.take().ok_or(ExecutionError::NoPosition)?;

        let slippage_pct = self.effective_slippage_pct(position.quantity, bar_volume);
        let execution_price = price * (1.0 - slippage_pct);
        let exit_commission =
            self.commission_fixed + self.commission_pct * execution_price * position.quantity;
        let proceeds = execution_price * position.quantity - exit_commission;
        let cost_basis = position.entry_price * position.quantity;

        // §9 "known quirk", option (a): faithfully reproduce. Entry commission
        // was already debited from cash at entry; only the exit leg reduces
        // net_profit. `trade.commission` still reports both legs summed.
        let gross_profit = proceeds + exit_commission - cost_basis;
        let net_profit = proceeds - cost_basis;
        let exit_slippage = (price - execution_price).abs() * position.quantity;

        self.cash += proceeds;

        let return_pct = net_profit / (position.entry_price * position.quantity) * 100.0;
        let duration = ts - position.entry_time;

        let trade = Trade {
            trade_id: self.next_trade_id,
            symbol: self.symbol.clone(),
            entry_time: position.entry_time,
            exit_time: ts,
            entry_price: position.entry_price,
            entry_qty: position.quantity,
            exit_price: execution_price,
            exit_qty: position.quantity,
            gross_profit,
            net_profit,
            commission: position.entry_commission + exit_commission,
            slippage: position.entry_slippage + exit_slippage,
            return_pct,
            duration,
            entry_reason: position.entry_reason,
            exit_reason: reason.to_string(),
        };
        self.next_trade_id += 1;

        self.day_pnl += trade.net_profit;
        self.day_commission += exit_commission;
        self.day_slippage += exit_slippage;
        self.day_trades += 1;
        if trade.is_win() {
            self.day_wins += 1;
        } else {
            self.day_losses += 1;
        }

        self.trades.push(trade);
        Ok(())
    }

    /// If a position is open, emits a synthetic exit at `price` (spec §4.3,
    /// §4.4 step 5, scenario S6).
    pub fn force_close_position(&mut self, price: f64, ts: DateTime<Utc>) {
        if self.position.is_some() {
            // force close never participates in a volume constraint.
            let _ = self.execute_sell(price, f64::INFINITY, ts, "Backtest end - force close");
        }
    }

    /// Appends an equity-curve point marked to `mark_price`.
    pub fn update_equity_curve(&mut self, ts: DateTime<Utc>, mark_price: f64) {
        let (equity, unrealized_pnl) = match &self.position {
            Some(pos) => (
                self.cash + pos.quantity * mark_price,
                (mark_price - pos.entry_price) * pos.quantity,
            ),
            None => (self.cash, 0.0),
        };
        self.equity_curve.push(EquityPoint {
            timestamp: ts,
            equity,
            cash: self.cash,
            unrealized_pnl,
        });
    }

    /// On a day-boundary change, finalizes the previous day's `DailyStats`
    /// and resets the daily accumulators. Returns whether the remainder of
    /// `current_date` should be skipped (spec §4.3, §4.4 step 4).
    pub fn check_daily_loss_limit(&mut self, current_date: NaiveDate) -> bool {
        match self.current_day {
            None => {
                self.current_day = Some(current_date);
                self.day_starting_cash = self.cash;
                false
            }
            Some(day) if day != current_date => {
                self.finalize_day(day);
                self.current_day = Some(current_date);
                self.day_starting_cash = self.cash;
                false
            }
            Some(_) => {
                let starting_cash = self.day_starting_cash;
                let absolute_breach = self.day_pnl < -self.max_daily_loss && self.max_daily_loss > 0.0;
                let pct_breach = starting_cash > 0.0
                    && self.max_daily_loss_pct > 0.0
                    && (-self.day_pnl / starting_cash) > self.max_daily_loss_pct;
                if absolute_breach || pct_breach {
                    warn!(symbol = %self.symbol, day_pnl = self.day_pnl, "daily loss limit breached, halting for the day");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Finalizes any still-open trading day. Call once after the replay loop
    /// ends so the last day's `DailyStats` is not lost.
    pub fn finalize_remaining_day(&mut self) {
        if let Some(day) = self.current_day.take() {
            self.finalize_day(day);
        }
    }

    fn finalize_day(&mut self, day: NaiveDate) {
        let pnl_pct = if self.day_starting_cash > 0.0 {
            self.day_pnl / self.day_starting_cash * 100.0
        } else {
            0.0
        };
        self.daily_stats.push(DailyStats {
            date: day,
            starting_cash: self.day_starting_cash,
            ending_cash: self.cash,
            pnl: self.day_pnl,
            pnl_pct,
            trades: self.day_trades,
            wins: self.day_wins,
            losses: self.day_losses,
            commission: self.day_commission,
            slippage: self.day_slippage,
        });
        self.day_pnl = 0.0;
        self.day_commission = 0.0;
        self.day_slippage = 0.0;
        self.day_trades = 0;
        self.day_wins = 0;
        self.day_losses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            symbol: "AAPL".into(),
            timeframe: "1Day".into(),
            start_date: ts(1),
            end_date: ts(28),
            initial_capital: 10_000.0,
            commission: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            slippage_model: SlippageModel::Fixed,
            max_position_size: 100.0,
            max_daily_loss: 0.0,
            max_daily_loss_pct: 0.0,
        }
    }

    /// S2: one winning trade, zero costs.
    #[test]
    fn zero_cost_winning_round_trip() {
        let cfg = config();
        let mut exec = SimulatedExecutor::new(&cfg);
        exec.execute_buy(100.0, 100.0, 1_000_000.0, ts(1), "entry").unwrap();
        exec.execute_sell(105.0, 1_000_000.0, ts(2), "exit").unwrap();

        let trade = &exec.trades()[0];
        assert_eq!(exec.trades().len(), 1);
        assert!((trade.net_profit - 500.0).abs() < 1e-6);
        assert!((trade.return_pct - 5.0).abs() < 1e-6);
        assert!((exec.cash() - 10_500.0).abs() < 1e-6);
        assert!(exec.is_flat());
    }

    /// S3: slippage + commission applied symmetrically.
    #[test]
    fn slippage_and_commission_match_spec_example() {
        let mut cfg = config();
        cfg.slippage_pct = 0.01;
        cfg.commission = 1.0;
        let mut exec = SimulatedExecutor::new(&cfg);
        exec.execute_buy(100.0, 100.0, 1_000_000.0, ts(1), "entry").unwrap();
        exec.execute_sell(105.0, 1_000_000.0, ts(2), "exit").unwrap();

        let trade = &exec.trades()[0];
        assert!((trade.entry_price - 101.0).abs() < 1e-6);
        assert!((trade.exit_price - 103.95).abs() < 1e-6);
        assert!((trade.net_profit - 294.0).abs() < 1e-6);
        assert!((trade.commission - 2.0).abs() < 1e-6);
        assert!((exec.cash() - 10_293.0).abs() < 1e-6);
    }

    /// S4: insufficient capital leaves state untouched.
    #[test]
    fn insufficient_capital_is_a_noop() {
        let mut cfg = config();
        cfg.initial_capital = 100.0;
        let mut exec = SimulatedExecutor::new(&cfg);
        let result = exec.execute_buy(100.0, 10.0, 1_000_000.0, ts(1), "entry");
        assert_eq!(result.unwrap_err(), ExecutionError::InsufficientCapital);
        assert!(exec.is_flat());
        assert!((exec.cash() - 100.0).abs() < 1e-6);
        assert!(exec.trades().is_empty());
    }

    #[test]
    fn buy_while_long_is_a_noop() {
        let cfg = config();
        let mut exec = SimulatedExecutor::new(&cfg);
        exec.execute_buy(100.0, 10.0, 1_000_000.0, ts(1), "entry").unwrap();
        let second = exec.execute_buy(101.0, 10.0, 1_000_000.0, ts(2), "entry again");
        assert_eq!(second.unwrap_err(), ExecutionError::PositionAlreadyOpen);
    }

    #[test]
    fn force_close_flattens_open_position() {
        let cfg = config();
        let mut exec = SimulatedExecutor::new(&cfg);
        exec.execute_buy(100.0, 10.0, 1_000_000.0, ts(1), "entry").unwrap();
        exec.force_close_position(110.0, ts(5));
        assert!(exec.is_flat());
        assert_eq!(exec.trades()[0].exit_reason, "Backtest end - force close");
    }

    #[test]
    fn daily_loss_halt_trips_on_absolute_threshold() {
        let mut cfg = config();
        cfg.max_daily_loss = 2000.0;
        let mut exec = SimulatedExecutor::new(&cfg);
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(!exec.check_daily_loss_limit(d1));
        exec.execute_buy(100.0, 100.0, 1_000_000.0, ts(1), "e1").unwrap();
        exec.execute_sell(75.0, 1_000_000.0, ts(1), "x1").unwrap(); // -2500
        assert!(exec.check_daily_loss_limit(d1));
    }
}
