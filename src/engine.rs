use std::time::Instant;

use tracing::{debug, info, warn};

use crate::bar::{validate_sequence, Bar};
use crate::cancellation::CancellationToken;
use crate::data_source::HistoricalBars;
use crate::error::EngineError;
use crate::event_bus::{EventBus, MarketDataEvent, SignalAction};
use crate::executor::SimulatedExecutor;
use crate::metrics::compute_metrics;
use crate::models::{BacktestConfig, BacktestResult};
use crate::strategy::{Strategy, StrategyContext};

/// Drives one deterministic, single-threaded replay of a strategy against a
/// bar sequence (spec §4.4). Owns no I/O: bars come in through a
/// `HistoricalBars` source, results go out as a plain `BacktestResult`.
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Loads bars from `source` for the configured symbol/timeframe/date
    /// range and replays them against `strategy`.
    pub fn run(
        &self,
        source: &dyn HistoricalBars,
        strategy: &mut dyn Strategy,
        cancellation: &CancellationToken,
    ) -> Result<BacktestResult, EngineError> {
        self.config.validate()?;
        let bars = source.bars(
            &self.config.symbol,
            &self.config.timeframe,
            self.config.start_date,
            self.config.end_date,
        )?;
        validate_sequence(&bars)?;
        self.run_bars(&bars, strategy, cancellation)
    }

    /// The replay loop proper, given an already-validated bar sequence. Split
    /// out from [`run`] so the Optimizer/Walk-Forward harness can load bars
    /// once and replay them against many strategy instances.
    pub fn run_bars(
        &self,
        bars: &[Bar],
        strategy: &mut dyn Strategy,
        cancellation: &CancellationToken,
    ) -> Result<BacktestResult, EngineError> {
        let started = Instant::now();
        let mut bus = EventBus::default();
        let mut executor = SimulatedExecutor::new(&self.config);

        {
            let mut ctx = StrategyContext::new(self.config.symbol.clone(), &mut bus);
            strategy.initialize(&mut ctx);
            strategy.start(&mut ctx);
        }

        let total = bars.len();
        let log_every = (total / 10).max(1);

        for (i, bar) in bars.iter().enumerate() {
            if cancellation.is_cancelled() {
                warn!(symbol = %self.config.symbol, "backtest cancelled mid-replay");
                return Err(EngineError::Cancelled);
            }

            let day = bar.timestamp.date_naive();
            if executor.check_daily_loss_limit(day) {
                continue;
            }

            bus.publish_market_data(MarketDataEvent { bar: *bar });
            while let Some(event) = bus.next_market_data() {
                {
                    let mut ctx = StrategyContext::new(self.config.symbol.clone(), &mut bus);
                    strategy.on_market_data(&mut ctx, &event);
                }
                for signal in bus.drain_signals() {
                    let outcome = match signal.action {
                        SignalAction::Buy => executor.execute_buy(
                            signal.price,
                            signal.quantity,
                            bar.volume,
                            bar.timestamp,
                            &signal.reason,
                        ),
                        SignalAction::Sell => executor.execute_sell(
                            signal.price,
                            bar.volume,
                            bar.timestamp,
                            &signal.reason,
                        ),
                    };
                    if let Err(err) = outcome {
                        debug!(symbol = %self.config.symbol, %err, "signal not executed");
                    }
                }
            }

            executor.update_equity_curve(bar.timestamp, bar.close);

            if (i + 1) % log_every == 0 {
                info!(
                    symbol = %self.config.symbol,
                    progress_pct = ((i + 1) as f64 / total as f64 * 100.0).round(),
                    "replay progress"
                );
            }
        }

        if let Some(last) = bars.last() {
            executor.force_close_position(last.close, last.timestamp);
        }
        executor.finalize_remaining_day();

        {
            let mut ctx = StrategyContext::new(self.config.symbol.clone(), &mut bus);
            strategy.stop(&mut ctx);
        }

        let final_capital = executor.cash();
        let metrics = compute_metrics(
            executor.trades(),
            executor.daily_stats(),
            executor.equity_curve(),
            self.config.initial_capital,
            final_capital,
        );

        Ok(BacktestResult {
            config: self.config.clone(),
            initial_capital: self.config.initial_capital,
            final_capital,
            metrics,
            trades: executor.trades().to_vec(),
            daily_stats: executor.daily_stats().to_vec(),
            equity_curve: executor.equity_curve().to_vec(),
            duration: started.elapsed(),
            data_quality: None,
            extended_analytics: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::InMemoryBars;
    use crate::strategy::{BuyAndHoldStrategy, NoSignalStrategy};
    use chrono::{DateTime, TimeZone, Utc};

    fn t(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 16, 0, 0).unwrap()
    }

    fn rising_bars() -> Vec<Bar> {
        (1..=10)
            .map(|d| Bar::new(t(d), 100.0 + d as f64, 101.0 + d as f64, 99.0 + d as f64, 100.0 + d as f64, 10_000.0))
            .collect()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            symbol: "AAPL".into(),
            timeframe: "1Day".into(),
            start_date: t(1),
            end_date: t(20),
            initial_capital: 10_000.0,
            commission: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            slippage_model: Default::default(),
            max_position_size: 100.0,
            max_daily_loss: 0.0,
            max_daily_loss_pct: 0.0,
        }
    }

    /// S1: flat strategy never trades; equity ends exactly at initial capital.
    #[test]
    fn no_signal_strategy_never_trades() {
        let mut source = InMemoryBars::new();
        source.insert("AAPL", "1Day", rising_bars());
        let engine = BacktestEngine::new(config());
        let mut strategy = NoSignalStrategy;
        let result = engine
            .run(&source, &mut strategy, &CancellationToken::new())
            .unwrap();
        assert!(result.trades.is_empty());
        assert!((result.final_capital - 10_000.0).abs() < 1e-6);
    }

    /// Buy-and-hold is force-closed at the final bar: ends flat, one trade.
    #[test]
    fn buy_and_hold_force_closes_at_end() {
        let mut source = InMemoryBars::new();
        source.insert("AAPL", "1Day", rising_bars());
        let engine = BacktestEngine::new(config());
        let mut strategy = BuyAndHoldStrategy::new(10.0);
        let result = engine
            .run(&source, &mut strategy, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, "Backtest end - force close");
        assert!(result.final_capital > 10_000.0);
    }

    #[test]
    fn cancellation_aborts_the_run() {
        let mut source = InMemoryBars::new();
        source.insert("AAPL", "1Day", rising_bars());
        let engine = BacktestEngine::new(config());
        let mut strategy = NoSignalStrategy;
        let token = CancellationToken::new();
        token.cancel();
        let result = engine.run(&source, &mut strategy, &token);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn equity_curve_has_one_point_per_bar() {
        let mut source = InMemoryBars::new();
        source.insert("AAPL", "1Day", rising_bars());
        let engine = BacktestEngine::new(config());
        let mut strategy = NoSignalStrategy;
        let result = engine
            .run(&source, &mut strategy, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.equity_curve.len(), 10);
    }
}
