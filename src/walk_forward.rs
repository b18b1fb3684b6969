use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::cancellation::CancellationToken;
use crate::data_source::HistoricalBars;
use crate::engine::BacktestEngine;
use crate::error::AnalysisError;
use crate::models::{BacktestConfig, BacktestResult, EquityPoint, Trade};
use crate::optimizer::{run_optimization, OptimizerConfig, ParamGrid, FAILED_COMBINATION_SCORE};
use crate::overfitting::walk_forward_overfitting_probability;
use crate::strategy::build_strategy;

/// Whether the in-sample window grows with each period (anchored) or slides
/// forward at a fixed width (rolling) — spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Anchored,
    Rolling,
}

#[derive(Debug, Clone)]
pub struct WalkForwardConfig {
    pub is_period_days: i64,
    pub oos_period_days: i64,
    pub step_days: i64,
    pub mode: WindowMode,
}

#[derive(Debug, Clone, Copy)]
struct Period {
    is_start: DateTime<Utc>,
    is_end: DateTime<Utc>,
    oos_start: DateTime<Utc>,
    oos_end: DateTime<Utc>,
}

/// Generates consecutive IS/OOS period pairs covering `[start, end)`,
/// stopping once an out-of-sample window would run past `end` (spec §4.7).
fn generate_periods(start: DateTime<Utc>, end: DateTime<Utc>, config: &WalkForwardConfig) -> Vec<Period> {
    let is_period = Duration::days(config.is_period_days);
    let oos_period = Duration::days(config.oos_period_days);
    let step = Duration::days(config.step_days);

    let mut periods = Vec::new();
    let mut k: i32 = 0;
    loop {
        let is_start = match config.mode {
            WindowMode::Anchored => start,
            WindowMode::Rolling => start + step * k,
        };
        let is_end = match config.mode {
            WindowMode::Anchored => start + is_period + step * k,
            WindowMode::Rolling => is_start + is_period,
        };
        let oos_start = is_end;
        let oos_end = oos_start + oos_period;

        if oos_end > end || is_end <= is_start {
            break;
        }
        periods.push(Period {
            is_start,
            is_end,
            oos_start,
            oos_end,
        });
        k += 1;
    }
    periods
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardPeriodResult {
    pub period_index: u32,
    pub is_start: DateTime<Utc>,
    pub is_end: DateTime<Utc>,
    pub oos_start: DateTime<Utc>,
    pub oos_end: DateTime<Utc>,
    pub best_params: HashMap<String, f64>,
    pub is_metric_value: f64,
    pub oos_result: BacktestResult,
    /// `oos_metric / is_metric`; `0.0` when the in-sample metric is too close
    /// to zero to divide by meaningfully (spec §4.7 edge case).
    pub performance_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardAggregate {
    pub periods: Vec<WalkForwardPeriodResult>,
    pub positive_oos_periods: u32,
    pub mean_oos_return_pct: f64,
    pub median_oos_return_pct: f64,
    /// Mean of each period's out-of-sample Sharpe ratio (spec §4.7).
    pub averaged_oos_sharpe: f64,
    /// Out-of-sample win rate weighted by each period's trade count, not a
    /// plain average of per-period win rates (spec §4.7).
    pub weighted_oos_win_rate: f64,
    /// The largest out-of-sample max-drawdown percentage across all periods
    /// (spec §4.7), as distinct from the drawdown of the concatenated curve.
    pub max_oos_drawdown_pct: f64,
    pub combined_oos_trades: Vec<Trade>,
    pub combined_oos_equity_curve: Vec<EquityPoint>,
    pub overfitting_probability: Option<f64>,
}

/// Runs anchored or rolling walk-forward analysis (spec §4.7): for each
/// period, grid-searches the in-sample window for the best parameters, then
/// replays the strategy with those parameters on the untouched out-of-sample
/// window. Capital compounds across periods — each OOS run starts from the
/// previous period's ending capital. A period whose data or optimization
/// fails is logged and skipped rather than aborting the whole analysis.
pub fn run_walk_forward(
    base_config: &BacktestConfig,
    source: &dyn HistoricalBars,
    strategy_name: &str,
    grid: &ParamGrid,
    optimizer_config: &OptimizerConfig,
    wf_config: &WalkForwardConfig,
    cancellation: &CancellationToken,
) -> Result<WalkForwardAggregate, AnalysisError> {
    let periods = generate_periods(base_config.start_date, base_config.end_date, wf_config);
    if periods.is_empty() {
        return Err(AnalysisError::NoPeriods);
    }

    let mut cumulative_capital = base_config.initial_capital;
    let mut results = Vec::new();

    for (idx, period) in periods.iter().enumerate() {
        if cancellation.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let is_bars = match source.bars(
            &base_config.symbol,
            &base_config.timeframe,
            period.is_start,
            period.is_end,
        ) {
            Ok(bars) => bars,
            Err(err) => {
                warn!(period = idx, %err, "skipping period: no in-sample data");
                continue;
            }
        };
        let oos_bars = match source.bars(
            &base_config.symbol,
            &base_config.timeframe,
            period.oos_start,
            period.oos_end,
        ) {
            Ok(bars) => bars,
            Err(err) => {
                warn!(period = idx, %err, "skipping period: no out-of-sample data");
                continue;
            }
        };

        let mut is_config = base_config.clone();
        is_config.start_date = period.is_start;
        is_config.end_date = period.is_end;
        is_config.initial_capital = cumulative_capital;

        let optimization = match run_optimization(
            &is_config,
            &is_bars,
            strategy_name,
            grid,
            optimizer_config,
            cancellation,
        ) {
            Ok(results) => results,
            Err(err) => {
                warn!(period = idx, %err, "skipping period: optimization failed");
                continue;
            }
        };
        let Some(best) = optimization.first() else {
            warn!(period = idx, "skipping period: optimizer returned no combinations");
            continue;
        };
        if best.metric_value == FAILED_COMBINATION_SCORE {
            warn!(period = idx, "skipping period: every in-sample combination failed");
            continue;
        }

        let mut oos_config = base_config.clone();
        oos_config.start_date = period.oos_start;
        oos_config.end_date = period.oos_end;
        oos_config.initial_capital = cumulative_capital;

        let mut strategy = match build_strategy(strategy_name, &best.params) {
            Ok(strategy) => strategy,
            Err(err) => {
                warn!(period = idx, %err, "skipping period: could not build out-of-sample strategy");
                continue;
            }
        };
        let oos_engine = BacktestEngine::new(oos_config);
        let oos_result = match oos_engine.run_bars(&oos_bars, strategy.as_mut(), cancellation) {
            Ok(result) => result,
            Err(err) => {
                warn!(period = idx, %err, "skipping period: out-of-sample run failed");
                continue;
            }
        };

        cumulative_capital = oos_result.final_capital;
        let performance_ratio = if best.metric_value.abs() < 1e-6 {
            0.0
        } else {
            oos_result.metrics.sharpe_ratio / best.metric_value
        };

        results.push(WalkForwardPeriodResult {
            period_index: idx as u32,
            is_start: period.is_start,
            is_end: period.is_end,
            oos_start: period.oos_start,
            oos_end: period.oos_end,
            best_params: best.params.clone(),
            is_metric_value: best.metric_value,
            oos_result,
            performance_ratio,
        });
    }

    if results.is_empty() {
        return Err(AnalysisError::NoPeriods);
    }

    let oos_returns: Vec<f64> = results.iter().map(|r| r.oos_result.metrics.total_return_pct).collect();
    let positive_oos_periods = oos_returns.iter().filter(|r| **r > 0.0).count() as u32;
    let mean_oos_return_pct = oos_returns.iter().sum::<f64>() / oos_returns.len() as f64;
    let mut sorted_returns = oos_returns.clone();
    sorted_returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_oos_return_pct = sorted_returns[sorted_returns.len() / 2];

    let combined_oos_trades = results.iter().flat_map(|r| r.oos_result.trades.clone()).collect();
    let combined_oos_equity_curve = results
        .iter()
        .flat_map(|r| r.oos_result.equity_curve.clone())
        .collect();

    let is_sharpes: Vec<f64> = results.iter().map(|r| r.is_metric_value).collect();
    let oos_sharpes: Vec<f64> = results.iter().map(|r| r.oos_result.metrics.sharpe_ratio).collect();
    let overfitting_probability = walk_forward_overfitting_probability(&is_sharpes, &oos_sharpes);

    let averaged_oos_sharpe = oos_sharpes.iter().sum::<f64>() / oos_sharpes.len() as f64;

    let total_oos_trades: u32 = results.iter().map(|r| r.oos_result.metrics.total_trades).sum();
    let total_oos_wins: u32 = results.iter().map(|r| r.oos_result.metrics.winning_trades).sum();
    let weighted_oos_win_rate = if total_oos_trades == 0 {
        0.0
    } else {
        total_oos_wins as f64 / total_oos_trades as f64 * 100.0
    };

    let max_oos_drawdown_pct = results
        .iter()
        .map(|r| r.oos_result.metrics.max_drawdown_pct)
        .fold(0.0_f64, f64::max);

    Ok(WalkForwardAggregate {
        periods: results,
        positive_oos_periods,
        mean_oos_return_pct,
        median_oos_return_pct,
        averaged_oos_sharpe,
        weighted_oos_win_rate,
        max_oos_drawdown_pct,
        combined_oos_trades,
        combined_oos_equity_curve,
        overfitting_probability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn anchored_windows_grow_each_period() {
        let config = WalkForwardConfig {
            is_period_days: 10,
            oos_period_days: 5,
            step_days: 5,
            mode: WindowMode::Anchored,
        };
        let periods = generate_periods(t(1), t(40), &config);
        assert!(periods.len() >= 2);
        assert_eq!(periods[0].is_start, periods[1].is_start);
        assert!(periods[1].is_end > periods[0].is_end);
    }

    #[test]
    fn rolling_windows_keep_a_fixed_width() {
        let config = WalkForwardConfig {
            is_period_days: 10,
            oos_period_days: 5,
            step_days: 5,
            mode: WindowMode::Rolling,
        };
        let periods = generate_periods(t(1), t(40), &config);
        assert!(periods.len() >= 2);
        for period in &periods {
            assert_eq!((period.is_end - period.is_start).num_days(), 10);
        }
        assert!(periods[1].is_start > periods[0].is_start);
    }

    #[test]
    fn no_periods_fit_is_an_error() {
        let config = WalkForwardConfig {
            is_period_days: 400,
            oos_period_days: 400,
            step_days: 30,
            mode: WindowMode::Rolling,
        };
        let periods = generate_periods(t(1), t(40), &config);
        assert!(periods.is_empty());
    }
}
