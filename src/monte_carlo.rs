use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AnalysisError;
use crate::models::Trade;

const RUIN_DRAWDOWN_PCT: f64 = 50.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// SplitMix64's increment constant, used to derive well-distributed
/// per-simulation seeds from one parent seed without a shared RNG.
const SEED_SPREAD: u64 = 0x9E3779B97F4A7C15;

/// Input to a Monte Carlo bootstrap (spec §4.8). `seed = 0` draws a fresh
/// seed from the wall clock, so two runs without an explicit seed are not
/// expected to reproduce each other; any other value is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct MonteCarloConfig {
    pub num_simulations: u32,
    pub confidence_level: f64,
    pub target_return_pct: f64,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            confidence_level: 0.95,
            target_return_pct: 10.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub simulations: u32,
    pub seed: u64,
    pub mean_return_pct: f64,
    pub median_return_pct: f64,
    pub std_dev_return_pct: f64,
    pub min_return_pct: f64,
    pub max_return_pct: f64,
    pub confidence_interval_low: f64,
    pub confidence_interval_high: f64,
    pub probability_of_profit: f64,
    pub probability_of_target: f64,
    pub risk_of_ruin: f64,
    pub min_drawdown_pct: f64,
    pub max_drawdown_pct: f64,
    pub worst_case_drawdown_pct: f64,
    pub mean_sharpe: f64,
    pub median_sharpe: f64,
    pub min_sharpe: f64,
    pub max_sharpe: f64,
    pub return_distribution: Vec<f64>,
}

fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(SEED_SPREAD)
}

/// Derives an independent per-simulation seed from the parent seed and a job
/// index (spec §5). Each simulation gets its own `ChaCha8Rng`, so the set of
/// simulations is reproducible regardless of how rayon schedules them.
fn sub_seed(parent: u64, index: u64) -> u64 {
    parent
        .wrapping_add(index.wrapping_mul(SEED_SPREAD))
        .wrapping_add(SEED_SPREAD)
}

fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Bootstraps `config.num_simulations` synthetic equity curves by resampling
/// the realized trades of a completed run with replacement (spec §4.8).
/// Requires at least one trade; a flat run has nothing to resample.
pub fn run_monte_carlo(
    trades: &[Trade],
    initial_capital: f64,
    config: &MonteCarloConfig,
) -> Result<MonteCarloResult, AnalysisError> {
    if trades.is_empty() {
        return Err(AnalysisError::NoTrades);
    }

    let seed = resolve_seed(config.seed);
    // Resampled with the trade's own percentage return (for the per-sim
    // Sharpe) and its realized dollar profit (for the additive equity walk).
    let trade_returns: Vec<(f64, f64)> = trades
        .iter()
        .map(|t| (t.return_pct / 100.0, t.net_profit))
        .collect();
    let n_trades = trade_returns.len();

    let outcomes: Vec<(f64, f64, f64)> = (0..config.num_simulations)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(sub_seed(seed, i as u64));
            let mut equity = initial_capital;
            let mut peak = initial_capital;
            let mut max_dd_pct = 0.0_f64;
            let mut sampled_returns = Vec::with_capacity(n_trades);
            for _ in 0..n_trades {
                let (r, net_profit) = trade_returns[rng.gen_range(0..n_trades)];
                sampled_returns.push(r);
                equity += net_profit;
                if equity > peak {
                    peak = equity;
                }
                if peak > 0.0 {
                    let dd_pct = (peak - equity) / peak * 100.0;
                    if dd_pct > max_dd_pct {
                        max_dd_pct = dd_pct;
                    }
                }
            }
            let total_return_pct = if initial_capital > 0.0 {
                (equity / initial_capital - 1.0) * 100.0
            } else {
                0.0
            };
            let sharpe = sim_sharpe(&sampled_returns);
            (total_return_pct, max_dd_pct, sharpe)
        })
        .collect();

    let mut returns: Vec<f64> = outcomes.iter().map(|(r, _, _)| *r).collect();
    let mut drawdowns: Vec<f64> = outcomes.iter().map(|(_, d, _)| *d).collect();
    let mut sharpes: Vec<f64> = outcomes.iter().map(|(_, _, s)| *s).collect();
    returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sharpes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = returns.len() as f64;
    let mean_return_pct = returns.iter().sum::<f64>() / n;
    let variance = returns
        .iter()
        .map(|r| (r - mean_return_pct).powi(2))
        .sum::<f64>()
        / n;
    let mean_sharpe = sharpes.iter().sum::<f64>() / n;

    let alpha = 1.0 - config.confidence_level;
    let profitable = returns.iter().filter(|r| **r > 0.0).count();
    let hit_target = returns
        .iter()
        .filter(|r| **r >= config.target_return_pct)
        .count();
    let ruined = drawdowns.iter().filter(|d| **d > RUIN_DRAWDOWN_PCT).count();

    info!(simulations = config.num_simulations, seed, "monte carlo bootstrap complete");

    Ok(MonteCarloResult {
        simulations: config.num_simulations,
        seed,
        mean_return_pct,
        median_return_pct: quantile(&returns, 0.5),
        std_dev_return_pct: variance.sqrt(),
        min_return_pct: returns.first().copied().unwrap_or(0.0),
        max_return_pct: returns.last().copied().unwrap_or(0.0),
        confidence_interval_low: quantile(&returns, alpha / 2.0),
        confidence_interval_high: quantile(&returns, 1.0 - alpha / 2.0),
        probability_of_profit: profitable as f64 / n * 100.0,
        probability_of_target: hit_target as f64 / n * 100.0,
        risk_of_ruin: ruined as f64 / n * 100.0,
        min_drawdown_pct: drawdowns.first().copied().unwrap_or(0.0),
        max_drawdown_pct: drawdowns.last().copied().unwrap_or(0.0),
        worst_case_drawdown_pct: quantile(&drawdowns, 0.95),
        mean_sharpe,
        median_sharpe: quantile(&sharpes, 0.5),
        min_sharpe: sharpes.first().copied().unwrap_or(0.0),
        max_sharpe: sharpes.last().copied().unwrap_or(0.0),
        return_distribution: returns,
    })
}

/// Per-simulation Sharpe ratio (spec §4.8): mean over stdev of the resampled
/// per-trade returns, annualized by `sqrt(252)` the same way the core
/// metrics table annualizes daily returns.
fn sim_sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev > 1e-12 {
        mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn trade(return_pct: f64) -> Trade {
        Trade {
            trade_id: 1,
            symbol: "AAPL".into(),
            entry_time: ts(0),
            exit_time: ts(1),
            entry_price: 100.0,
            entry_qty: 10.0,
            exit_price: 100.0,
            exit_qty: 10.0,
            gross_profit: return_pct,
            net_profit: return_pct,
            commission: 0.0,
            slippage: 0.0,
            return_pct,
            duration: chrono::Duration::hours(1),
            entry_reason: "e".into(),
            exit_reason: "x".into(),
        }
    }

    #[test]
    fn empty_trade_ledger_is_an_error() {
        let result = run_monte_carlo(&[], 10_000.0, &MonteCarloConfig::default());
        assert!(matches!(result, Err(AnalysisError::NoTrades)));
    }

    #[test]
    fn same_seed_is_deterministic() {
        let trades = vec![trade(5.0), trade(-2.0), trade(3.0), trade(-1.0)];
        let config = MonteCarloConfig {
            num_simulations: 200,
            seed: 42,
            ..Default::default()
        };
        let a = run_monte_carlo(&trades, 10_000.0, &config).unwrap();
        let b = run_monte_carlo(&trades, 10_000.0, &config).unwrap();
        assert_eq!(a.mean_return_pct, b.mean_return_pct);
        assert_eq!(a.return_distribution, b.return_distribution);
    }

    #[test]
    fn all_winning_trades_means_zero_ruin_risk() {
        let trades = vec![trade(5.0), trade(3.0), trade(2.0)];
        let config = MonteCarloConfig {
            num_simulations: 300,
            seed: 7,
            ..Default::default()
        };
        let result = run_monte_carlo(&trades, 10_000.0, &config).unwrap();
        assert_eq!(result.risk_of_ruin, 0.0);
        assert_eq!(result.probability_of_profit, 100.0);
    }

    #[test]
    fn all_winning_trades_means_positive_sharpe_throughout() {
        let trades = vec![trade(5.0), trade(3.0), trade(2.0)];
        let config = MonteCarloConfig {
            num_simulations: 300,
            seed: 7,
            ..Default::default()
        };
        let result = run_monte_carlo(&trades, 10_000.0, &config).unwrap();
        assert!(result.min_sharpe >= 0.0);
        assert!(result.mean_sharpe > 0.0);
        assert!(result.min_return_pct <= result.mean_return_pct);
        assert!(result.mean_return_pct <= result.max_return_pct);
        assert!(result.min_drawdown_pct <= result.max_drawdown_pct);
    }

    #[test]
    fn equity_replay_is_additive_on_dollar_profit_not_compounding_pct() {
        // A single trade returning 50% of entry price but only $10 of net
        // profit on a much larger capital base: additive replay should track
        // dollars, not multiply equity by (1 + r).
        let trades = vec![Trade {
            trade_id: 1,
            symbol: "AAPL".into(),
            entry_time: ts(0),
            exit_time: ts(1),
            entry_price: 20.0,
            entry_qty: 1.0,
            exit_price: 30.0,
            exit_qty: 1.0,
            gross_profit: 10.0,
            net_profit: 10.0,
            commission: 0.0,
            slippage: 0.0,
            return_pct: 50.0,
            duration: chrono::Duration::hours(1),
            entry_reason: "e".into(),
            exit_reason: "x".into(),
        }];
        let config = MonteCarloConfig {
            num_simulations: 50,
            seed: 11,
            ..Default::default()
        };
        let result = run_monte_carlo(&trades, 100_000.0, &config).unwrap();
        // Additive: every simulation resamples this one trade once, so
        // equity ends at 100_000 + 10 = 100_010, i.e. a 0.01% return.
        assert!((result.mean_return_pct - 0.01).abs() < 1e-6);
    }
}
