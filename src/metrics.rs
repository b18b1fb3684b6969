use crate::models::{DailyStats, EquityPoint, Metrics, Trade};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
/// Sentinel used in place of an unbounded ratio (spec §4.5): a system with
/// zero losing trades, or zero negative daily returns, has no denominator to
/// divide by but is clearly not "zero edge" either.
const UNBOUNDED_RATIO_SENTINEL: f64 = 999.99;

/// Computes the full metrics table (spec §4.5) from a run's trade ledger,
/// daily statistics, and equity curve. Pure and side-effect free so it can be
/// reused by the Engine, Optimizer, and Walk-Forward analyzer alike.
pub fn compute_metrics(
    trades: &[Trade],
    daily_stats: &[DailyStats],
    equity_curve: &[EquityPoint],
    initial_capital: f64,
    final_capital: f64,
) -> Metrics {
    let total_trades = trades.len() as u32;
    let wins: Vec<&Trade> = trades.iter().filter(|t| t.is_win()).collect();
    let losses: Vec<&Trade> = trades.iter().filter(|t| t.net_profit <= 0.0).collect();
    let winning_trades = wins.len() as u32;
    let losing_trades = losses.len() as u32;

    let win_rate = if total_trades == 0 {
        0.0
    } else {
        winning_trades as f64 / total_trades as f64 * 100.0
    };

    let gross_profit: f64 = wins.iter().map(|t| t.net_profit).sum();
    let gross_loss: f64 = losses.iter().map(|t| -t.net_profit).sum();
    let net_profit: f64 = trades.iter().map(|t| t.net_profit).sum();

    let profit_factor = if gross_loss == 0.0 {
        if gross_profit > 0.0 {
            UNBOUNDED_RATIO_SENTINEL
        } else {
            0.0
        }
    } else {
        gross_profit / gross_loss
    };

    let average_trade = if total_trades == 0 {
        0.0
    } else {
        net_profit / total_trades as f64
    };
    let average_win = if winning_trades == 0 {
        0.0
    } else {
        gross_profit / winning_trades as f64
    };
    let average_loss = if losing_trades == 0 {
        0.0
    } else {
        gross_loss / losing_trades as f64
    };

    let largest_win = wins
        .iter()
        .map(|t| t.net_profit)
        .fold(0.0_f64, f64::max);
    let largest_loss = losses
        .iter()
        .map(|t| t.net_profit)
        .fold(0.0_f64, f64::min);

    let (max_drawdown, max_drawdown_pct) = compute_max_drawdown(equity_curve);
    let (sharpe_ratio, sortino_ratio) = compute_risk_ratios(daily_stats);

    let total_return_pct = if initial_capital > 0.0 {
        (final_capital - initial_capital) / initial_capital * 100.0
    } else {
        0.0
    };
    let calmar_ratio = if max_drawdown_pct > 0.0 {
        total_return_pct / max_drawdown_pct
    } else {
        0.0
    };

    let avg_trade_duration_secs = if total_trades == 0 {
        0.0
    } else {
        trades
            .iter()
            .map(|t| t.duration.num_seconds() as f64)
            .sum::<f64>()
            / total_trades as f64
    };

    let (max_consecutive_wins, max_consecutive_losses) = max_consecutive_streaks(trades);

    let total_commission: f64 = trades.iter().map(|t| t.commission).sum();
    let total_slippage: f64 = trades.iter().map(|t| t.slippage).sum();

    Metrics {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        gross_profit,
        gross_loss,
        net_profit,
        profit_factor,
        average_trade,
        average_win,
        average_loss,
        largest_win,
        largest_loss,
        max_drawdown,
        max_drawdown_pct,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        avg_trade_duration_secs,
        max_consecutive_wins,
        max_consecutive_losses,
        total_commission,
        total_slippage,
        total_return_pct,
    }
}

/// Peak-to-trough drawdown, in absolute equity and percent of the running
/// peak. Zero with fewer than two equity points (spec §4.5 edge case).
fn compute_max_drawdown(equity_curve: &[EquityPoint]) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }
    let mut peak = equity_curve[0].equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        let dd = peak - point.equity;
        if dd > max_dd {
            max_dd = dd;
        }
        if peak > 0.0 {
            let dd_pct = dd / peak * 100.0;
            if dd_pct > max_dd_pct {
                max_dd_pct = dd_pct;
            }
        }
    }
    (max_dd, max_dd_pct)
}

/// Sharpe and Sortino, annualized off daily returns (spec §4.5). Zero risk-free
/// rate: the spec's scenarios never quote one, and folding one in would just
/// shift every run by the same constant.
fn compute_risk_ratios(daily_stats: &[DailyStats]) -> (f64, f64) {
    if daily_stats.len() < 2 {
        return (0.0, 0.0);
    }
    let returns: Vec<f64> = daily_stats.iter().map(|d| d.pnl_pct / 100.0).collect();
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    // Sample variance (n - 1), not population variance (spec §4.5). `n >= 2`
    // is guaranteed by the early return above, so `n - 1.0 >= 1.0`.
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    let sharpe = if std_dev > 1e-12 {
        mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sortino = if downside.is_empty() {
        UNBOUNDED_RATIO_SENTINEL
    } else {
        let dn = downside.len() as f64;
        let downside_denom = if dn > 1.0 { dn - 1.0 } else { dn };
        let downside_var = downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside_denom;
        let downside_dev = downside_var.sqrt();
        if downside_dev > 1e-12 {
            mean / downside_dev * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        }
    };

    (sharpe, sortino)
}

fn max_consecutive_streaks(trades: &[Trade]) -> (u32, u32) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut wins = 0;
    let mut losses = 0;
    for trade in trades {
        if trade.net_profit > 0.0 {
            wins += 1;
            losses = 0;
            max_wins = max_wins.max(wins);
        } else if trade.net_profit < 0.0 {
            losses += 1;
            wins = 0;
            max_losses = max_losses.max(losses);
        } else {
            wins = 0;
            losses = 0;
        }
    }
    (max_wins, max_losses)
}
