use chrono::Datelike;

use crate::models::{EquityPoint, ExtendedAnalytics, MonthlyReturn, Trade};

const UNBOUNDED_RATIO_SENTINEL: f64 = 999.99;
const MIN_TRADES_FOR_ANALYTICS: usize = 5;

/// Supplemented diagnostics beyond the core metrics table: expectancy,
/// Kelly sizing, distribution shape, drawdown pain, and monthly seasonality.
/// Returns `None` below [`MIN_TRADES_FOR_ANALYTICS`] trades, where these
/// statistics are too noisy to be meaningful (ported from the teacher's
/// expectancy/streak/extended-metrics analyses, re-scoped to one symbol).
pub fn compute_extended_analytics(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
) -> Option<ExtendedAnalytics> {
    if trades.len() < MIN_TRADES_FOR_ANALYTICS {
        return None;
    }

    let wins: Vec<&Trade> = trades.iter().filter(|t| t.is_win()).collect();
    let losses: Vec<&Trade> = trades.iter().filter(|t| t.net_profit < 0.0).collect();
    let n = trades.len() as f64;
    let win_rate = wins.len() as f64 / n;
    let loss_rate = losses.len() as f64 / n;

    let avg_win = if wins.is_empty() {
        0.0
    } else {
        wins.iter().map(|t| t.net_profit).sum::<f64>() / wins.len() as f64
    };
    let avg_loss = if losses.is_empty() {
        0.0
    } else {
        losses.iter().map(|t| -t.net_profit).sum::<f64>() / losses.len() as f64
    };

    let expectancy = win_rate * avg_win - loss_rate * avg_loss;
    let avg_trade_size = trades
        .iter()
        .map(|t| t.entry_price * t.entry_qty)
        .sum::<f64>()
        / n;
    let expectancy_pct = if avg_trade_size > 0.0 {
        expectancy / avg_trade_size * 100.0
    } else {
        0.0
    };

    let payoff_ratio = if avg_loss > 0.0 {
        avg_win / avg_loss
    } else if avg_win > 0.0 {
        UNBOUNDED_RATIO_SENTINEL
    } else {
        0.0
    };

    let kelly_fraction = if avg_loss > 0.0 {
        let b = avg_win / avg_loss;
        ((win_rate * b - loss_rate) / b).clamp(0.0, 1.0)
    } else if win_rate > 0.0 {
        1.0
    } else {
        0.0
    };

    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let mean_ret = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean_ret).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let std_dev = variance.sqrt();
    let sqn = if std_dev > 1e-10 {
        n.sqrt() * mean_ret / std_dev
    } else {
        0.0
    };

    let skewness = compute_skewness(&returns);
    let kurtosis = compute_excess_kurtosis(&returns);
    let omega_ratio = compute_omega(&returns, 0.0);
    let ulcer_index = compute_ulcer_index(equity_curve).unwrap_or(0.0);

    let (win_streaks, loss_streaks) = compute_streaks(trades);
    let monthly_returns = compute_monthly_returns(equity_curve);

    Some(ExtendedAnalytics {
        expectancy,
        expectancy_pct,
        kelly_fraction,
        payoff_ratio,
        sqn,
        skewness,
        kurtosis,
        ulcer_index,
        omega_ratio,
        monthly_returns,
        win_streaks,
        loss_streaks,
    })
}

fn compute_skewness(returns: &[f64]) -> Option<f64> {
    let n = returns.len() as f64;
    if n < 3.0 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / n;
    let m2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let m3 = returns.iter().map(|r| (r - mean).powi(3)).sum::<f64>() / n;
    let std = m2.sqrt();
    if std > 1e-15 {
        Some(m3 / std.powi(3))
    } else {
        None
    }
}

fn compute_excess_kurtosis(returns: &[f64]) -> Option<f64> {
    let n = returns.len() as f64;
    if n < 4.0 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / n;
    let m2 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let m4 = returns.iter().map(|r| (r - mean).powi(4)).sum::<f64>() / n;
    if m2 > 1e-15 {
        Some(m4 / m2.powi(2) - 3.0)
    } else {
        None
    }
}

/// Gains over losses relative to `threshold` (spec C: supplemented metric).
/// `None`, never `Some(f64::INFINITY)`, when there are no losses to divide
/// by — an unbounded ratio doesn't survive JSON round-tripping.
fn compute_omega(returns: &[f64], threshold: f64) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let gains: f64 = returns.iter().map(|r| (r - threshold).max(0.0)).sum();
    let losses: f64 = returns.iter().map(|r| (threshold - r).max(0.0)).sum();
    if losses > 1e-15 {
        Some(gains / losses)
    } else {
        None
    }
}

fn compute_ulcer_index(equity_curve: &[EquityPoint]) -> Option<f64> {
    if equity_curve.len() < 3 {
        return None;
    }
    let mut peak = equity_curve[0].equity;
    let mut sum_sq_dd = 0.0;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        let dd_pct = if peak > 0.0 {
            (peak - point.equity) / peak * 100.0
        } else {
            0.0
        };
        sum_sq_dd += dd_pct.powi(2);
    }
    Some((sum_sq_dd / equity_curve.len() as f64).sqrt())
}

/// Lengths of consecutive win/loss runs, in the order they occurred.
fn compute_streaks(trades: &[Trade]) -> (Vec<u32>, Vec<u32>) {
    let mut win_streaks = Vec::new();
    let mut loss_streaks = Vec::new();
    let mut current = 0u32;
    let mut current_is_win = false;

    for (i, trade) in trades.iter().enumerate() {
        let is_win = trade.net_profit > 0.0;
        if i == 0 || is_win != current_is_win {
            if i > 0 && current > 0 {
                if current_is_win {
                    win_streaks.push(current);
                } else {
                    loss_streaks.push(current);
                }
            }
            current = 1;
            current_is_win = is_win;
        } else {
            current += 1;
        }
    }
    if current > 0 {
        if current_is_win {
            win_streaks.push(current);
        } else {
            loss_streaks.push(current);
        }
    }
    (win_streaks, loss_streaks)
}

/// Calendar-month returns computed from each month's first and last equity
/// point — an approximation since it ignores trades that straddle a month
/// boundary, but matches the report's monthly table granularity (spec §6).
fn compute_monthly_returns(equity_curve: &[EquityPoint]) -> Vec<MonthlyReturn> {
    let mut results = Vec::new();
    let mut current: Option<(i32, u32, f64, f64)> = None;

    for point in equity_curve {
        let year = point.timestamp.year();
        let month = point.timestamp.month();
        match &mut current {
            Some((y, m, _start, last)) if *y == year && *m == month => {
                *last = point.equity;
            }
            Some((y, m, start, last)) => {
                results.push(MonthlyReturn {
                    year: *y,
                    month: *m,
                    return_pct: if *start > 0.0 { (*last / *start - 1.0) * 100.0 } else { 0.0 },
                });
                current = Some((year, month, point.equity, point.equity));
            }
            None => {
                current = Some((year, month, point.equity, point.equity));
            }
        }
    }
    if let Some((y, m, start, last)) = current {
        results.push(MonthlyReturn {
            year: y,
            month: m,
            return_pct: if start > 0.0 { (last / start - 1.0) * 100.0 } else { 0.0 },
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn trade(net_profit: f64, return_pct: f64) -> Trade {
        Trade {
            trade_id: 1,
            symbol: "AAPL".into(),
            entry_time: ts(1),
            exit_time: ts(2),
            entry_price: 100.0,
            entry_qty: 10.0,
            exit_price: 100.0,
            exit_qty: 10.0,
            gross_profit: net_profit,
            net_profit,
            commission: 0.0,
            slippage: 0.0,
            return_pct,
            duration: chrono::Duration::hours(1),
            entry_reason: "e".into(),
            exit_reason: "x".into(),
        }
    }

    #[test]
    fn fewer_than_five_trades_returns_none() {
        let trades = vec![trade(10.0, 1.0), trade(-5.0, -0.5)];
        assert!(compute_extended_analytics(&trades, &[]).is_none());
    }

    #[test]
    fn expectancy_matches_hand_computation() {
        let trades = vec![
            trade(100.0, 1.0),
            trade(-50.0, -0.5),
            trade(150.0, 1.5),
            trade(-75.0, -0.75),
            trade(200.0, 2.0),
        ];
        let analytics = compute_extended_analytics(&trades, &[]).unwrap();
        assert!((analytics.expectancy - 65.0).abs() < 1.0);
    }

    #[test]
    fn streaks_reported_in_occurrence_order() {
        let trades = vec![
            trade(10.0, 1.0),
            trade(10.0, 1.0),
            trade(-10.0, -1.0),
            trade(-10.0, -1.0),
            trade(-10.0, -1.0),
            trade(10.0, 1.0),
        ];
        let analytics = compute_extended_analytics(&trades, &[]).unwrap();
        assert_eq!(analytics.win_streaks, vec![2, 1]);
        assert_eq!(analytics.loss_streaks, vec![3]);
    }
}
