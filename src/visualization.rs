use serde_json::json;

use crate::models::{BacktestResult, EquityPoint};

/// CSV header for `equity_curve.csv` (spec §6, field names as given there).
const EQUITY_CURVE_HEADER: &str = "Timestamp,Equity,Cash,Drawdown,DrawdownPct,CumulativeReturn";
/// CSV header for `trades.csv` (spec §6).
const TRADES_HEADER: &str =
    "TradeID,Symbol,Side,EntryTime,EntryPrice,EntryQty,ExitTime,ExitPrice,ExitQty,GrossProfit,NetProfit,Commission,Slippage,ReturnPct,Duration,EntryReason,ExitReason";
/// CSV header for `monthly_returns.csv` (spec §6).
const MONTHLY_RETURNS_HEADER: &str = "Month,Return";

/// Renders `equity_curve.csv`: one row per equity point, RFC 3339
/// timestamps, running peak-to-date drawdown and cumulative return computed
/// against the curve itself (spec §6).
pub fn equity_curve_csv(result: &BacktestResult) -> String {
    let mut out = String::from(EQUITY_CURVE_HEADER);
    out.push('\n');
    let mut peak = result.initial_capital;
    for point in &result.equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        let drawdown = peak - point.equity;
        let drawdown_pct = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
        let cumulative_return = if result.initial_capital > 0.0 {
            (point.equity / result.initial_capital - 1.0) * 100.0
        } else {
            0.0
        };
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            point.timestamp.to_rfc3339(),
            point.equity,
            point.cash,
            drawdown,
            drawdown_pct,
            cumulative_return,
        ));
    }
    out
}

/// Renders `trades.csv`: one row per closed trade. `Side` is always `Long`
/// since the engine is long-only (spec §1 Non-goals); `Duration` is seconds.
pub fn trades_csv(result: &BacktestResult) -> String {
    let mut out = String::from(TRADES_HEADER);
    out.push('\n');
    for trade in &result.trades {
        out.push_str(&format!(
            "{},{},Long,{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            trade.trade_id,
            csv_escape(&trade.symbol),
            trade.entry_time.to_rfc3339(),
            trade.entry_price,
            trade.entry_qty,
            trade.exit_time.to_rfc3339(),
            trade.exit_price,
            trade.exit_qty,
            trade.gross_profit,
            trade.net_profit,
            trade.commission,
            trade.slippage,
            trade.return_pct,
            trade.duration.num_seconds(),
            csv_escape(&trade.entry_reason),
            csv_escape(&trade.exit_reason),
        ));
    }
    out
}

/// Renders `monthly_returns.csv` with `Month` as `YYYY-MM` (spec §6). Empty
/// (header-only) when extended analytics weren't computed (too few trades).
pub fn monthly_returns_csv(result: &BacktestResult) -> String {
    let mut out = String::from(MONTHLY_RETURNS_HEADER);
    out.push('\n');
    if let Some(ref ext) = result.extended_analytics {
        for m in &ext.monthly_returns {
            out.push_str(&format!("{:04}-{:02},{}\n", m.year, m.month, m.return_pct));
        }
    }
    out
}

/// Quotes a CSV field only if it contains a comma, quote, or newline,
/// doubling embedded quotes per RFC 4180.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Renders `visualization_data.json`: a structured dashboard payload mirroring
/// the teacher's tear-sheet JSON, built with `serde_json::json!` rather than
/// a dedicated struct since its shape is presentation-only and not consumed
/// elsewhere in the crate.
pub fn visualization_data_json(result: &BacktestResult) -> serde_json::Value {
    let m = &result.metrics;

    let mut value = json!({
        "symbol": result.config.symbol,
        "period": {
            "start": result.config.start_date.to_rfc3339(),
            "end": result.config.end_date.to_rfc3339(),
        },
        "summary": {
            "initial_capital": result.initial_capital,
            "final_capital": result.final_capital,
            "total_return_pct": m.total_return_pct,
            "net_profit": m.net_profit,
        },
        "risk_metrics": {
            "max_drawdown": m.max_drawdown,
            "max_drawdown_pct": m.max_drawdown_pct,
            "sharpe_ratio": m.sharpe_ratio,
            "sortino_ratio": m.sortino_ratio,
            "calmar_ratio": m.calmar_ratio,
        },
        "trade_stats": {
            "total_trades": m.total_trades,
            "winning_trades": m.winning_trades,
            "losing_trades": m.losing_trades,
            "win_rate": m.win_rate,
            "profit_factor": m.profit_factor,
        },
        "equity_curve": result.equity_curve.iter().map(|p| {
            json!({
                "timestamp": p.timestamp.to_rfc3339(),
                "equity": p.equity,
            })
        }).collect::<Vec<_>>(),
        "trade_markers": result.trades.iter().map(|t| {
            json!({
                "entry_time": t.entry_time.to_rfc3339(),
                "exit_time": t.exit_time.to_rfc3339(),
                "entry_price": t.entry_price,
                "exit_price": t.exit_price,
                "net_profit": t.net_profit,
                "is_win": t.is_win(),
            })
        }).collect::<Vec<_>>(),
        "drawdown_periods": drawdown_periods(&result.equity_curve),
        "win_loss_distribution": win_loss_distribution(result),
    });

    if let Some(ref ext) = result.extended_analytics {
        value["extended_analytics"] = json!({
            "expectancy": ext.expectancy,
            "kelly_fraction": ext.kelly_fraction,
            "sqn": ext.sqn,
            "ulcer_index": ext.ulcer_index,
            "omega_ratio": ext.omega_ratio,
            "monthly_returns": ext.monthly_returns,
        });
    }

    if let Some(ref dq) = result.data_quality {
        value["data_quality"] = json!({
            "total_bars": dq.total_bars,
            "zero_volume_bars": dq.zero_volume_bars,
            "price_spike_count": dq.price_spike_count,
            "missing_trading_days": dq.missing_trading_days,
        });
    }

    value
}

/// Peak-to-recovery drawdown periods (spec §2 component 8, §6). A period
/// that is still underwater at the end of the curve has `recovery_time:
/// null` and `recovered: false`.
fn drawdown_periods(equity_curve: &[EquityPoint]) -> Vec<serde_json::Value> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }
    let mut periods = Vec::new();
    let mut peak = equity_curve[0].equity;
    let mut peak_time = equity_curve[0].timestamp;
    let mut trough = peak;
    let mut trough_time = peak_time;
    let mut in_drawdown = false;

    for point in &equity_curve[1..] {
        if point.equity >= peak {
            if in_drawdown {
                periods.push(json!({
                    "peak_time": peak_time.to_rfc3339(),
                    "trough_time": trough_time.to_rfc3339(),
                    "recovery_time": point.timestamp.to_rfc3339(),
                    "peak_equity": peak,
                    "trough_equity": trough,
                    "depth_pct": if peak > 0.0 { (peak - trough) / peak * 100.0 } else { 0.0 },
                    "recovered": true,
                }));
                in_drawdown = false;
            }
            peak = point.equity;
            peak_time = point.timestamp;
            trough = peak;
            trough_time = peak_time;
        } else {
            in_drawdown = true;
            if point.equity < trough {
                trough = point.equity;
                trough_time = point.timestamp;
            }
        }
    }

    if in_drawdown {
        periods.push(json!({
            "peak_time": peak_time.to_rfc3339(),
            "trough_time": trough_time.to_rfc3339(),
            "recovery_time": serde_json::Value::Null,
            "peak_equity": peak,
            "trough_equity": trough,
            "depth_pct": if peak > 0.0 { (peak - trough) / peak * 100.0 } else { 0.0 },
            "recovered": false,
        }));
    }

    periods
}

/// Per-trade return distribution split by outcome (spec §2 component 8,
/// §6 "win/loss histograms").
fn win_loss_distribution(result: &BacktestResult) -> serde_json::Value {
    let wins: Vec<f64> = result.trades.iter().filter(|t| t.is_win()).map(|t| t.return_pct).collect();
    let losses: Vec<f64> = result.trades.iter().filter(|t| !t.is_win()).map(|t| t.return_pct).collect();
    json!({
        "win_count": wins.len(),
        "loss_count": losses.len(),
        "win_returns_pct": wins,
        "loss_returns_pct": losses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BacktestConfig, EquityPoint, Metrics, Trade};
    use chrono::{TimeZone, Utc};

    fn sample_result() -> BacktestResult {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();
        BacktestResult {
            config: BacktestConfig {
                symbol: "AAPL".into(),
                timeframe: "1Day".into(),
                start_date: ts,
                end_date: ts,
                initial_capital: 10_000.0,
                commission: 0.0,
                commission_pct: 0.0,
                slippage_pct: 0.0,
                slippage_model: Default::default(),
                max_position_size: 100.0,
                max_daily_loss: 0.0,
                max_daily_loss_pct: 0.0,
            },
            initial_capital: 10_000.0,
            final_capital: 10_500.0,
            metrics: Metrics {
                total_trades: 1,
                winning_trades: 1,
                losing_trades: 0,
                win_rate: 100.0,
                gross_profit: 500.0,
                gross_loss: 0.0,
                net_profit: 500.0,
                profit_factor: 999.99,
                average_trade: 500.0,
                average_win: 500.0,
                average_loss: 0.0,
                largest_win: 500.0,
                largest_loss: 0.0,
                max_drawdown: 0.0,
                max_drawdown_pct: 0.0,
                sharpe_ratio: 1.0,
                sortino_ratio: 1.0,
                calmar_ratio: 1.0,
                avg_trade_duration_secs: 3600.0,
                max_consecutive_wins: 1,
                max_consecutive_losses: 0,
                total_commission: 0.0,
                total_slippage: 0.0,
                total_return_pct: 5.0,
            },
            trades: vec![Trade {
                trade_id: 1,
                symbol: "AAPL".into(),
                entry_time: ts,
                exit_time: ts,
                entry_price: 100.0,
                entry_qty: 10.0,
                exit_price: 150.0,
                exit_qty: 10.0,
                gross_profit: 500.0,
                net_profit: 500.0,
                commission: 0.0,
                slippage: 0.0,
                return_pct: 50.0,
                duration: chrono::Duration::hours(1),
                entry_reason: "signal, with comma".into(),
                exit_reason: "exit".into(),
            }],
            daily_stats: Vec::new(),
            equity_curve: vec![EquityPoint {
                timestamp: ts,
                equity: 10_500.0,
                cash: 10_500.0,
                unrealized_pnl: 0.0,
            }],
            duration: std::time::Duration::from_secs(1),
            data_quality: None,
            extended_analytics: None,
        }
    }

    #[test]
    fn equity_curve_csv_has_header_and_one_row() {
        let csv = equity_curve_csv(&sample_result());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], EQUITY_CURVE_HEADER);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn trades_csv_quotes_fields_containing_commas() {
        let csv = trades_csv(&sample_result());
        assert!(csv.contains("\"signal, with comma\""));
    }

    #[test]
    fn visualization_json_includes_summary_and_markers() {
        let value = visualization_data_json(&sample_result());
        assert_eq!(value["symbol"], "AAPL");
        assert_eq!(value["summary"]["final_capital"], 10_500.0);
        assert_eq!(value["trade_markers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn visualization_json_includes_win_loss_distribution() {
        let value = visualization_data_json(&sample_result());
        assert_eq!(value["win_loss_distribution"]["win_count"], 1);
        assert_eq!(value["win_loss_distribution"]["loss_count"], 0);
    }

    #[test]
    fn drawdown_period_survives_round_trip_when_underwater_at_end() {
        let mut result = sample_result();
        let ts0 = result.equity_curve[0].timestamp;
        result.equity_curve = vec![
            EquityPoint { timestamp: ts0, equity: 10_000.0, cash: 10_000.0, unrealized_pnl: 0.0 },
            EquityPoint { timestamp: ts0 + chrono::Duration::days(1), equity: 11_000.0, cash: 11_000.0, unrealized_pnl: 0.0 },
            EquityPoint { timestamp: ts0 + chrono::Duration::days(2), equity: 9_000.0, cash: 9_000.0, unrealized_pnl: 0.0 },
        ];
        let value = visualization_data_json(&result);
        let periods = value["drawdown_periods"].as_array().unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0]["recovered"], false);
        assert_eq!(periods[0]["recovery_time"], serde_json::Value::Null);
        assert_eq!(periods[0]["trough_equity"], 9_000.0);

        let round_tripped: serde_json::Value = serde_json::from_str(&serde_json::to_string(&value).unwrap()).unwrap();
        assert_eq!(round_tripped["drawdown_periods"][0]["trough_equity"], 9_000.0);
    }
}
