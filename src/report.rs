use std::fmt::Write as _;

use crate::models::BacktestResult;

/// Renders the plain-text report artifact (spec §6,
/// `backtest_<symbol>_<yyyymmdd_HHMMSS>.txt`): configuration, overall
/// performance, trade statistics, profit and risk metrics, a letter grade,
/// the daily P&L table, and the full trade log. Mirrors the sectioning of
/// the teacher's JSON tear sheet, just rendered for a terminal instead of a
/// dashboard.
pub fn generate_text_report(result: &BacktestResult) -> String {
    let mut out = String::new();
    let m = &result.metrics;
    let cfg = &result.config;

    writeln!(out, "=== BACKTEST REPORT: {} ===", cfg.symbol).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "-- Configuration --").unwrap();
    writeln!(out, "Symbol:            {}", cfg.symbol).unwrap();
    writeln!(out, "Timeframe:         {}", cfg.timeframe).unwrap();
    writeln!(out, "Period:            {} to {}", cfg.start_date.to_rfc3339(), cfg.end_date.to_rfc3339()).unwrap();
    writeln!(out, "Initial capital:   {:.2}", cfg.initial_capital).unwrap();
    writeln!(out, "Commission:        {:.4} + {:.4}%", cfg.commission, cfg.commission_pct * 100.0).unwrap();
    writeln!(out, "Slippage:          {:.4}% ({:?})", cfg.slippage_pct * 100.0, cfg.slippage_model).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "-- Overall --").unwrap();
    writeln!(out, "Final capital:     {:.2}", result.final_capital).unwrap();
    writeln!(out, "Total return:      {:.2}%", m.total_return_pct).unwrap();
    writeln!(out, "Net profit:        {:.2}", m.net_profit).unwrap();
    writeln!(out, "Grade:             {}", grade(m)).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "-- Trade Statistics --").unwrap();
    writeln!(out, "Total trades:      {}", m.total_trades).unwrap();
    writeln!(out, "Winning trades:    {}", m.winning_trades).unwrap();
    writeln!(out, "Losing trades:     {}", m.losing_trades).unwrap();
    writeln!(out, "Win rate:          {:.2}%", m.win_rate).unwrap();
    writeln!(out, "Avg trade duration:{:.1}h", m.avg_trade_duration_secs / 3600.0).unwrap();
    writeln!(out, "Max consec. wins:  {}", m.max_consecutive_wins).unwrap();
    writeln!(out, "Max consec. losses:{}", m.max_consecutive_losses).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "-- Profit Metrics --").unwrap();
    writeln!(out, "Gross profit:      {:.2}", m.gross_profit).unwrap();
    writeln!(out, "Gross loss:        {:.2}", m.gross_loss).unwrap();
    writeln!(out, "Profit factor:     {:.2}", m.profit_factor).unwrap();
    writeln!(out, "Average trade:     {:.2}", m.average_trade).unwrap();
    writeln!(out, "Average win:       {:.2}", m.average_win).unwrap();
    writeln!(out, "Average loss:      {:.2}", m.average_loss).unwrap();
    writeln!(out, "Largest win:       {:.2}", m.largest_win).unwrap();
    writeln!(out, "Largest loss:      {:.2}", m.largest_loss).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "-- Risk Metrics --").unwrap();
    writeln!(out, "Max drawdown:      {:.2} ({:.2}%)", m.max_drawdown, m.max_drawdown_pct).unwrap();
    writeln!(out, "Sharpe ratio:      {:.2}", m.sharpe_ratio).unwrap();
    writeln!(out, "Sortino ratio:     {:.2}", m.sortino_ratio).unwrap();
    writeln!(out, "Calmar ratio:      {:.2}", m.calmar_ratio).unwrap();
    writeln!(out, "Total commission:  {:.2}", m.total_commission).unwrap();
    writeln!(out, "Total slippage:    {:.2}", m.total_slippage).unwrap();
    writeln!(out).unwrap();

    if let Some(ref dq) = result.data_quality {
        writeln!(out, "-- Data Quality --").unwrap();
        writeln!(out, "Total bars:        {}", dq.total_bars).unwrap();
        writeln!(out, "Missing trading days (est.): {}", dq.missing_trading_days).unwrap();
        writeln!(out, "Zero-volume bars:  {}", dq.zero_volume_bars).unwrap();
        writeln!(out, "Price spikes:      {}", dq.price_spike_count).unwrap();
        for warning in &dq.warnings {
            writeln!(out, "  ! {warning}").unwrap();
        }
        writeln!(out).unwrap();
    }

    if let Some(ref ext) = result.extended_analytics {
        writeln!(out, "-- Extended Analytics --").unwrap();
        writeln!(out, "Expectancy:        {:.2} ({:.2}%)", ext.expectancy, ext.expectancy_pct).unwrap();
        writeln!(out, "Kelly fraction:    {:.4}", ext.kelly_fraction).unwrap();
        writeln!(out, "Payoff ratio:      {:.2}", ext.payoff_ratio).unwrap();
        writeln!(out, "SQN:               {:.2}", ext.sqn).unwrap();
        writeln!(out, "Ulcer index:       {:.2}", ext.ulcer_index).unwrap();
        if let Some(skew) = ext.skewness {
            writeln!(out, "Skewness:          {skew:.3}").unwrap();
        }
        if let Some(kurt) = ext.kurtosis {
            writeln!(out, "Excess kurtosis:   {kurt:.3}").unwrap();
        }
        if let Some(omega) = ext.omega_ratio {
            writeln!(out, "Omega ratio:       {omega:.2}").unwrap();
        }
        writeln!(out).unwrap();
    }

    writeln!(out, "-- Daily P&L --").unwrap();
    writeln!(out, "{:<12} {:>12} {:>10} {:>6} {:>5} {:>5}", "Date", "P&L", "P&L %", "Trds", "Wins", "Loss").unwrap();
    for day in &result.daily_stats {
        writeln!(
            out,
            "{:<12} {:>12.2} {:>9.2}% {:>6} {:>5} {:>5}",
            day.date, day.pnl, day.pnl_pct, day.trades, day.wins, day.losses
        )
        .unwrap();
    }
    writeln!(out).unwrap();

    writeln!(out, "-- Trade Log --").unwrap();
    writeln!(
        out,
        "{:>4} {:<20} {:<20} {:>10} {:>10} {:>10} {:>8}",
        "#", "Entry", "Exit", "Entry $", "Exit $", "Net P&L", "Return %"
    )
    .unwrap();
    for trade in &result.trades {
        writeln!(
            out,
            "{:>4} {:<20} {:<20} {:>10.2} {:>10.2} {:>10.2} {:>7.2}%",
            trade.trade_id,
            trade.entry_time.to_rfc3339(),
            trade.exit_time.to_rfc3339(),
            trade.entry_price,
            trade.exit_price,
            trade.net_profit,
            trade.return_pct,
        )
        .unwrap();
    }

    out
}

/// A coarse letter grade from Sharpe ratio. An explicit, documented
/// heuristic rather than an industry standard (DESIGN.md), since the spec
/// asks for a grade without defining its thresholds.
fn grade(metrics: &crate::models::Metrics) -> &'static str {
    match metrics.sharpe_ratio {
        s if s >= 2.0 => "A",
        s if s >= 1.0 => "B",
        s if s >= 0.0 => "C",
        _ => "D",
    }
}
