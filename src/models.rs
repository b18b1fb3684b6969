use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How slippage is derived from the signal price (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    #[default]
    Fixed,
    VolumeBased,
}

/// Configuration for a single backtest run. One symbol per run (spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_capital: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub commission_pct: f64,
    #[serde(default)]
    pub slippage_pct: f64,
    #[serde(default)]
    pub slippage_model: SlippageModel,
    pub max_position_size: f64,
    #[serde(default)]
    pub max_daily_loss: f64,
    #[serde(default)]
    pub max_daily_loss_pct: f64,
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError;
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::InvalidCapital(self.initial_capital));
        }
        if self.start_date >= self.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: self.start_date.to_rfc3339(),
                end: self.end_date.to_rfc3339(),
            });
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::InvalidSymbol);
        }
        Ok(())
    }
}

/// A closed round-trip trade. Append-only; never mutated after creation
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_qty: f64,
    pub exit_price: f64,
    pub exit_qty: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    /// Both legs summed, for reporting (spec §9 "commission accounting
    /// ambiguity" — option (a), faithfully reproduced).
    pub commission: f64,
    pub slippage: f64,
    pub return_pct: f64,
    pub duration: chrono::Duration,
    pub entry_reason: String,
    pub exit_reason: String,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.net_profit > 0.0
    }
}

/// One point on the equity curve (spec §3). Appended after every bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    pub unrealized_pnl: f64,
}

/// Per-trading-day statistics, finalized lazily on a day-boundary change
/// (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub starting_cash: f64,
    pub ending_cash: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub commission: f64,
    pub slippage: f64,
}

/// The closed record of a completed backtest run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub metrics: Metrics,
    pub trades: Vec<Trade>,
    pub daily_stats: Vec<DailyStats>,
    pub equity_curve: Vec<EquityPoint>,
    pub duration: std::time::Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<DataQualityReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_analytics: Option<ExtendedAnalytics>,
}

/// Named performance/risk metrics (spec §4.5). Field names match the table
/// in spec.md exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_profit: f64,
    pub profit_factor: f64,
    pub average_trade: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub avg_trade_duration_secs: f64,
    pub max_consecutive_wins: u32,
    pub max_consecutive_losses: u32,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub total_return_pct: f64,
}

/// Data-quality pre-flight report (SPEC_FULL §C). Diagnostic only; never
/// aborts a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub total_bars: usize,
    pub missing_trading_days: usize,
    pub zero_volume_bars: usize,
    pub price_spike_count: usize,
    pub warnings: Vec<String>,
}

/// Extended analytics beyond the core metric table (SPEC_FULL §C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedAnalytics {
    pub expectancy: f64,
    pub expectancy_pct: f64,
    pub kelly_fraction: f64,
    pub payoff_ratio: f64,
    pub sqn: f64,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub ulcer_index: f64,
    pub omega_ratio: Option<f64>,
    pub monthly_returns: Vec<MonthlyReturn>,
    pub win_streaks: Vec<u32>,
    pub loss_streaks: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    pub return_pct: f64,
}
