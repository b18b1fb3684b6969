use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use backtest_engine::bar::Bar;
use backtest_engine::cancellation::CancellationToken;
use backtest_engine::data_quality::check_data_quality;
use backtest_engine::data_source::InMemoryBars;
use backtest_engine::error::{ConfigError, DataError, EngineError};
use backtest_engine::models::{BacktestConfig, SlippageModel};
use backtest_engine::report::generate_text_report;
use backtest_engine::strategy::build_strategy;
use backtest_engine::visualization::{equity_curve_csv, monthly_returns_csv, trades_csv, visualization_data_json};
use backtest_engine::{analytics, BacktestEngine};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use clap::Parser;
use tracing::{error, info};

/// Runs a single historical strategy backtest and writes its report and
/// export artifacts to an output directory (spec §6).
#[derive(Debug, Parser)]
#[command(name = "backtest", version, about)]
struct Cli {
    #[arg(long, default_value = "SPY")]
    symbol: String,

    #[arg(long, default_value = "buy_and_hold")]
    strategy: String,

    /// ISO date (YYYY-MM-DD). Defaults to 30 days before `--end`.
    #[arg(long)]
    start: Option<String>,

    /// ISO date (YYYY-MM-DD). Defaults to yesterday.
    #[arg(long)]
    end: Option<String>,

    #[arg(long, default_value_t = 100_000.0)]
    capital: f64,

    #[arg(long, default_value = "./backtest_results")]
    output: PathBuf,

    #[arg(long)]
    verbose: bool,

    /// Path to a CSV file of OHLCV bars (`timestamp,open,high,low,close,volume`).
    /// Not named in the external CLI surface but required for the Engine's
    /// bar source to have anything to read (DESIGN.md).
    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value_t = 1.0)]
    commission: f64,

    #[arg(long, default_value_t = 0.0)]
    commission_pct: f64,

    #[arg(long, default_value_t = 0.0005)]
    slippage_pct: f64,

    #[arg(long, default_value_t = 100.0)]
    max_position_size: f64,
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, ConfigError> {
    let naive = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ConfigError::InvalidDateRange {
        start: s.to_string(),
        end: s.to_string(),
    })?;
    Ok(Utc
        .from_utc_datetime(&naive.and_hms_opt(0, 0, 0).expect("midnight is always valid")))
}

fn load_bars_csv(path: &PathBuf) -> Result<Vec<Bar>, DataError> {
    let contents = fs::read_to_string(path).map_err(|e| DataError::SourceFailure(e.to_string()))?;
    let mut bars = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 6 {
            return Err(DataError::MalformedBar {
                timestamp: format!("line {}", i + 1),
                reason: "expected 6 CSV columns".to_string(),
            });
        }
        let timestamp = DateTime::parse_from_rfc3339(fields[0].trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DataError::MalformedBar {
                timestamp: fields[0].to_string(),
                reason: e.to_string(),
            })?;
        let parse_f64 = |field: &str| -> Result<f64, DataError> {
            field.trim().parse().map_err(|_| DataError::MalformedBar {
                timestamp: timestamp.to_rfc3339(),
                reason: format!("could not parse {field:?} as a number"),
            })
        };
        let bar = Bar::new(
            timestamp,
            parse_f64(fields[1])?,
            parse_f64(fields[2])?,
            parse_f64(fields[3])?,
            parse_f64(fields[4])?,
            parse_f64(fields[5])?,
        );
        bar.validate()?;
        bars.push(bar);
    }
    Ok(bars)
}

fn run(cli: &Cli) -> Result<ExitCode, ExitCode> {
    let end_date = match &cli.end {
        Some(s) => parse_date(s).map_err(|_| ExitCode::from(1))?,
        None => Utc::now() - Duration::days(1),
    };
    let start_date = match &cli.start {
        Some(s) => parse_date(s).map_err(|_| ExitCode::from(1))?,
        None => end_date - Duration::days(30),
    };

    let config = BacktestConfig {
        symbol: cli.symbol.clone(),
        timeframe: "1Day".to_string(),
        start_date,
        end_date,
        initial_capital: cli.capital,
        commission: cli.commission,
        commission_pct: cli.commission_pct,
        slippage_pct: cli.slippage_pct,
        slippage_model: SlippageModel::Fixed,
        max_position_size: cli.max_position_size,
        max_daily_loss: 0.0,
        max_daily_loss_pct: 0.0,
    };
    config.validate().map_err(|err| {
        error!(%err, "configuration error");
        ExitCode::from(1)
    })?;

    let bars = load_bars_csv(&cli.data).map_err(|err| {
        error!(%err, "data error");
        ExitCode::from(2)
    })?;
    if bars.is_empty() {
        error!("data error: no bars loaded from {:?}", cli.data);
        return Err(ExitCode::from(2));
    }
    let data_quality = check_data_quality(&bars);

    let mut source = InMemoryBars::new();
    source.insert(cli.symbol.clone(), config.timeframe.clone(), bars);

    let mut strategy = build_strategy(&cli.strategy, &Default::default()).map_err(|err| {
        error!(strategy = %cli.strategy, %err, "unknown strategy");
        ExitCode::from(1)
    })?;

    let engine = BacktestEngine::new(config);
    let cancellation = CancellationToken::new();
    let mut result = match engine.run(&source, strategy.as_mut(), &cancellation) {
        Ok(result) => result,
        Err(EngineError::Config(_)) => return Err(ExitCode::from(1)),
        Err(EngineError::Data(err)) => {
            error!(%err, "data error");
            return Err(ExitCode::from(2));
        }
        Err(err) => {
            error!(%err, "internal error");
            return Err(ExitCode::from(3));
        }
    };
    result.data_quality = Some(data_quality);
    result.extended_analytics = analytics::compute_extended_analytics(&result.trades, &result.equity_curve);

    fs::create_dir_all(&cli.output).context("creating output directory")?;

    let timestamp = result
        .equity_curve
        .last()
        .map(|p| p.timestamp)
        .unwrap_or(end_date)
        .format("%Y%m%d_%H%M%S");
    let report_path = cli.output.join(format!("backtest_{}_{}.txt", cli.symbol, timestamp));
    fs::write(&report_path, generate_text_report(&result)).context("writing text report")?;
    fs::write(cli.output.join("equity_curve.csv"), equity_curve_csv(&result)).context("writing equity_curve.csv")?;
    fs::write(cli.output.join("trades.csv"), trades_csv(&result)).context("writing trades.csv")?;
    fs::write(cli.output.join("monthly_returns.csv"), monthly_returns_csv(&result)).context("writing monthly_returns.csv")?;
    fs::write(
        cli.output.join("visualization_data.json"),
        serde_json::to_string_pretty(&visualization_data_json(&result)).context("serializing visualization data")?,
    )
    .context("writing visualization_data.json")?;

    info!(
        symbol = %cli.symbol,
        final_capital = result.final_capital,
        total_return_pct = result.metrics.total_return_pct,
        output = %report_path.display(),
        "backtest complete"
    );

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_date() {
        let parsed = parse_date("2024-01-15").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-15T00:00:00+00:00");
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(parse_date("not-a-date").is_err());
    }

    #[test]
    fn loads_well_formed_csv() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("backtest_test_bars_{}.csv", std::process::id()));
        fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n2024-01-01T16:00:00Z,100,101,99,100.5,1000\n",
        )
        .unwrap();
        let bars = load_bars_csv(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 100.5);
    }
}
