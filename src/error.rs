use thiserror::Error;

/// Configuration-time errors. Abort the run before any bar is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("initial capital must be positive, got {0}")]
    InvalidCapital(f64),
    #[error("start date {start} is not before end date {end}")]
    InvalidDateRange { start: String, end: String },
    #[error("symbol must not be empty")]
    InvalidSymbol,
    #[error("unknown strategy {0:?}")]
    UnknownStrategy(String),
}

/// Errors surfaced while loading or validating historical bar data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no bars returned for {symbol} {timeframe} in [{start}, {end})")]
    NoData {
        symbol: String,
        timeframe: String,
        start: String,
        end: String,
    },
    #[error("malformed bar at {timestamp}: {reason}")]
    MalformedBar { timestamp: String, reason: String },
    #[error("market data source failed: {0}")]
    SourceFailure(String),
}

/// Per-signal execution preconditions. Always non-fatal: the signal is
/// dropped and the replay continues (spec §7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("quantity must be positive")]
    InvalidQuantity,
    #[error("price must be positive")]
    InvalidPrice,
    #[error("insufficient capital for this order")]
    InsufficientCapital,
    #[error("no open position to close")]
    NoPosition,
    #[error("a position is already open")]
    PositionAlreadyOpen,
}

/// Top-level error returned by a single backtest run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("run was cancelled")]
    Cancelled,
}

/// Errors from the optimizer / walk-forward / monte-carlo harnesses. Inner
/// failures are isolated per spec §7 and do not propagate as this type;
/// this covers failures of the *outer* harness itself.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no parameter combinations to evaluate")]
    EmptyParameterSpace,
    #[error("no walk-forward periods fit in the configured date range")]
    NoPeriods,
    #[error("monte carlo requires a completed backtest with at least one trade")]
    NoTrades,
    #[error("analysis was cancelled")]
    Cancelled,
}
