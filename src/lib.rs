pub mod analytics;
pub mod bar;
pub mod cancellation;
pub mod data_quality;
pub mod data_source;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod monte_carlo;
pub mod optimizer;
pub mod overfitting;
pub mod report;
pub mod strategy;
pub mod visualization;
pub mod walk_forward;


pub use engine::BacktestEngine;
pub use error::{AnalysisError, ConfigError, DataError, EngineError, ExecutionError};
pub use models::*;
pub use monte_carlo::{run_monte_carlo, MonteCarloConfig, MonteCarloResult};
pub use optimizer::{run_optimization, OptimizationMetric, OptimizationResult, OptimizerConfig, ParamAxis, ParamGrid};
pub use overfitting::{deflated_sharpe_ratio, walk_forward_overfitting_probability, DeflatedSharpeResult};
pub use strategy::{build_strategy, Strategy, StrategyContext, StrategyFactory};
pub use walk_forward::{run_walk_forward, WalkForwardAggregate, WalkForwardConfig, WalkForwardPeriodResult, WindowMode};
