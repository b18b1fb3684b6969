use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bar::Bar;
use crate::cancellation::CancellationToken;
use crate::engine::BacktestEngine;
use crate::error::AnalysisError;
use crate::models::{BacktestConfig, Metrics};
use crate::strategy::build_strategy;

/// Score assigned to a combination that could not be evaluated — an invalid
/// parameter set, or a run that errored out. Deliberately not `NEG_INFINITY`
/// so it still sorts and prints sensibly in a report (spec §4.6).
pub const FAILED_COMBINATION_SCORE: f64 = -999_999.0;
/// Hard ceiling on how many combinations a single grid search will evaluate,
/// regardless of how large the search space is (spec §4.6).
const DEFAULT_MAX_COMBINATIONS: usize = 1000;

/// The named metric the Optimizer ranks parameter combinations by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationMetric {
    Sharpe,
    Sortino,
    TotalReturn,
    ProfitFactor,
    Calmar,
    WinRate,
}

impl OptimizationMetric {
    /// Parses a CLI/config string, falling back to Sharpe with a warning for
    /// anything unrecognized (spec §4.6) rather than failing the whole run.
    pub fn parse(name: &str) -> Self {
        match name {
            "sharpe_ratio" => Self::Sharpe,
            "sortino_ratio" => Self::Sortino,
            "total_return" => Self::TotalReturn,
            "profit_factor" => Self::ProfitFactor,
            "calmar_ratio" => Self::Calmar,
            "win_rate" => Self::WinRate,
            other => {
                warn!(metric = other, "unknown optimization metric, falling back to sharpe_ratio");
                Self::Sharpe
            }
        }
    }

    fn extract(self, metrics: &Metrics) -> f64 {
        match self {
            Self::Sharpe => metrics.sharpe_ratio,
            Self::Sortino => metrics.sortino_ratio,
            Self::TotalReturn => metrics.total_return_pct,
            Self::ProfitFactor => metrics.profit_factor,
            Self::Calmar => metrics.calmar_ratio,
            Self::WinRate => metrics.win_rate,
        }
    }
}

/// A named axis of candidate values to search over.
#[derive(Debug, Clone)]
pub struct ParamAxis {
    pub name: String,
    pub values: Vec<f64>,
}

/// The Cartesian product of a set of parameter axes.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    pub axes: Vec<ParamAxis>,
}

impl ParamGrid {
    pub fn new(axes: Vec<ParamAxis>) -> Self {
        Self { axes }
    }

    /// Every combination of one value per axis, in axis-declaration order.
    pub fn combinations(&self) -> Vec<HashMap<String, f64>> {
        let mut combos: Vec<HashMap<String, f64>> = vec![HashMap::new()];
        for axis in &self.axes {
            let mut next = Vec::with_capacity(combos.len() * axis.values.len());
            for combo in &combos {
                for value in &axis.values {
                    let mut extended = combo.clone();
                    extended.insert(axis.name.clone(), *value);
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: HashMap<String, f64>,
    pub metric_value: f64,
    pub metrics: Option<Metrics>,
    pub rank: u32,
}

pub struct OptimizerConfig {
    pub metric: OptimizationMetric,
    pub max_combinations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            metric: OptimizationMetric::Sharpe,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
        }
    }
}

/// Runs `base_config`'s strategy over `bars` for every combination in `grid`,
/// in parallel, and ranks the combinations by `optimizer_config.metric`
/// (spec §4.6). Combinations beyond `max_combinations` are dropped, loudest
/// first (declaration order), with a warning naming the count dropped.
pub fn run_optimization(
    base_config: &BacktestConfig,
    bars: &[Bar],
    strategy_name: &str,
    grid: &ParamGrid,
    optimizer_config: &OptimizerConfig,
    cancellation: &CancellationToken,
) -> Result<Vec<OptimizationResult>, AnalysisError> {
    let mut combos = grid.combinations();
    if combos.is_empty() {
        return Err(AnalysisError::EmptyParameterSpace);
    }
    if combos.len() > optimizer_config.max_combinations {
        warn!(
            requested = combos.len(),
            evaluated = optimizer_config.max_combinations,
            dropped = combos.len() - optimizer_config.max_combinations,
            "parameter grid exceeds cap, truncating"
        );
        combos.truncate(optimizer_config.max_combinations);
    }

    let engine = BacktestEngine::new(base_config.clone());
    let metric = optimizer_config.metric;

    let mut results: Vec<OptimizationResult> = combos
        .into_par_iter()
        .map(|params| {
            if cancellation.is_cancelled() {
                return OptimizationResult {
                    params,
                    metric_value: FAILED_COMBINATION_SCORE,
                    metrics: None,
                    rank: 0,
                };
            }
            let outcome = build_strategy(strategy_name, &params).and_then(|mut strategy| {
                engine
                    .run_bars(bars, strategy.as_mut(), cancellation)
                    .map_err(|e| e.to_string())
            });
            match outcome {
                Ok(result) => OptimizationResult {
                    params,
                    metric_value: metric.extract(&result.metrics),
                    metrics: Some(result.metrics),
                    rank: 0,
                },
                Err(err) => {
                    warn!(%err, ?params, "parameter combination failed, scoring as a failure");
                    OptimizationResult {
                        params,
                        metric_value: FAILED_COMBINATION_SCORE,
                        metrics: None,
                        rank: 0,
                    }
                }
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.metric_value
            .partial_cmp(&a.metric_value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = (i + 1) as u32;
    }

    Ok(results)
}
