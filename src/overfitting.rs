use statrs::distribution::{ContinuousCDF, Normal};

/// Deflated Sharpe Ratio (Bailey & Lopez de Prado 2014): discounts an
/// observed Sharpe for the number of parameter combinations tried, since
/// trying more combinations makes finding a high Sharpe by chance more
/// likely. Used to sanity-check the Optimizer's winning combination.
#[derive(Debug, Clone, Copy)]
pub struct DeflatedSharpeResult {
    pub deflated_sharpe: f64,
    pub observed_sharpe: f64,
    pub expected_max_sharpe_null: f64,
    pub num_trials: u32,
    pub num_observations: u32,
    pub p_value: f64,
}

/// `skewness`/`kurtosis` are of the trade-return distribution; pass `0.0` for
/// both if unknown; the result degrades to a Gaussian assumption.
pub fn deflated_sharpe_ratio(
    observed_sharpe: f64,
    num_trials: u32,
    num_observations: u32,
    skewness: f64,
    kurtosis: f64,
) -> DeflatedSharpeResult {
    let n = num_trials as f64;
    let t = num_observations as f64;

    if num_trials < 1 || num_observations < 3 {
        return DeflatedSharpeResult {
            deflated_sharpe: observed_sharpe,
            observed_sharpe,
            expected_max_sharpe_null: 0.0,
            num_trials,
            num_observations,
            p_value: 1.0,
        };
    }

    let expected_max = (2.0 * n.ln()).sqrt();
    let variance_max = 1.0 / (2.0 * n.ln());
    let std_max = variance_max.sqrt();

    let sr2 = observed_sharpe.powi(2);
    let se_adjustment =
        (1.0 + sr2 / 2.0 - skewness * observed_sharpe + kurtosis * sr2 / 4.0) / t;
    let se = se_adjustment.max(1.0 / t).sqrt();

    let deflated = (observed_sharpe - expected_max) / (std_max + se);

    let normal = Normal::new(0.0, 1.0).expect("standard normal is always valid");
    let p_value = 2.0 * (1.0 - normal.cdf(deflated.abs()));

    DeflatedSharpeResult {
        deflated_sharpe: deflated,
        observed_sharpe,
        expected_max_sharpe_null: expected_max,
        num_trials,
        num_observations,
        p_value,
    }
}

/// Probability of backtest overfitting, estimated directly from a completed
/// walk-forward run's periods rather than a separate combinatorial re-split
/// (the walk-forward periods already are the train/test splits). Ranks
/// periods by in-sample Sharpe, then asks how often the better-IS half
/// underperformed the median out-of-sample Sharpe — the same logic Bailey et
/// al. use, just against folds we already computed instead of new random
/// ones. Returns `None` with fewer than 4 periods.
pub fn walk_forward_overfitting_probability(is_sharpes: &[f64], oos_sharpes: &[f64]) -> Option<f64> {
    if is_sharpes.len() != oos_sharpes.len() || is_sharpes.len() < 4 {
        return None;
    }

    let mut ranked: Vec<usize> = (0..is_sharpes.len()).collect();
    ranked.sort_by(|&a, &b| {
        is_sharpes[b]
            .partial_cmp(&is_sharpes[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut sorted_oos = oos_sharpes.to_vec();
    sorted_oos.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_oos = sorted_oos[sorted_oos.len() / 2];

    let top_half = &ranked[..ranked.len() / 2];
    let underperforming = top_half
        .iter()
        .filter(|&&idx| oos_sharpes[idx] < median_oos)
        .count();

    Some(underperforming as f64 / top_half.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_trials_returns_observed_sharpe_unchanged() {
        let result = deflated_sharpe_ratio(1.5, 0, 100, 0.0, 0.0);
        assert_eq!(result.deflated_sharpe, 1.5);
    }

    #[test]
    fn many_trials_deflate_a_modest_sharpe_to_negative() {
        let result = deflated_sharpe_ratio(1.0, 500, 252, 0.0, 0.0);
        assert!(result.deflated_sharpe < 0.0);
    }

    #[test]
    fn too_few_periods_returns_none() {
        assert_eq!(walk_forward_overfitting_probability(&[1.0, 2.0], &[0.5, 0.3]), None);
    }

    #[test]
    fn consistent_is_and_oos_gives_low_overfitting_probability() {
        let is_sharpes = vec![2.0, 1.8, 1.6, 1.4, 1.2, 1.0];
        let oos_sharpes = vec![1.9, 1.7, 1.5, 1.3, 1.1, 0.9];
        let pbo = walk_forward_overfitting_probability(&is_sharpes, &oos_sharpes).unwrap();
        assert!(pbo < 0.5);
    }
}
