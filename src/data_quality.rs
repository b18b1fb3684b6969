use crate::bar::Bar;
use crate::models::DataQualityReport;

const PRICE_SPIKE_THRESHOLD_PCT: f64 = 0.20;
/// Friday→Monday is a normal 3-day gap; anything wider suggests a missed
/// trading day rather than a weekend.
const NORMAL_WEEKEND_GAP_DAYS: i64 = 3;

/// Pre-flight diagnostic pass over a bar sequence (SPEC_FULL §C). Purely
/// informational — it never rejects a run, only annotates `BacktestResult`
/// with what it noticed, same as the teacher's data-quality pass.
pub fn check_data_quality(bars: &[Bar]) -> DataQualityReport {
    let mut zero_volume_bars = 0usize;
    let mut price_spike_count = 0usize;
    let mut missing_trading_days = 0usize;
    let mut warnings = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        if bar.volume <= 0.0 {
            zero_volume_bars += 1;
            warnings.push(format!("{}: zero or negative volume", bar.timestamp.to_rfc3339()));
        }

        if i > 0 {
            let prev = &bars[i - 1];
            if prev.close > 0.0 {
                let pct_change = ((bar.close - prev.close) / prev.close).abs();
                if pct_change > PRICE_SPIKE_THRESHOLD_PCT {
                    price_spike_count += 1;
                    warnings.push(format!(
                        "{}: {:.1}% move from prior close",
                        bar.timestamp.to_rfc3339(),
                        pct_change * 100.0
                    ));
                }
            }

            let gap_days = (bar.timestamp.date_naive() - prev.timestamp.date_naive()).num_days();
            if gap_days > NORMAL_WEEKEND_GAP_DAYS + 1 {
                let estimated_missing = (gap_days - NORMAL_WEEKEND_GAP_DAYS) as usize;
                missing_trading_days += estimated_missing;
                warnings.push(format!(
                    "{}-day gap before {}",
                    gap_days,
                    bar.timestamp.to_rfc3339()
                ));
            }
        }
    }

    DataQualityReport {
        total_bars: bars.len(),
        missing_trading_days,
        zero_volume_bars,
        price_spike_count,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 16, 0, 0).unwrap()
    }

    #[test]
    fn flags_zero_volume_bars() {
        let bars = vec![Bar::new(t(1), 100.0, 101.0, 99.0, 100.0, 0.0)];
        let report = check_data_quality(&bars);
        assert_eq!(report.zero_volume_bars, 1);
    }

    #[test]
    fn flags_price_spikes() {
        let bars = vec![
            Bar::new(t(1), 100.0, 101.0, 99.0, 100.0, 1000.0),
            Bar::new(t(2), 100.0, 131.0, 99.0, 130.0, 1000.0),
        ];
        let report = check_data_quality(&bars);
        assert_eq!(report.price_spike_count, 1);
    }

    #[test]
    fn flags_wide_gaps_but_not_ordinary_weekends() {
        let bars = vec![
            Bar::new(t(5), 100.0, 101.0, 99.0, 100.0, 1000.0), // Friday
            Bar::new(t(8), 100.0, 101.0, 99.0, 100.0, 1000.0), // Monday, 3-day gap
            Bar::new(t(20), 100.0, 101.0, 99.0, 100.0, 1000.0), // wide gap
        ];
        let report = check_data_quality(&bars);
        assert_eq!(report.missing_trading_days, 12 - NORMAL_WEEKEND_GAP_DAYS as usize);
    }
}
