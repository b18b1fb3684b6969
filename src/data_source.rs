use chrono::{DateTime, Utc};

use crate::bar::Bar;
use crate::error::DataError;

/// External market-data source (spec §6). The Engine never reads files or
/// databases directly; it asks a `HistoricalBars` implementation for the
/// bars it needs and treats whatever comes back as the ground truth.
pub trait HistoricalBars {
    fn bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError>;
}

/// An in-memory bar source, keyed by `(symbol, timeframe)`. Used by tests and
/// by the CLI after it has parsed a CSV file into bars.
#[derive(Default, Clone)]
pub struct InMemoryBars {
    series: Vec<((String, String), Vec<Bar>)>,
}

impl InMemoryBars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bars must already be in ascending timestamp order; this does not sort
    /// them, matching the data source's "ground truth as given" contract.
    pub fn insert(&mut self, symbol: impl Into<String>, timeframe: impl Into<String>, bars: Vec<Bar>) {
        self.series.push(((symbol.into(), timeframe.into()), bars));
    }

    fn lookup(&self, symbol: &str, timeframe: &str) -> Option<&[Bar]> {
        self.series
            .iter()
            .find(|((s, t), _)| s == symbol && t == timeframe)
            .map(|(_, bars)| bars.as_slice())
    }
}

impl HistoricalBars for InMemoryBars {
    fn bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let all = self.lookup(symbol, timeframe).unwrap_or(&[]);
        let windowed: Vec<Bar> = all
            .iter()
            .copied()
            .filter(|b| b.timestamp >= start && b.timestamp < end)
            .collect();
        if windowed.is_empty() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(windowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn bar(d: u32) -> Bar {
        Bar::new(t(d), 100.0, 101.0, 99.0, 100.0, 1_000.0)
    }

    #[test]
    fn filters_to_requested_window() {
        let mut source = InMemoryBars::new();
        source.insert("AAPL", "1Day", vec![bar(1), bar(2), bar(3), bar(4)]);
        let result = source.bars("AAPL", "1Day", t(2), t(4)).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn unknown_symbol_is_no_data() {
        let source = InMemoryBars::new();
        let result = source.bars("MSFT", "1Day", t(1), t(5));
        assert!(matches!(result, Err(DataError::NoData { .. })));
    }
}
