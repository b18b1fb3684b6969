use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// A single immutable OHLCV bar.
///
/// Invariants (checked by [`Bar::validate`], enforced across a sequence by
/// [`validate_sequence`]): `low <= open, close <= high`, all prices positive,
/// volume non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Checks the single-bar OHLCV invariants from spec §3.
    pub fn validate(&self) -> Result<(), DataError> {
        let malformed = |reason: &str| DataError::MalformedBar {
            timestamp: self.timestamp.to_rfc3339(),
            reason: reason.to_string(),
        };
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(malformed("all prices must be positive"));
        }
        if self.volume < 0.0 {
            return Err(malformed("volume must be non-negative"));
        }
        if self.low > self.open || self.low > self.close || self.low > self.high {
            return Err(malformed("low must be <= open, close, and high"));
        }
        if self.high < self.open || self.high < self.close {
            return Err(malformed("high must be >= open and close"));
        }
        Ok(())
    }
}

/// Validates an ordered bar sequence: every bar individually, plus strictly
/// increasing timestamps (spec §3).
pub fn validate_sequence(bars: &[Bar]) -> Result<(), DataError> {
    for bar in bars {
        bar.validate()?;
    }
    for pair in bars.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DataError::MalformedBar {
                timestamp: pair[1].timestamp.to_rfc3339(),
                reason: "timestamps must be strictly increasing".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn rejects_inverted_high_low() {
        let bar = Bar::new(t(0), 100.0, 90.0, 95.0, 92.0, 1000.0);
        assert!(bar.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_bar() {
        let bar = Bar::new(t(0), 100.0, 105.0, 99.0, 103.0, 1000.0);
        assert!(bar.validate().is_ok());
    }

    #[test]
    fn sequence_requires_strictly_increasing_timestamps() {
        let a = Bar::new(t(0), 100.0, 101.0, 99.0, 100.0, 1.0);
        let b = Bar::new(t(0), 100.0, 101.0, 99.0, 100.0, 1.0);
        assert!(validate_sequence(&[a, b]).is_err());
    }
}
