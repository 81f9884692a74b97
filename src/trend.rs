//! Trend classification
//!
//! Buckets the short-term rate of change of glucose into one of five
//! directions. Only the newest reading and the one two steps back are
//! compared, so a single noisy sample in between cannot flip the arrow.

use crate::models::{Reading, Trend};

/// Readings needed before a direction can be called
pub const MIN_TREND_READINGS: usize = 3;

/// Classify the trend of a newest-first reading window
pub fn classify_trend(readings: &[Reading]) -> Trend {
    if readings.len() < MIN_TREND_READINGS {
        return Trend::Stable;
    }
    trend_between(readings[0].value, readings[2].value)
}

/// Classify the movement from `earlier` to `newest`, two ticks apart
pub fn trend_between(newest: u16, earlier: u16) -> Trend {
    let rate_of_change = (f64::from(newest) - f64::from(earlier)) / 10.0;

    if rate_of_change > 3.0 {
        Trend::RisingFast
    } else if rate_of_change > 1.0 {
        Trend::Rising
    } else if rate_of_change < -3.0 {
        Trend::FallingFast
    } else if rate_of_change < -1.0 {
        Trend::Falling
    } else {
        Trend::Stable
    }
}
