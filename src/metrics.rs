//! Glucose metrics over a time window
//!
//! Standard CGM summary figures: time in range, mean glucose and the
//! Glucose Management Indicator (GMI). All functions are pure and operate
//! on borrowed readings or plain mg/dL values.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Reading, TimeInRange};

/// Default window for time-in-range and average queries
pub const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Window the GMI is computed over (14 days)
pub const GMI_WINDOW_HOURS: u32 = 24 * 14;

/// Readings taken within `hours` of `now`, boundary inclusive, in input order
pub fn readings_for_period<'a, I>(readings: I, hours: u32, now: DateTime<Utc>) -> Vec<&'a Reading>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let cutoff = now - Duration::hours(i64::from(hours));
    readings
        .into_iter()
        .filter(|r| r.timestamp >= cutoff)
        .collect()
}

/// Share of values below, inside and above `[target_min, target_max]`
pub fn time_in_range(values: &[u16], target_min: u16, target_max: u16) -> TimeInRange {
    if values.is_empty() {
        return TimeInRange::default();
    }

    let total = values.len();
    let in_range = values
        .iter()
        .filter(|&&v| v >= target_min && v <= target_max)
        .count();
    let above = values.iter().filter(|&&v| v > target_max).count();
    let below = values.iter().filter(|&&v| v < target_min).count();

    TimeInRange {
        in_range: percent(in_range, total),
        above: percent(above, total),
        below: percent(below, total),
        readings: total,
    }
}

/// Arithmetic mean rounded to whole mg/dL; `None` when there is no data
pub fn average_glucose(values: &[u16]) -> Option<u16> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    let mean = sum as f64 / values.len() as f64;
    Some(mean.round() as u16)
}

/// GMI (%) from mean glucose in mg/dL, one decimal place
pub fn gmi(average_glucose: u16) -> f64 {
    ((3.31 + 0.02392 * f64::from(average_glucose)) * 10.0).round() / 10.0
}

fn percent(count: usize, total: usize) -> u32 {
    (count as f64 / total as f64 * 100.0).round() as u32
}
