//! Synthetic glucose generator
//!
//! Produces the next simulated CGM reading from the previous value. The
//! model is a random walk with three extra forces:
//! - uniform sensor noise of roughly ±7.5 mg/dL
//! - rare meal spikes (up to +40) and insulin drops (up to -30)
//! - a gentle pull back toward 100 mg/dL so the walk never drifts away
//!
//! Randomness and time come in through [`RandomSource`] and [`Clock`] so the
//! generator can be driven deterministically in tests.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;

use crate::models::{Reading, Trend, GLUCOSE_MAX, GLUCOSE_MIN};
use crate::trend::trend_between;

/// Value the walk reverts toward, also used to seed an empty history
pub const BASELINE_GLUCOSE: u16 = 100;

const NOISE_SPAN: f64 = 15.0;
const SHOCK_PROBABILITY: f64 = 0.05;
const MEAL_SHOCK_MAX: f64 = 40.0;
const INSULIN_SHOCK_MAX: f64 = 30.0;
const MEAN_REVERSION_RATE: f64 = 0.02;

/// Source of uniform random samples in `[0, 1)`
pub trait RandomSource: Send + Sync {
    fn next_f64(&mut self) -> f64;
}

impl RandomSource for StdRng {
    fn next_f64(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Compute the next raw glucose value, clamped to [40, 400] and rounded
pub fn next_value(last_value: u16, rng: &mut dyn RandomSource) -> u16 {
    let last = f64::from(last_value);

    let noise = (rng.next_f64() - 0.5) * NOISE_SPAN;
    let meal = if rng.next_f64() < SHOCK_PROBABILITY {
        rng.next_f64() * MEAL_SHOCK_MAX
    } else {
        0.0
    };
    let insulin = if rng.next_f64() < SHOCK_PROBABILITY {
        rng.next_f64() * INSULIN_SHOCK_MAX
    } else {
        0.0
    };
    let reversion = (f64::from(BASELINE_GLUCOSE) - last) * MEAN_REVERSION_RATE;

    let next = (last + noise + meal - insulin + reversion)
        .clamp(f64::from(GLUCOSE_MIN), f64::from(GLUCOSE_MAX))
        .round();

    next as u16
}

/// Generate the next reading given the previous value and newest-first history.
///
/// The trend is classified over the window the new reading will create,
/// i.e. the new value followed by the two most recent existing readings.
pub fn generate_next_reading(
    last_value: u16,
    history: &[Reading],
    rng: &mut dyn RandomSource,
    now: DateTime<Utc>,
) -> Reading {
    let value = next_value(last_value, rng);
    Reading::new(value, trend_after(value, history), now)
}

/// Trend of `value` once it is prepended to `history`
pub fn trend_after(value: u16, history: &[Reading]) -> Trend {
    match history.get(1) {
        Some(two_back) => trend_between(value, two_back.value),
        None => Trend::Stable,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRandom;
    use super::*;
    use rand::SeedableRng;

    fn history(values: &[u16]) -> Vec<Reading> {
        let now = Utc::now();
        values
            .iter()
            .map(|&v| Reading::new(v, Trend::Stable, now))
            .collect()
    }

    #[test]
    fn test_mean_reversion_only() {
        // noise centered, no shocks
        let mut rng = ScriptedRandom::new(&[0.5, 0.9, 0.9]);
        // 200 + (100 - 200) * 0.02 = 198
        assert_eq!(next_value(200, &mut rng), 198);

        let mut rng = ScriptedRandom::quiet();
        assert_eq!(next_value(100, &mut rng), 100);
    }

    #[test]
    fn test_noise_extremes() {
        let mut rng = ScriptedRandom::new(&[0.0, 0.9, 0.9]);
        // 100 - 7.5 = 92.5 rounds away from zero
        assert_eq!(next_value(100, &mut rng), 93);

        let mut rng = ScriptedRandom::new(&[0.999_999, 0.9, 0.9]);
        assert_eq!(next_value(100, &mut rng), 107);
    }

    #[test]
    fn test_meal_and_insulin_shocks() {
        // meal fires with magnitude 0.5 * 40 = 20
        let mut rng = ScriptedRandom::new(&[0.5, 0.01, 0.5, 0.9]);
        assert_eq!(next_value(100, &mut rng), 120);

        // insulin fires with magnitude 0.5 * 30 = 15
        let mut rng = ScriptedRandom::new(&[0.5, 0.9, 0.01, 0.5]);
        assert_eq!(next_value(100, &mut rng), 85);

        // both fire
        let mut rng = ScriptedRandom::new(&[0.5, 0.0, 0.25, 0.0, 0.2]);
        assert_eq!(next_value(100, &mut rng), 104);
    }

    #[test]
    fn test_clamped_to_physiological_range() {
        let mut rng = ScriptedRandom::new(&[0.0, 0.9, 0.01, 0.999]);
        assert_eq!(next_value(GLUCOSE_MIN, &mut rng), GLUCOSE_MIN);

        let mut rng = ScriptedRandom::new(&[0.999, 0.01, 0.999, 0.9]);
        assert_eq!(next_value(GLUCOSE_MAX, &mut rng), GLUCOSE_MAX);
    }

    #[test]
    fn test_clamp_holds_for_random_walks() {
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut value = [GLUCOSE_MIN, BASELINE_GLUCOSE, GLUCOSE_MAX][(seed % 3) as usize];
            for _ in 0..500 {
                value = next_value(value, &mut rng);
                assert!((GLUCOSE_MIN..=GLUCOSE_MAX).contains(&value));
            }
        }
    }

    #[test]
    fn test_trend_uses_post_generation_window() {
        // new value 100 vs history[1] = 60 -> +4.0 per tick
        let mut rng = ScriptedRandom::quiet();
        let reading = generate_next_reading(100, &history(&[100, 60, 300]), &mut rng, Utc::now());
        assert_eq!(reading.value, 100);
        assert_eq!(reading.trend, Trend::RisingFast);

        let mut rng = ScriptedRandom::quiet();
        let reading = generate_next_reading(100, &history(&[100, 140]), &mut rng, Utc::now());
        assert_eq!(reading.trend, Trend::FallingFast);
    }

    #[test]
    fn test_short_history_is_stable() {
        let mut rng = ScriptedRandom::quiet();
        let reading = generate_next_reading(100, &history(&[300]), &mut rng, Utc::now());
        assert_eq!(reading.trend, Trend::Stable);

        let mut rng = ScriptedRandom::quiet();
        let reading = generate_next_reading(BASELINE_GLUCOSE, &[], &mut rng, Utc::now());
        assert_eq!(reading.trend, Trend::Stable);
    }

    #[test]
    fn test_uses_supplied_timestamp() {
        let now = Utc::now() - chrono::Duration::hours(3);
        let mut rng = ScriptedRandom::quiet();
        let reading = generate_next_reading(100, &[], &mut rng, now);
        assert_eq!(reading.timestamp, now);
    }
}
