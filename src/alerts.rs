//! Alert evaluation and dispatch
//!
//! [`evaluate_alerts`] is a pure function of a reading and the current
//! settings. Threshold alerts are mutually exclusive (most severe wins);
//! trend alerts are checked independently and may fire alongside them.
//!
//! Fired alerts are handed to a [`Notifier`], which owns the user-facing
//! side effects (banners, sounds, vibration).

use tracing::warn;

use crate::models::{Alert, AlertType, CgmSettings, Reading, Trend};

/// Distinguishable vibration patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticPattern {
    Error,
    Warning,
}

impl AlertType {
    /// Vibration pattern for this alert, if any
    pub fn haptic_pattern(&self) -> Option<HapticPattern> {
        match self {
            AlertType::UrgentLow => Some(HapticPattern::Error),
            AlertType::Low | AlertType::High => Some(HapticPattern::Warning),
            AlertType::RisingFast | AlertType::FallingFast | AlertType::SignalLoss => None,
        }
    }
}

/// Delivers alerts to the user
pub trait Notifier: Send + Sync {
    /// Present an alert (notification, banner, sound)
    fn alert(&self, alert: &Alert);

    /// Play a vibration pattern
    fn haptic(&self, pattern: HapticPattern);
}

/// Notifier that writes alerts to the log
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn alert(&self, alert: &Alert) {
        warn!(
            alert_id = %alert.id,
            alert_type = ?alert.alert_type,
            value = ?alert.value,
            "{}",
            alert.alert_type.message()
        );
    }

    fn haptic(&self, pattern: HapticPattern) {
        warn!(pattern = ?pattern, "Haptic feedback");
    }
}

/// Decide which alerts a reading raises under the given settings
pub fn evaluate_alerts(reading: &Reading, settings: &CgmSettings) -> Vec<AlertType> {
    if !settings.alerts_enabled {
        return Vec::new();
    }

    let mut fired = Vec::with_capacity(2);

    if reading.value <= settings.urgent_low_threshold {
        fired.push(AlertType::UrgentLow);
    } else if reading.value < settings.low_threshold {
        fired.push(AlertType::Low);
    } else if reading.value > settings.high_threshold {
        fired.push(AlertType::High);
    }

    match reading.trend {
        Trend::RisingFast => fired.push(AlertType::RisingFast),
        Trend::FallingFast => fired.push(AlertType::FallingFast),
        _ => {}
    }

    fired
}

/// Forward recorded alerts to the notifier, with haptics when enabled
pub fn dispatch_alerts(notifier: &dyn Notifier, alerts: &[Alert], haptic_feedback: bool) {
    for alert in alerts {
        notifier.alert(alert);

        if haptic_feedback {
            if let Some(pattern) = alert.alert_type.haptic_pattern() {
                notifier.haptic(pattern);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;
    use chrono::Utc;

    fn reading(value: u16, trend: Trend) -> Reading {
        Reading::new(value, trend, Utc::now())
    }

    #[test]
    fn test_in_range_stable_fires_nothing() {
        let settings = CgmSettings::default();
        assert!(evaluate_alerts(&reading(120, Trend::Stable), &settings).is_empty());
        assert!(evaluate_alerts(&reading(70, Trend::Rising), &settings).is_empty());
        assert!(evaluate_alerts(&reading(180, Trend::Falling), &settings).is_empty());
    }

    #[test]
    fn test_threshold_priority() {
        let settings = CgmSettings::default();

        assert_eq!(
            evaluate_alerts(&reading(55, Trend::Stable), &settings),
            vec![AlertType::UrgentLow]
        );
        assert_eq!(
            evaluate_alerts(&reading(40, Trend::Stable), &settings),
            vec![AlertType::UrgentLow]
        );
        assert_eq!(
            evaluate_alerts(&reading(56, Trend::Stable), &settings),
            vec![AlertType::Low]
        );
        assert_eq!(
            evaluate_alerts(&reading(69, Trend::Stable), &settings),
            vec![AlertType::Low]
        );
        assert_eq!(
            evaluate_alerts(&reading(181, Trend::Stable), &settings),
            vec![AlertType::High]
        );
    }

    #[test]
    fn test_trend_alerts_co_occur_with_thresholds() {
        let settings = CgmSettings::default();

        assert_eq!(
            evaluate_alerts(&reading(50, Trend::FallingFast), &settings),
            vec![AlertType::UrgentLow, AlertType::FallingFast]
        );
        assert_eq!(
            evaluate_alerts(&reading(250, Trend::RisingFast), &settings),
            vec![AlertType::High, AlertType::RisingFast]
        );
        assert_eq!(
            evaluate_alerts(&reading(120, Trend::RisingFast), &settings),
            vec![AlertType::RisingFast]
        );
    }

    #[test]
    fn test_disabled_alerts_suppress_everything() {
        let settings = CgmSettings {
            alerts_enabled: false,
            ..CgmSettings::default()
        };

        for value in [40, 55, 69, 181, 400] {
            for trend in [Trend::RisingFast, Trend::FallingFast, Trend::Stable] {
                assert!(evaluate_alerts(&reading(value, trend), &settings).is_empty());
            }
        }
    }

    #[test]
    fn test_custom_thresholds() {
        let settings = CgmSettings {
            urgent_low_threshold: 60,
            low_threshold: 80,
            high_threshold: 150,
            ..CgmSettings::default()
        };

        assert_eq!(
            evaluate_alerts(&reading(60, Trend::Stable), &settings),
            vec![AlertType::UrgentLow]
        );
        assert_eq!(
            evaluate_alerts(&reading(75, Trend::Stable), &settings),
            vec![AlertType::Low]
        );
        assert_eq!(
            evaluate_alerts(&reading(151, Trend::Stable), &settings),
            vec![AlertType::High]
        );
    }

    #[test]
    fn test_haptic_patterns() {
        assert_eq!(AlertType::UrgentLow.haptic_pattern(), Some(HapticPattern::Error));
        assert_eq!(AlertType::Low.haptic_pattern(), Some(HapticPattern::Warning));
        assert_eq!(AlertType::High.haptic_pattern(), Some(HapticPattern::Warning));
        assert_eq!(AlertType::RisingFast.haptic_pattern(), None);
        assert_eq!(AlertType::FallingFast.haptic_pattern(), None);
        assert_eq!(AlertType::SignalLoss.haptic_pattern(), None);
    }

    #[test]
    fn test_dispatch_with_haptics() {
        let notifier = RecordingNotifier::default();
        let now = Utc::now();
        let alerts = vec![
            Alert::new(AlertType::UrgentLow, 50, now),
            Alert::new(AlertType::FallingFast, 50, now),
            Alert::new(AlertType::High, 250, now),
        ];

        dispatch_alerts(&notifier, &alerts, true);

        assert_eq!(
            notifier.alert_types(),
            vec![AlertType::UrgentLow, AlertType::FallingFast, AlertType::High]
        );
        assert_eq!(
            notifier.haptic_patterns(),
            vec![HapticPattern::Error, HapticPattern::Warning]
        );
    }

    #[test]
    fn test_dispatch_without_haptics() {
        let notifier = RecordingNotifier::default();
        let alerts = vec![Alert::new(AlertType::UrgentLow, 50, Utc::now())];

        dispatch_alerts(&notifier, &alerts, false);

        assert_eq!(notifier.alert_types(), vec![AlertType::UrgentLow]);
        assert!(notifier.haptic_patterns().is_empty());
    }
}
