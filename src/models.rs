//! Data models for glucose readings, alerts and session configuration
//!
//! Defines the core data structures shared by the generator, evaluator,
//! aggregator and session controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Lowest glucose value a sensor can report (mg/dL)
pub const GLUCOSE_MIN: u16 = 40;

/// Highest glucose value a sensor can report (mg/dL)
pub const GLUCOSE_MAX: u16 = 400;

/// Short-term direction of glucose movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    RisingFast,
    Rising,
    Stable,
    Falling,
    FallingFast,
}

impl Trend {
    /// Arrow glyph as drawn on receiver screens
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::RisingFast => "↑↑",
            Trend::Rising => "↑",
            Trend::Stable => "→",
            Trend::Falling => "↓",
            Trend::FallingFast => "↓↓",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Trend::RisingFast => "Rising quickly",
            Trend::Rising => "Rising",
            Trend::Stable => "Stable",
            Trend::Falling => "Falling",
            Trend::FallingFast => "Falling quickly",
        }
    }
}

/// A single glucose measurement. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Unique identifier for this reading
    pub id: Uuid,

    /// Glucose concentration in mg/dL, always within [40, 400]
    pub value: u16,

    /// Instant the reading was taken
    pub timestamp: DateTime<Utc>,

    /// Direction of travel at the time of the reading
    pub trend: Trend,
}

impl Reading {
    pub fn new(value: u16, trend: Trend, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            value,
            timestamp,
            trend,
        }
    }
}

/// Input DTO for readings pushed by a real (non-simulated) sensor feed
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReadingInput {
    #[validate(range(min = 40, max = 400, message = "Glucose must be between 40 and 400 mg/dL"))]
    pub value: u16,

    /// Optional sensor-provided timestamp (defaults to the session clock)
    pub timestamp: Option<DateTime<Utc>>,
}

/// Sensor link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    SignalLoss,
}

/// Supported monitor models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Simulated,
    DexcomG7,
    FreestyleLibre3,
}

impl DeviceType {
    pub fn display_name(&self) -> &'static str {
        match self {
            DeviceType::Simulated => "CGM Simulator",
            DeviceType::DexcomG7 => "Dexcom G7",
            DeviceType::FreestyleLibre3 => "FreeStyle Libre 3",
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, DeviceType::Simulated)
    }
}

/// The active monitor. At most one exists per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub connected_at: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(device_type: DeviceType, connected_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("{:?}-{}", device_type, Uuid::new_v4()).to_lowercase(),
            name: device_type.display_name().to_string(),
            device_type,
            connected_at,
            last_sync: None,
        }
    }
}

/// Condition that raised an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    UrgentLow,
    Low,
    High,
    RisingFast,
    FallingFast,
    SignalLoss,
}

impl AlertType {
    pub fn message(&self) -> &'static str {
        match self {
            AlertType::UrgentLow => "Urgent low glucose",
            AlertType::Low => "Low glucose",
            AlertType::High => "High glucose",
            AlertType::RisingFast => "Glucose rising quickly",
            AlertType::FallingFast => "Glucose falling quickly",
            AlertType::SignalLoss => "Sensor signal lost",
        }
    }
}

/// A fired alert. `acknowledged` is the only field that changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Reading value behind the alert. `None` for a signal loss raised
    /// before any reading arrived.
    pub value: Option<u16>,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    pub fn new(alert_type: AlertType, value: u16, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            value: Some(value),
            timestamp,
            acknowledged: false,
        }
    }

    /// Alert with no reading behind it
    pub fn without_value(alert_type: AlertType, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            value: None,
            timestamp,
            acknowledged: false,
        }
    }
}

/// User-adjustable alert thresholds and target range (mg/dL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgmSettings {
    pub high_threshold: u16,
    pub low_threshold: u16,
    pub urgent_low_threshold: u16,
    pub target_range_min: u16,
    pub target_range_max: u16,
    pub alerts_enabled: bool,
    pub haptic_feedback: bool,
}

impl Default for CgmSettings {
    fn default() -> Self {
        Self {
            high_threshold: 180,
            low_threshold: 70,
            urgent_low_threshold: 55,
            target_range_min: 70,
            target_range_max: 180,
            alerts_enabled: true,
            haptic_feedback: true,
        }
    }
}

impl CgmSettings {
    /// Shallow merge: every field present in `update` replaces the current one
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            high_threshold: update.high_threshold.unwrap_or(self.high_threshold),
            low_threshold: update.low_threshold.unwrap_or(self.low_threshold),
            urgent_low_threshold: update
                .urgent_low_threshold
                .unwrap_or(self.urgent_low_threshold),
            target_range_min: update.target_range_min.unwrap_or(self.target_range_min),
            target_range_max: update.target_range_max.unwrap_or(self.target_range_max),
            alerts_enabled: update.alerts_enabled.unwrap_or(self.alerts_enabled),
            haptic_feedback: update.haptic_feedback.unwrap_or(self.haptic_feedback),
        }
    }
}

/// Partial settings patch
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SettingsUpdate {
    #[validate(range(min = 40, max = 400))]
    pub high_threshold: Option<u16>,
    #[validate(range(min = 40, max = 400))]
    pub low_threshold: Option<u16>,
    #[validate(range(min = 40, max = 400))]
    pub urgent_low_threshold: Option<u16>,
    #[validate(range(min = 40, max = 400))]
    pub target_range_min: Option<u16>,
    #[validate(range(min = 40, max = 400))]
    pub target_range_max: Option<u16>,
    pub alerts_enabled: Option<bool>,
    pub haptic_feedback: Option<bool>,
}

/// Time-in-range breakdown. Percentages are rounded independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeInRange {
    pub in_range: u32,
    pub above: u32,
    pub below: u32,
    pub readings: usize,
}

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    /// New glucose reading recorded
    ReadingUpdate(Reading),
    /// Alert fired
    AlertRaised(Alert),
    /// Connection state changed
    StatusChanged {
        status: ConnectionStatus,
        device: Option<Device>,
    },
    /// Connection acknowledgment
    Connected { client_id: String },
    /// Error message
    Error { message: String },
    /// Heartbeat/ping
    Ping,
    /// Heartbeat/pong response
    Pong,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub connection_status: ConnectionStatus,
    pub last_reading: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_ids_are_unique() {
        let now = Utc::now();
        let a = Reading::new(100, Trend::Stable, now);
        let b = Reading::new(100, Trend::Stable, now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Trend::RisingFast).unwrap(), "\"rising_fast\"");
        assert_eq!(serde_json::to_string(&AlertType::UrgentLow).unwrap(), "\"urgent_low\"");
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::SignalLoss).unwrap(),
            "\"signal_loss\""
        );
        let device_type: DeviceType = serde_json::from_str("\"simulated\"").unwrap();
        assert!(device_type.is_simulated());
    }

    #[test]
    fn test_settings_merge_is_shallow() {
        let settings = CgmSettings::default();
        let update = SettingsUpdate {
            high_threshold: Some(200),
            alerts_enabled: Some(false),
            ..Default::default()
        };

        let merged = settings.merged(&update);

        assert_eq!(merged.high_threshold, 200);
        assert!(!merged.alerts_enabled);
        assert_eq!(merged.low_threshold, settings.low_threshold);
        assert_eq!(merged.target_range_max, settings.target_range_max);
        assert!(merged.haptic_feedback);
    }

    #[test]
    fn test_reading_input_validation() {
        let valid = ReadingInput { value: 120, timestamp: None };
        assert!(valid.validate().is_ok());

        let too_low = ReadingInput { value: 39, timestamp: None };
        assert!(too_low.validate().is_err());

        let too_high = ReadingInput { value: 401, timestamp: None };
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn test_alert_without_value_serializes_null() {
        let alert = Alert::without_value(AlertType::SignalLoss, Utc::now());
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "signal_loss");
        assert!(json["value"].is_null());

        let alert = Alert::new(AlertType::High, 250, Utc::now());
        assert_eq!(serde_json::to_value(&alert).unwrap()["value"], 250);
    }

    #[test]
    fn test_ws_message_tagging() {
        let msg = WsMessage::Connected { client_id: "abc".to_string() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Connected");
        assert_eq!(json["data"]["client_id"], "abc");
    }
}
