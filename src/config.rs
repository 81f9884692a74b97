//! Configuration management module
//!
//! Layers built-in defaults with `CGM__`-prefixed environment variables,
//! e.g. `CGM__SERVER__PORT=9090` or `CGM__SIMULATION__TICK_INTERVAL_SECS=5`.

use config::{Config, ConfigBuilder, Environment};
use config::builder::DefaultState;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Simulation loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// Seconds between synthetic readings
    pub tick_interval_secs: u64,
    /// Simulated pairing latency in milliseconds
    pub connect_delay_ms: u64,
    /// Connect a simulated device on start-up
    pub auto_connect: bool,
}

impl SimulationSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }
}

/// In-memory retention caps
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSettings {
    pub max_readings: usize,
    pub max_alerts: usize,
}

/// Signal-loss watchdog configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSettings {
    /// Minutes without a reading before the link is declared lost
    pub signal_loss_minutes: i64,
    pub check_interval_secs: u64,
}

impl WatchdogSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    /// JSON snapshot file; unset keeps state in memory only
    pub path: Option<String>,
}

/// FHIR configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct FhirSettings {
    /// Patient reference for observations
    pub patient_reference: String,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub simulation: SimulationSettings,
    pub retention: RetentionSettings,
    pub watchdog: WatchdogSettings,
    #[serde(default)]
    pub store: StoreSettings,
    pub fhir: FhirSettings,
}

impl Settings {
    /// Load settings from defaults overlaid with environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        let config = Self::defaults()?
            .add_source(
                Environment::with_prefix("CGM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the timers and retention rings cannot work with
    pub fn validate(&self) -> Result<(), SettingsError> {
        fn at_least_one(key: &'static str, value: u64) -> Result<(), SettingsError> {
            if value < 1 {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("must be at least 1, got {}", value),
                });
            }
            Ok(())
        }

        at_least_one(
            "simulation.tick_interval_secs",
            self.simulation.tick_interval_secs,
        )?;
        at_least_one("retention.max_readings", self.retention.max_readings as u64)?;
        at_least_one("retention.max_alerts", self.retention.max_alerts as u64)?;
        at_least_one(
            "watchdog.check_interval_secs",
            self.watchdog.check_interval_secs,
        )?;

        if self.watchdog.signal_loss_minutes < 1 {
            return Err(SettingsError::Invalid {
                key: "watchdog.signal_loss_minutes",
                reason: format!(
                    "must be at least 1, got {}",
                    self.watchdog.signal_loss_minutes
                ),
            });
        }

        Ok(())
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("simulation.tick_interval_secs", 300)?
            .set_default("simulation.connect_delay_ms", 2000)?
            .set_default("simulation.auto_connect", false)?
            .set_default("retention.max_readings", 2880)?
            .set_default("retention.max_alerts", 50)?
            .set_default("watchdog.signal_loss_minutes", 15)?
            .set_default("watchdog.check_interval_secs", 60)?
            .set_default("fhir.patient_reference", "Patient/cgm-subject")?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            simulation: SimulationSettings {
                tick_interval_secs: 300,
                connect_delay_ms: 2000,
                auto_connect: false,
            },
            retention: RetentionSettings {
                max_readings: 2880,
                max_alerts: 50,
            },
            watchdog: WatchdogSettings {
                signal_loss_minutes: 15,
                check_interval_secs: 60,
            },
            store: StoreSettings { path: None },
            fhir: FhirSettings {
                patient_reference: "Patient/cgm-subject".to_string(),
            },
        }
    }
}
