//! Session state management
//!
//! Central state container for one CGM session: connection status, the
//! active device, the reading and alert rings, and the user's settings.
//! Every transition is a synchronous method here; [`crate::controller`]
//! wraps the state in a lock and drives the timers.
//!
//! Histories are stored newest-first, so the current reading is always the
//! front of the reading ring.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::evaluate_alerts;
use crate::config::RetentionSettings;
use crate::error::{AppError, AppResult};
use crate::generator::{generate_next_reading, trend_after, Clock, RandomSource, BASELINE_GLUCOSE};
use crate::metrics::{self, GMI_WINDOW_HOURS};
use crate::models::{
    Alert, AlertType, CgmSettings, ConnectionStatus, Device, DeviceType, Reading, ReadingInput,
    SettingsUpdate, TimeInRange,
};
use crate::store::PersistedState;
use crate::validation::{validate_reading_input, validate_settings, validate_settings_update};

/// State of a single CGM session
pub struct SessionState {
    status: ConnectionStatus,
    device: Option<Device>,
    /// Newest first
    history: VecDeque<Reading>,
    /// Newest first
    alerts: VecDeque<Alert>,
    settings: CgmSettings,
    max_readings: usize,
    max_alerts: usize,
    /// Bumped on every connect and disconnect so stale connects can be detected
    connection_epoch: u64,
    simulating: bool,
    /// Bumped on every start/stop so a superseded loop can never tick again
    simulation_epoch: u64,
    simulation_task: Option<JoinHandle<()>>,
    watchdog_task: Option<JoinHandle<()>>,
    rng: Box<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    start_time: DateTime<Utc>,
    total_readings: u64,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("status", &self.status)
            .field("device", &self.device)
            .field("readings", &self.history.len())
            .field("alerts", &self.alerts.len())
            .field("simulating", &self.simulating)
            .finish()
    }
}

impl SessionState {
    /// Create a disconnected session
    pub fn new(
        retention: &RetentionSettings,
        rng: Box<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            max_readings = retention.max_readings,
            max_alerts = retention.max_alerts,
            "Initializing CGM session state"
        );
        let start_time = clock.now();
        Self {
            status: ConnectionStatus::Disconnected,
            device: None,
            history: VecDeque::with_capacity(retention.max_readings),
            alerts: VecDeque::with_capacity(retention.max_alerts),
            settings: CgmSettings::default(),
            max_readings: retention.max_readings,
            max_alerts: retention.max_alerts,
            connection_epoch: 0,
            simulating: false,
            simulation_epoch: 0,
            simulation_task: None,
            watchdog_task: None,
            rng,
            clock,
            start_time,
            total_readings: 0,
        }
    }

    // --- Connection lifecycle ---

    /// Enter `connecting`. Returns the epoch the pending connect must present.
    pub fn begin_connect(&mut self) -> AppResult<u64> {
        if self.status != ConnectionStatus::Disconnected {
            return Err(AppError::InvalidState(format!(
                "Cannot connect while {:?}",
                self.status
            )));
        }
        self.connection_epoch += 1;
        self.status = ConnectionStatus::Connecting;
        Ok(self.connection_epoch)
    }

    /// Finish a pending connect started with [`Self::begin_connect`]
    pub fn complete_connect(&mut self, device_type: DeviceType, epoch: u64) -> AppResult<Device> {
        if self.status != ConnectionStatus::Connecting || self.connection_epoch != epoch {
            return Err(AppError::InvalidState("Connection cancelled".to_string()));
        }

        let device = Device::new(device_type, self.clock.now());
        info!(device_id = %device.id, device = %device.name, "Device connected");

        self.status = ConnectionStatus::Connected;
        self.device = Some(device.clone());
        Ok(device)
    }

    /// Drop the device, stop simulation and cancel all timers
    pub fn disconnect(&mut self) {
        self.stop_simulation();
        if let Some(handle) = self.watchdog_task.take() {
            handle.abort();
        }

        if let Some(device) = self.device.take() {
            info!(device_id = %device.id, "Device disconnected");
        }
        self.connection_epoch += 1;
        self.status = ConnectionStatus::Disconnected;
    }

    // --- Simulation ---

    /// Arm the simulation loop. `Ok(None)` when it is already running.
    pub fn begin_simulation(&mut self) -> AppResult<Option<u64>> {
        let simulated = self
            .device
            .as_ref()
            .is_some_and(|d| d.device_type.is_simulated());

        if self.status != ConnectionStatus::Connected || !simulated {
            return Err(AppError::InvalidState(
                "Simulation requires a connected simulated device".to_string(),
            ));
        }

        if self.simulating {
            return Ok(None);
        }

        self.simulating = true;
        self.simulation_epoch += 1;
        info!(epoch = self.simulation_epoch, "Simulation started");
        Ok(Some(self.simulation_epoch))
    }

    /// Keep the handle of the loop armed by [`Self::begin_simulation`]
    pub fn set_simulation_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.simulation_task.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the loop. Takes effect before the lock is released, so no
    /// further tick can land even if one is already waiting on the lock.
    pub fn stop_simulation(&mut self) -> bool {
        let was_running = self.simulating;
        self.simulating = false;
        self.simulation_epoch += 1;

        if let Some(handle) = self.simulation_task.take() {
            handle.abort();
        }
        if was_running {
            info!("Simulation stopped");
        }
        was_running
    }

    fn simulation_active(&self, epoch: u64) -> bool {
        self.simulating
            && self.simulation_epoch == epoch
            && self.status == ConnectionStatus::Connected
            && self
                .device
                .as_ref()
                .is_some_and(|d| d.device_type.is_simulated())
    }

    /// Run one simulation step for the loop armed at `epoch`.
    ///
    /// Returns `None` once that loop has been stopped or superseded.
    pub fn simulation_tick(&mut self, epoch: u64) -> Option<(Reading, Vec<Alert>)> {
        if !self.simulation_active(epoch) {
            return None;
        }

        let last_value = self
            .history
            .front()
            .map(|r| r.value)
            .unwrap_or(BASELINE_GLUCOSE);
        let now = self.clock.now();
        let history = self.history.make_contiguous();
        let reading = generate_next_reading(last_value, history, self.rng.as_mut(), now);

        let alerts = self.record_reading(reading.clone());
        Some((reading, alerts))
    }

    // --- External feed ---

    /// Record a reading delivered by a real sensor
    pub fn ingest_reading(&mut self, input: &ReadingInput) -> AppResult<(Reading, Vec<Alert>)> {
        let live = matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::SignalLoss
        );
        let hardware = self
            .device
            .as_ref()
            .is_some_and(|d| !d.device_type.is_simulated());

        if !live || !hardware {
            return Err(AppError::InvalidState(
                "Readings can only be ingested from a connected hardware sensor".to_string(),
            ));
        }

        let newest = self.history.front().map(|r| r.timestamp);
        validate_reading_input(input, newest)?;

        let timestamp = input.timestamp.unwrap_or_else(|| self.clock.now());
        let timestamp = newest.map_or(timestamp, |n| timestamp.max(n));
        let history = self.history.make_contiguous();
        let reading = Reading::new(input.value, trend_after(input.value, history), timestamp);

        let alerts = self.record_reading(reading.clone());
        Ok((reading, alerts))
    }

    /// Prepend a reading, trim the ring and raise alerts for it
    fn record_reading(&mut self, reading: Reading) -> Vec<Alert> {
        self.total_readings += 1;

        debug!(
            reading_id = %reading.id,
            value = reading.value,
            trend = ?reading.trend,
            total = self.total_readings,
            "Recording glucose reading"
        );

        if let Some(device) = self.device.as_mut() {
            device.last_sync = Some(reading.timestamp);
        }
        if self.status == ConnectionStatus::SignalLoss {
            info!("Sensor signal restored");
            self.status = ConnectionStatus::Connected;
        }

        let raised: Vec<Alert> = evaluate_alerts(&reading, &self.settings)
            .into_iter()
            .map(|alert_type| Alert::new(alert_type, reading.value, reading.timestamp))
            .collect();

        self.history.push_front(reading);
        self.history.truncate(self.max_readings);

        for alert in &raised {
            self.push_alert(alert.clone());
        }
        raised
    }

    fn push_alert(&mut self, alert: Alert) {
        self.alerts.push_front(alert);
        self.alerts.truncate(self.max_alerts);
    }

    // --- Signal watchdog ---

    /// Declare signal loss when a hardware feed has been silent longer than
    /// `stale_after`. Returns the alerts raised on transition, `None` if the
    /// status did not change.
    pub fn check_signal(&mut self, stale_after: Duration) -> Option<Vec<Alert>> {
        if self.status != ConnectionStatus::Connected {
            return None;
        }
        let device = self.device.as_ref()?;
        if device.device_type.is_simulated() {
            return None;
        }

        let last_seen = self
            .history
            .front()
            .map_or(device.connected_at, |r| r.timestamp.max(device.connected_at));
        let now = self.clock.now();
        if now - last_seen <= stale_after {
            return None;
        }

        warn!(
            device_id = %device.id,
            silent_minutes = (now - last_seen).num_minutes(),
            "Sensor signal lost"
        );
        self.status = ConnectionStatus::SignalLoss;

        let mut raised = Vec::new();
        if self.settings.alerts_enabled {
            let alert = match self.history.front() {
                Some(last) => Alert::new(AlertType::SignalLoss, last.value, now),
                None => Alert::without_value(AlertType::SignalLoss, now),
            };
            self.push_alert(alert.clone());
            raised.push(alert);
        }
        Some(raised)
    }

    /// Keep the handle of the running signal watchdog
    pub fn set_watchdog_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.watchdog_task.replace(handle) {
            previous.abort();
        }
    }

    // --- Alerts & settings ---

    pub fn acknowledge_alert(&mut self, id: Uuid) -> AppResult<()> {
        let alert = self
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Alert {} not found", id)))?;
        alert.acknowledged = true;
        Ok(())
    }

    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }

    /// Merge a settings patch. Invalid results are rejected and nothing changes.
    pub fn update_settings(&mut self, update: &SettingsUpdate) -> AppResult<CgmSettings> {
        validate_settings_update(update)?;
        let merged = self.settings.merged(update);
        validate_settings(&merged)?;

        info!(settings = ?merged, "Settings updated");
        self.settings = merged.clone();
        Ok(merged)
    }

    // --- Queries ---

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn connection_epoch(&self) -> u64 {
        self.connection_epoch
    }

    pub fn is_simulating(&self) -> bool {
        self.simulating
    }

    pub fn settings(&self) -> &CgmSettings {
        &self.settings
    }

    /// The newest reading
    pub fn current_reading(&self) -> Option<&Reading> {
        self.history.front()
    }

    /// All readings, newest first
    pub fn history(&self) -> impl Iterator<Item = &Reading> {
        self.history.iter()
    }

    /// All alerts, newest first
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    /// Readings from the last `hours`, newest first
    pub fn readings_for_period(&self, hours: u32) -> Vec<Reading> {
        metrics::readings_for_period(&self.history, hours, self.clock.now())
            .into_iter()
            .cloned()
            .collect()
    }

    fn window_values(&self, hours: u32) -> Vec<u16> {
        metrics::readings_for_period(&self.history, hours, self.clock.now())
            .into_iter()
            .map(|r| r.value)
            .collect()
    }

    pub fn time_in_range(&self, hours: u32) -> TimeInRange {
        metrics::time_in_range(
            &self.window_values(hours),
            self.settings.target_range_min,
            self.settings.target_range_max,
        )
    }

    pub fn average_glucose(&self, hours: u32) -> Option<u16> {
        metrics::average_glucose(&self.window_values(hours))
    }

    /// GMI over the last 14 days
    pub fn gmi(&self) -> Option<f64> {
        self.average_glucose(GMI_WINDOW_HOURS).map(metrics::gmi)
    }

    pub fn total_readings(&self) -> u64 {
        self.total_readings
    }

    pub fn last_reading_time(&self) -> Option<DateTime<Utc>> {
        self.history.front().map(|r| r.timestamp)
    }

    pub fn uptime_seconds(&self) -> u64 {
        (self.clock.now() - self.start_time).num_seconds().max(0) as u64
    }

    // --- Persistence ---

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            readings: self.history.iter().cloned().collect(),
            settings: self.settings.clone(),
            device: self.device.clone(),
        }
    }

    /// Load readings and settings saved by a previous run. The session stays
    /// disconnected; a saved device is not reconnected.
    pub fn restore(&mut self, saved: PersistedState) {
        let mut readings = saved.readings;
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings.truncate(self.max_readings);
        self.history = readings.into();

        match validate_settings(&saved.settings) {
            Ok(()) => self.settings = saved.settings,
            Err(e) => warn!(error = %e, "Ignoring invalid persisted settings"),
        }

        info!(
            readings = self.history.len(),
            previous_device = ?saved.device.map(|d| d.name),
            "Restored persisted session state"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::{ManualClock, ScriptedRandom};
    use crate::models::Trend;

    fn retention(max_readings: usize, max_alerts: usize) -> RetentionSettings {
        RetentionSettings { max_readings, max_alerts }
    }

    fn session_with(clock: Arc<ManualClock>, max_readings: usize) -> SessionState {
        SessionState::new(
            &retention(max_readings, 50),
            Box::new(ScriptedRandom::quiet()),
            clock,
        )
    }

    fn session() -> (SessionState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (session_with(clock.clone(), 2880), clock)
    }

    fn connect(state: &mut SessionState, device_type: DeviceType) {
        let epoch = state.begin_connect().unwrap();
        state.complete_connect(device_type, epoch).unwrap();
    }

    fn push(state: &mut SessionState, value: u16, at: DateTime<Utc>) -> Vec<Alert> {
        state.record_reading(Reading::new(value, Trend::Stable, at))
    }

    #[test]
    fn test_initial_state() {
        let (state, _) = session();
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(state.device().is_none());
        assert!(state.current_reading().is_none());
        assert!(!state.is_simulating());
        assert_eq!(state.total_readings(), 0);
    }

    #[test]
    fn test_connect_lifecycle() {
        let (mut state, _) = session();

        let epoch = state.begin_connect().unwrap();
        assert_eq!(state.status(), ConnectionStatus::Connecting);
        assert!(state.begin_connect().is_err());

        let device = state.complete_connect(DeviceType::Simulated, epoch).unwrap();
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert_eq!(state.device().unwrap().id, device.id);
        assert_eq!(device.name, "CGM Simulator");
        assert!(state.begin_connect().is_err());

        state.disconnect();
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(state.device().is_none());
    }

    #[test]
    fn test_disconnect_cancels_pending_connect() {
        let (mut state, _) = session();

        let epoch = state.begin_connect().unwrap();
        state.disconnect();

        assert!(matches!(
            state.complete_connect(DeviceType::Simulated, epoch),
            Err(AppError::InvalidState(_))
        ));
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(state.device().is_none());
    }

    #[test]
    fn test_simulation_requires_simulated_device() {
        let (mut state, _) = session();
        assert!(state.begin_simulation().is_err());

        connect(&mut state, DeviceType::DexcomG7);
        assert!(state.begin_simulation().is_err());
    }

    #[test]
    fn test_simulation_ticks_prepend_readings() {
        let (mut state, _) = session();
        connect(&mut state, DeviceType::Simulated);

        let epoch = state.begin_simulation().unwrap().unwrap();
        assert_eq!(state.begin_simulation().unwrap(), None);

        let (first, _) = state.simulation_tick(epoch).unwrap();
        assert_eq!(first.value, BASELINE_GLUCOSE);
        let (second, _) = state.simulation_tick(epoch).unwrap();

        assert_eq!(state.current_reading().unwrap().id, second.id);
        let ids: Vec<Uuid> = state.history().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(
            state.device().unwrap().last_sync,
            Some(second.timestamp)
        );
    }

    #[test]
    fn test_stop_is_immediate() {
        let (mut state, _) = session();
        connect(&mut state, DeviceType::Simulated);
        let epoch = state.begin_simulation().unwrap().unwrap();
        state.simulation_tick(epoch).unwrap();

        assert!(state.stop_simulation());
        assert!(state.simulation_tick(epoch).is_none());
        assert_eq!(state.history().count(), 1);
    }

    #[test]
    fn test_superseded_loop_cannot_tick() {
        let (mut state, _) = session();
        connect(&mut state, DeviceType::Simulated);

        let old_epoch = state.begin_simulation().unwrap().unwrap();
        state.stop_simulation();
        let new_epoch = state.begin_simulation().unwrap().unwrap();

        assert!(state.simulation_tick(old_epoch).is_none());
        assert!(state.simulation_tick(new_epoch).is_some());
    }

    #[test]
    fn test_disconnect_stops_simulation() {
        let (mut state, _) = session();
        connect(&mut state, DeviceType::Simulated);
        let epoch = state.begin_simulation().unwrap().unwrap();

        state.disconnect();

        assert!(!state.is_simulating());
        assert!(state.simulation_tick(epoch).is_none());
    }

    #[test]
    fn test_retention_cap_evicts_oldest() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut state = session_with(clock.clone(), 2880);
        let start = clock.now();

        for i in 0..2881i64 {
            push(&mut state, 120, start + Duration::minutes(5 * i));
        }

        assert_eq!(state.history().count(), 2880);
        assert_eq!(state.total_readings(), 2881);
        let oldest = state.history().last().unwrap();
        assert_eq!(oldest.timestamp, start + Duration::minutes(5));
    }

    #[test]
    fn test_alerts_recorded_newest_first_and_capped() {
        let (mut state, clock) = session();
        let now = clock.now();

        let raised = state.record_reading(Reading::new(50, Trend::FallingFast, now));
        assert_eq!(raised.len(), 2);
        let types: Vec<AlertType> = state.alerts().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::FallingFast, AlertType::UrgentLow]);

        for _ in 0..60 {
            push(&mut state, 250, now);
        }
        assert_eq!(state.alerts().count(), 50);
        assert!(state.alerts().all(|a| a.alert_type == AlertType::High));
    }

    #[test]
    fn test_settings_apply_to_future_readings_only() {
        let (mut state, clock) = session();
        let now = clock.now();

        assert_eq!(push(&mut state, 190, now).len(), 1);

        state
            .update_settings(&SettingsUpdate {
                alerts_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();

        assert!(push(&mut state, 190, now).is_empty());
        assert_eq!(state.alerts().count(), 1);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (mut state, _) = session();
        let before = state.settings().clone();

        let result = state.update_settings(&SettingsUpdate {
            low_threshold: Some(50),
            ..Default::default()
        });

        assert!(matches!(result, Err(AppError::ValidationError(_))));
        assert_eq!(state.settings(), &before);
    }

    #[test]
    fn test_acknowledge_and_clear_alerts() {
        let (mut state, clock) = session();
        let raised = push(&mut state, 45, clock.now());
        let id = raised[0].id;

        state.acknowledge_alert(id).unwrap();
        assert!(state.alerts().next().unwrap().acknowledged);
        assert!(matches!(
            state.acknowledge_alert(Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));

        state.clear_alerts();
        assert_eq!(state.alerts().count(), 0);
        assert_eq!(state.history().count(), 1);
    }

    #[test]
    fn test_time_in_range_window() {
        let (mut state, clock) = session();
        let now = clock.now();

        push(&mut state, 300, now - Duration::hours(30));
        for (i, value) in [50, 70, 120, 180, 200].into_iter().enumerate() {
            push(&mut state, value, now - Duration::minutes(50 - 5 * i as i64));
        }

        let tir = state.time_in_range(24);
        assert_eq!(tir, TimeInRange { in_range: 60, above: 20, below: 20, readings: 5 });

        let all = state.time_in_range(48);
        assert_eq!(all.readings, 6);
    }

    #[test]
    fn test_average_and_gmi() {
        let (mut state, clock) = session();
        let now = clock.now();

        assert_eq!(state.average_glucose(1), None);
        assert_eq!(state.gmi(), None);

        push(&mut state, 150, now - Duration::days(10));
        push(&mut state, 158, now - Duration::hours(3));

        assert_eq!(state.average_glucose(1), None);
        assert_eq!(state.average_glucose(24), Some(158));
        // 14-day average 154
        assert_eq!(state.gmi(), Some(7.0));
    }

    #[test]
    fn test_readings_for_period_newest_first() {
        let (mut state, clock) = session();
        let now = clock.now();
        push(&mut state, 100, now - Duration::hours(2));
        push(&mut state, 110, now - Duration::minutes(30));
        push(&mut state, 120, now);

        let values: Vec<u16> = state.readings_for_period(1).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![120, 110]);
    }

    #[test]
    fn test_ingest_requires_hardware_device() {
        let (mut state, _) = session();
        let input = ReadingInput { value: 120, timestamp: None };
        assert!(state.ingest_reading(&input).is_err());

        connect(&mut state, DeviceType::Simulated);
        assert!(matches!(
            state.ingest_reading(&input),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_ingest_computes_trend() {
        let (mut state, clock) = session();
        connect(&mut state, DeviceType::FreestyleLibre3);

        for value in [100, 110, 145] {
            clock.advance(Duration::minutes(5));
            state
                .ingest_reading(&ReadingInput { value, timestamp: None })
                .unwrap();
        }

        let current = state.current_reading().unwrap();
        assert_eq!(current.value, 145);
        assert_eq!(current.trend, Trend::RisingFast);
        assert_eq!(
            state.alerts().next().unwrap().alert_type,
            AlertType::RisingFast
        );
    }

    #[test]
    fn test_signal_loss_and_recovery() {
        let (mut state, clock) = session();
        connect(&mut state, DeviceType::DexcomG7);
        state
            .ingest_reading(&ReadingInput { value: 110, timestamp: None })
            .unwrap();

        clock.advance(Duration::minutes(15));
        assert!(state.check_signal(Duration::minutes(15)).is_none());

        clock.advance(Duration::minutes(1));
        let raised = state.check_signal(Duration::minutes(15)).unwrap();
        assert_eq!(state.status(), ConnectionStatus::SignalLoss);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::SignalLoss);
        assert_eq!(raised[0].value, Some(110));

        // no repeat while already lost
        assert!(state.check_signal(Duration::minutes(15)).is_none());

        state
            .ingest_reading(&ReadingInput { value: 112, timestamp: None })
            .unwrap();
        assert_eq!(state.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_signal_loss_before_first_reading_has_no_value() {
        let (mut state, clock) = session();
        connect(&mut state, DeviceType::DexcomG7);

        clock.advance(Duration::minutes(16));
        let raised = state.check_signal(Duration::minutes(15)).unwrap();

        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].alert_type, AlertType::SignalLoss);
        assert_eq!(raised[0].value, None);
        assert_eq!(state.alerts().next().unwrap().value, None);
    }

    #[test]
    fn test_simulated_device_never_loses_signal() {
        let (mut state, clock) = session();
        connect(&mut state, DeviceType::Simulated);

        clock.advance(Duration::hours(2));
        assert!(state.check_signal(Duration::minutes(15)).is_none());
        assert_eq!(state.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_snapshot_and_restore() {
        let (mut state, clock) = session();
        let now = clock.now();
        push(&mut state, 100, now - Duration::minutes(10));
        push(&mut state, 105, now - Duration::minutes(5));
        state
            .update_settings(&SettingsUpdate {
                high_threshold: Some(220),
                ..Default::default()
            })
            .unwrap();

        let snapshot = state.snapshot();

        let mut restored = session_with(clock.clone(), 1);
        restored.restore(snapshot);

        assert_eq!(restored.history().count(), 1);
        assert_eq!(restored.current_reading().unwrap().value, 105);
        assert_eq!(restored.settings().high_threshold, 220);
        assert_eq!(restored.status(), ConnectionStatus::Disconnected);
    }
}
