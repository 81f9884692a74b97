//! CGM session controller
//!
//! Owns the shared [`SessionState`] and everything that runs on a timer:
//! the simulated pairing delay, the periodic simulation loop and the
//! signal-loss watchdog. Each tick takes the state lock once and performs
//! generate → append → evaluate → notify inside it, so a stop issued under
//! the same lock always wins over a pending tick.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{dispatch_alerts, Notifier};
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::generator::{Clock, RandomSource, SystemClock};
use crate::models::{CgmSettings, Device, DeviceType, Reading, ReadingInput, SettingsUpdate};
use crate::state::SessionState;
use crate::store::{PersistedState, Store};

struct Inner {
    state: RwLock<SessionState>,
    notifier: Arc<dyn Notifier>,
    persister: Persister,
    tick_interval: Duration,
    connect_delay: Duration,
    watchdog_interval: Duration,
    signal_loss_after: chrono::Duration,
}

/// Cheaply cloneable handle to one CGM session
#[derive(Clone)]
pub struct CgmController {
    inner: Arc<Inner>,
}

impl CgmController {
    /// Create a controller with an entropy-seeded generator and the wall clock
    pub fn new(settings: &Settings, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_sources(
            settings,
            store,
            notifier,
            Box::new(StdRng::from_entropy()),
            Arc::new(SystemClock),
        )
    }

    /// Create a controller with explicit randomness and time sources
    pub fn with_sources(
        settings: &Settings,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        rng: Box<dyn RandomSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            tick_interval_secs = settings.simulation.tick_interval_secs,
            connect_delay_ms = settings.simulation.connect_delay_ms,
            "Initializing CGM controller"
        );

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState::new(&settings.retention, rng, clock)),
                notifier,
                persister: Persister::new(store),
                tick_interval: settings.simulation.tick_interval(),
                connect_delay: settings.simulation.connect_delay(),
                watchdog_interval: settings.watchdog.check_interval(),
                signal_loss_after: chrono::Duration::minutes(settings.watchdog.signal_loss_minutes),
            }),
        }
    }

    /// Read access to the session for queries
    pub async fn state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().await
    }

    /// Load persisted readings and settings. Failures are logged and ignored.
    pub async fn restore(&self) {
        match self.inner.persister.store.load().await {
            Ok(Some(saved)) => self.inner.state.write().await.restore(saved),
            Ok(None) => debug!("No persisted session state"),
            Err(e) => warn!(error = %e, "Failed to load persisted session state"),
        }
    }

    /// Pair with a device. Resolves once the (simulated) pairing delay has
    /// elapsed; a simulated device starts producing readings immediately.
    pub async fn connect_device(&self, device_type: DeviceType) -> AppResult<Device> {
        let epoch = self.inner.state.write().await.begin_connect()?;
        info!(device_type = ?device_type, "Connecting device");

        // Detached: the session must leave `connecting` even if the caller goes away
        let controller = self.clone();
        let pairing =
            tokio::spawn(async move { controller.complete_pairing(device_type, epoch).await });

        pairing
            .await
            .map_err(|e| AppError::InternalError(format!("Pairing task failed: {}", e)))?
    }

    async fn complete_pairing(&self, device_type: DeviceType, epoch: u64) -> AppResult<Device> {
        sleep(self.inner.connect_delay).await;

        let mut state = self.inner.state.write().await;
        let device = state.complete_connect(device_type, epoch)?;

        if device_type.is_simulated() {
            self.arm_simulation(&mut state)?;
        } else {
            let handle = tokio::spawn(run_watchdog(self.inner.clone(), epoch));
            state.set_watchdog_task(handle);
        }

        self.persist(state.snapshot());
        Ok(device)
    }

    /// Pair a simulated device in the background on the actix system.
    /// Must be called from within a running actix system.
    pub fn spawn_auto_connect(&self) {
        let controller = self.clone();
        actix_rt::spawn(async move {
            if let Err(e) = controller.connect_device(DeviceType::Simulated).await {
                warn!(error = %e, "Auto-connect of simulated sensor failed");
            }
        });
    }

    /// Drop the device and cancel all timers
    pub async fn disconnect_device(&self) {
        let mut state = self.inner.state.write().await;
        state.disconnect();
        self.persist(state.snapshot());
    }

    /// Resume the simulation loop on a connected simulated device
    pub async fn start_simulation(&self) -> AppResult<()> {
        let mut state = self.inner.state.write().await;
        self.arm_simulation(&mut state)
    }

    /// Pause the simulation loop without disconnecting
    pub async fn stop_simulation(&self) {
        self.inner.state.write().await.stop_simulation();
    }

    fn arm_simulation(&self, state: &mut SessionState) -> AppResult<()> {
        if let Some(epoch) = state.begin_simulation()? {
            let handle = tokio::spawn(run_simulation(self.inner.clone(), epoch));
            state.set_simulation_task(handle);
        }
        Ok(())
    }

    /// Record a reading from a hardware sensor feed
    pub async fn ingest_reading(&self, input: &ReadingInput) -> AppResult<Reading> {
        let mut state = self.inner.state.write().await;
        let (reading, alerts) = state.ingest_reading(input)?;
        dispatch_alerts(
            self.inner.notifier.as_ref(),
            &alerts,
            state.settings().haptic_feedback,
        );
        self.persist(state.snapshot());
        Ok(reading)
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> AppResult<CgmSettings> {
        let mut state = self.inner.state.write().await;
        let settings = state.update_settings(update)?;
        self.persist(state.snapshot());
        Ok(settings)
    }

    pub async fn acknowledge_alert(&self, id: Uuid) -> AppResult<()> {
        self.inner.state.write().await.acknowledge_alert(id)
    }

    pub async fn clear_alerts(&self) {
        self.inner.state.write().await.clear_alerts();
    }

    fn persist(&self, snapshot: PersistedState) {
        persist(&self.inner, snapshot);
    }
}

/// Writes snapshots one at a time. Each snapshot is numbered when it is
/// taken (under the state lock), and one older than the last written is
/// dropped, so the store never goes backwards.
struct Persister {
    store: Arc<dyn Store>,
    next_seq: AtomicU64,
    written: Mutex<u64>,
}

impl Persister {
    fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            next_seq: AtomicU64::new(1),
            written: Mutex::new(0),
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn write(&self, seq: u64, snapshot: PersistedState) {
        let mut written = self.written.lock().await;
        if seq <= *written {
            debug!(seq, written = *written, "Skipping stale session snapshot");
            return;
        }

        if let Err(e) = self.store.save(&snapshot).await {
            warn!(error = %e, "Failed to persist session state");
        }
        *written = seq;
    }
}

/// Save in the background; failures never reach the caller
fn persist(inner: &Arc<Inner>, snapshot: PersistedState) {
    let seq = inner.persister.next_seq();
    let inner = inner.clone();
    tokio::spawn(async move {
        inner.persister.write(seq, snapshot).await;
    });
}

/// Periodic simulation loop. The first tick fires immediately.
async fn run_simulation(inner: Arc<Inner>, epoch: u64) {
    info!(epoch, interval_secs = inner.tick_interval.as_secs(), "Starting simulation loop");
    let mut ticker = interval(inner.tick_interval);

    loop {
        ticker.tick().await;

        let mut state = inner.state.write().await;
        let Some((reading, alerts)) = state.simulation_tick(epoch) else {
            debug!(epoch, "Simulation loop superseded");
            break;
        };

        debug!(
            reading_id = %reading.id,
            value = reading.value,
            trend = ?reading.trend,
            alerts = alerts.len(),
            "Generated simulated reading"
        );

        dispatch_alerts(
            inner.notifier.as_ref(),
            &alerts,
            state.settings().haptic_feedback,
        );
        persist(&inner, state.snapshot());
    }
}

/// Periodic staleness check for hardware feeds
async fn run_watchdog(inner: Arc<Inner>, connection_epoch: u64) {
    let mut ticker = interval(inner.watchdog_interval);
    // interval fires immediately; the feed cannot be stale yet
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let mut state = inner.state.write().await;
        if state.connection_epoch() != connection_epoch {
            break;
        }
        if let Some(alerts) = state.check_signal(inner.signal_loss_after) {
            dispatch_alerts(
                inner.notifier.as_ref(),
                &alerts,
                state.settings().haptic_feedback,
            );
            persist(&inner, state.snapshot());
        }
    }
}
