//! Timer-driven automatic readings.
//!
//! While active, the poller takes one reading immediately and then one per
//! interval from a [`ReadingSource`], storing each in the readings store. The
//! first failed reading stops the poller.

use crate::domain::models::{AppEvent, GlucoseUnit, NewReading, ReadingType};
use crate::infrastructure::bluetooth::{BluetoothError, BluetoothService};
use crate::infrastructure::readings::ReadingsRepository;
use crate::infrastructure::storage::StorageError;
use chrono::Utc;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum AutoReadingError {
    #[error("No device connected")]
    NoDeviceConnected,

    #[error("Sensor read failed: {0}")]
    Sensor(#[from] BluetoothError),

    #[error("Failed to store reading: {0}")]
    Storage(#[from] StorageError),

    #[error("Lock error")]
    Lock,
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can produce a glucose reading on demand
pub trait ReadingSource: Send + Sync {
    fn is_available<'a>(&'a self) -> SourceFuture<'a, bool>;

    fn read<'a>(
        &'a self,
        reading_type: ReadingType,
    ) -> SourceFuture<'a, Result<NewReading, AutoReadingError>>;
}

/// Stand-in sensor producing uniformly random values after a fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    delay: Duration,
}

impl SimulatedSensor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Inclusive mg/dL range the simulation draws from
    pub fn value_range(reading_type: ReadingType) -> (u32, u32) {
        match reading_type {
            ReadingType::Blood => (70, 180),
            ReadingType::Urine => (0, 50),
        }
    }
}

impl ReadingSource for SimulatedSensor {
    fn is_available<'a>(&'a self) -> SourceFuture<'a, bool> {
        Box::pin(async { true })
    }

    fn read<'a>(
        &'a self,
        reading_type: ReadingType,
    ) -> SourceFuture<'a, Result<NewReading, AutoReadingError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            let (min, max) = Self::value_range(reading_type);
            let value = rand::thread_rng().gen_range(min..=max);
            Ok(NewReading {
                reading_type,
                value: value as f64,
                unit: GlucoseUnit::MgDl.label().to_string(),
                timestamp: Utc::now(),
            })
        })
    }
}

/// Reads the connected sensor's characteristic on demand
#[derive(Clone)]
pub struct BleSensor {
    bluetooth: Arc<tokio::sync::Mutex<BluetoothService>>,
}

impl BleSensor {
    pub fn new(bluetooth: Arc<tokio::sync::Mutex<BluetoothService>>) -> Self {
        Self { bluetooth }
    }
}

impl ReadingSource for BleSensor {
    fn is_available<'a>(&'a self) -> SourceFuture<'a, bool> {
        Box::pin(async { self.bluetooth.lock().await.is_connected() })
    }

    fn read<'a>(
        &'a self,
        reading_type: ReadingType,
    ) -> SourceFuture<'a, Result<NewReading, AutoReadingError>> {
        Box::pin(async move {
            let reading = self.bluetooth.lock().await.read_once().await?;
            if reading.reading_type != reading_type {
                debug!(
                    "Sensor reported a {} sample while polling for {}",
                    reading.reading_type, reading_type
                );
            }
            Ok(reading)
        })
    }
}

#[derive(Default)]
struct PollerState {
    active: bool,
    reading_type: Option<ReadingType>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct AutoReadingService {
    source: Arc<dyn ReadingSource>,
    readings: ReadingsRepository,
    interval: Duration,
    event_sender: Option<mpsc::UnboundedSender<AppEvent>>,
    state: Arc<Mutex<PollerState>>,
}

impl AutoReadingService {
    pub fn new(
        source: Arc<dyn ReadingSource>,
        readings: ReadingsRepository,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            readings,
            interval,
            event_sender: None,
            state: Arc::new(Mutex::new(PollerState::default())),
        }
    }

    /// Also announce stored readings on the application event channel
    pub fn with_events(mut self, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Begin polling. Calling this while already active does nothing.
    pub async fn start(&self, reading_type: ReadingType) -> Result<(), AutoReadingError> {
        if self.is_active() {
            return Ok(());
        }

        if !self.source.is_available().await {
            return Err(AutoReadingError::NoDeviceConnected);
        }

        let mut state = self.state.lock().map_err(|_| AutoReadingError::Lock)?;
        if state.active {
            return Ok(());
        }
        state.active = true;
        state.reading_type = Some(reading_type);
        state.generation += 1;
        let generation = state.generation;

        let poller = self.clone();
        state.task = Some(tokio::spawn(async move {
            poller.run(reading_type, generation).await;
        }));

        info!(
            "Auto reading started for {} every {:?}",
            reading_type, self.interval
        );
        Ok(())
    }

    async fn run(&self, reading_type: ReadingType, generation: u64) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // first tick completes immediately
            ticker.tick().await;
            if let Err(e) = self.perform_reading(reading_type).await {
                error!("Auto reading failed: {}", e);
                self.halt(generation);
                return;
            }
        }
    }

    async fn perform_reading(&self, reading_type: ReadingType) -> Result<(), AutoReadingError> {
        let new_reading = self.source.read(reading_type).await?;
        // one small blocking write per interval
        let reading = self.readings.save(new_reading)?;
        debug!("Auto reading stored: {} {}", reading.value, reading.unit);
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(AppEvent::ReadingReceived(reading));
        }
        Ok(())
    }

    // Called from inside the polling task; leaves a newer session untouched.
    fn halt(&self, generation: u64) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.generation == generation {
            state.active = false;
            state.task = None;
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if state.active {
            info!("Auto reading stopped");
        }
        state.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.active)
            .unwrap_or(false)
    }

    /// Type being polled, if active
    pub fn current_reading_type(&self) -> Option<ReadingType> {
        let state = self.state.lock().ok()?;
        state.active.then_some(state.reading_type).flatten()
    }
}
