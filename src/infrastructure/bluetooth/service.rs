//! Bluetooth Service Module
//!
//! Connection manager that coordinates scanning, connection and reading
//! ingestion for the glucose sensor.

use crate::domain::models::{
    AppEvent, ConnectionStatus, Device, MessageSeverity, NewReading, Reading, StatusMessage,
};
use crate::domain::settings::{PayloadFormat, SettingsService};
use crate::infrastructure::bluetooth::{
    connection::{BleConnection, ConnectionConfig},
    error::BluetoothError,
    listeners::{DeviceListeners, ListenerId},
    protocol,
    scanner::BleScanner,
};
use crate::infrastructure::readings::ReadingsRepository;
use btleplug::api::{Central as _, Characteristic, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, Peripheral};
use chrono::Utc;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct ActiveConnection {
    peripheral: Peripheral,
    characteristic: Characteristic,
    device: Device,
    payload_format: PayloadFormat,
    notification_task: JoinHandle<()>,
    // cleared by the notification task when the stream ends
    alive: Arc<AtomicBool>,
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mark the session over and announce it, unless that already happened
///
/// Both the notification task and `disconnect` end sessions; only the first
/// caller notifies listeners and sends `Disconnected`.
fn end_session(
    alive: &AtomicBool,
    listeners: &DeviceListeners,
    sender: &mpsc::UnboundedSender<AppEvent>,
) -> bool {
    if !alive.swap(false, Ordering::SeqCst) {
        return false;
    }
    listeners.notify(None);
    let _ = sender.send(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
    true
}

/// Decode one notification, persist it and announce it
///
/// Failures are logged and reported as log events; they never end the session.
/// Saving writes to the store synchronously, so async callers should run this
/// on a blocking thread.
pub fn ingest_notification(
    value: &[u8],
    format: PayloadFormat,
    readings: &ReadingsRepository,
    sender: &mpsc::UnboundedSender<AppEvent>,
) -> Option<Reading> {
    let new_reading = match protocol::parse_payload(value, format, Utc::now()) {
        Ok(reading) => reading,
        Err(e) => {
            warn!("Ignoring sensor notification: {}", e);
            let _ = sender.send(AppEvent::LogMessage(StatusMessage::new(
                format!("Unreadable sensor data: {e}"),
                MessageSeverity::Warning,
            )));
            return None;
        }
    };

    match readings.save(new_reading) {
        Ok(reading) => {
            info!(
                "Received {} reading: {} {}",
                reading.reading_type, reading.value, reading.unit
            );
            let _ = sender.send(AppEvent::ReadingReceived(reading.clone()));
            Some(reading)
        }
        Err(e) => {
            error!("Failed to store sensor reading: {}", e);
            let _ = sender.send(AppEvent::LogMessage(StatusMessage::new(
                format!("Failed to store reading: {e}"),
                MessageSeverity::Error,
            )));
            None
        }
    }
}

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService {
    adapter: Option<Adapter>,
    scanner: Option<BleScanner>,
    connection: Option<ActiveConnection>,
    listeners: DeviceListeners,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: Arc<Mutex<SettingsService>>,
    readings: ReadingsRepository,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    pub fn new(
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: Arc<Mutex<SettingsService>>,
        readings: ReadingsRepository,
    ) -> Self {
        Self {
            adapter: None,
            scanner: None,
            connection: None,
            listeners: DeviceListeners::new(),
            event_sender,
            settings,
            readings,
        }
    }

    /// Resolve the first Bluetooth adapter, once
    pub async fn check_adapter(&mut self) -> Result<Adapter, BluetoothError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BluetoothError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(info) => info!("Using Bluetooth adapter: {}", info),
            Err(e) => warn!("Could not read adapter info: {}", e),
        }

        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    fn connection_config(&self) -> Result<(ConnectionConfig, bool), BluetoothError> {
        let settings = self.settings.lock().map_err(|_| BluetoothError::Lock)?;
        let s = settings.get();
        Ok((ConnectionConfig::from_settings(s)?, s.debug_show_all_devices))
    }

    /// Start scanning for devices
    pub async fn start_scan(&mut self) -> Result<(), BluetoothError> {
        let (config, show_all) = self.connection_config()?;
        let adapter = self.check_adapter().await?;

        let scanner = self.scanner.get_or_insert_with(|| {
            BleScanner::new(adapter, self.event_sender.clone(), self.listeners.clone())
        });
        scanner.start(config.service_uuid, show_all).await
    }

    /// Stop scanning
    pub async fn stop_scan(&mut self) -> Result<(), BluetoothError> {
        match self.scanner.as_mut() {
            Some(scanner) => scanner.stop().await,
            None => Ok(()),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.as_ref().is_some_and(BleScanner::is_scanning)
    }

    /// Devices reported by the scanner so far
    pub fn discovered_devices(&self) -> Vec<Device> {
        self.scanner
            .as_ref()
            .map(BleScanner::discovered_devices)
            .unwrap_or_default()
    }

    /// Connect to a previously discovered device by id
    pub async fn connect(&mut self, device_id: &str) -> Result<Device, BluetoothError> {
        let (config, _) = self.connection_config()?;
        let (peripheral, device) = self
            .scanner
            .as_ref()
            .and_then(|s| s.discovered(device_id))
            .ok_or_else(|| BluetoothError::DeviceNotFound(device_id.to_string()))?;

        if self.connection.is_some() {
            self.disconnect().await?;
        }
        if let Err(e) = self.stop_scan().await {
            warn!("Failed to stop scan before connecting: {}", e);
        }

        let _ = self
            .event_sender
            .send(AppEvent::ConnectionStatus(ConnectionStatus::Connecting));

        let payload_format = config.payload_format;
        let characteristic_uuid = config.characteristic_uuid;
        let raw_data_logging = config.raw_data_logging;
        let connection = BleConnection::new(self.event_sender.clone(), config);
        let result = match connection.connect(peripheral.clone(), device).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error connecting to device: {}", e);
                let _ = peripheral.disconnect().await;
                let _ = self
                    .event_sender
                    .send(AppEvent::ConnectionStatus(ConnectionStatus::Error));
                return Err(e);
            }
        };

        let mut notifications = result.peripheral.notifications().await?;
        let alive = Arc::new(AtomicBool::new(true));
        let task_alive = alive.clone();
        let readings = self.readings.clone();
        let sender = self.event_sender.clone();
        let listeners = self.listeners.clone();
        let notification_task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic_uuid {
                    continue;
                }
                if raw_data_logging {
                    debug!("Raw notification: {}", hex_dump(&notification.value));
                }

                let value = notification.value;
                let readings = readings.clone();
                let ingest_sender = sender.clone();
                let ingest = tokio::task::spawn_blocking(move || {
                    ingest_notification(&value, payload_format, &readings, &ingest_sender);
                });
                if let Err(e) = ingest.await {
                    error!("Notification handler failed: {}", e);
                }
            }

            info!("Notification stream closed");
            end_session(&task_alive, &listeners, &sender);
        });

        let device = result.device.clone();
        self.connection = Some(ActiveConnection {
            peripheral: result.peripheral,
            characteristic: result.characteristic,
            device: result.device,
            payload_format,
            notification_task,
            alive,
        });

        self.listeners.notify(Some(&device));
        let _ = self
            .event_sender
            .send(AppEvent::ConnectionStatus(ConnectionStatus::Connected));

        Ok(device)
    }

    /// Disconnect from the current device
    pub async fn disconnect(&mut self) -> Result<(), BluetoothError> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };

        connection.notification_task.abort();
        let result = connection.peripheral.disconnect().await;

        info!("Disconnected from device {}", connection.device.name);
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            "Disconnected from device",
            MessageSeverity::Info,
        )));
        // the notification task may have announced it already
        end_session(&connection.alive, &self.listeners, &self.event_sender);

        result.map_err(BluetoothError::from)
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.alive.load(Ordering::SeqCst))
    }

    pub fn connected_device(&self) -> Option<Device> {
        self.connection
            .as_ref()
            .filter(|c| c.alive.load(Ordering::SeqCst))
            .map(|c| c.device.clone())
    }

    /// Read the characteristic value directly rather than waiting for a notification
    pub async fn read_once(&self) -> Result<NewReading, BluetoothError> {
        let connection = self
            .connection
            .as_ref()
            .filter(|c| c.alive.load(Ordering::SeqCst))
            .ok_or(BluetoothError::NotConnected)?;

        let value = connection
            .peripheral
            .read(&connection.characteristic)
            .await?;
        Ok(protocol::parse_payload(
            &value,
            connection.payload_format,
            Utc::now(),
        )?)
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Option<&Device>) + Send + Sync + 'static,
    {
        let id = self.listeners.add(listener);
        debug!("{} device listener(s) registered", self.listeners.len());
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
