//! BLE Scanner Module
//!
//! Handles Bluetooth LE discovery of glucose sensors.

use crate::domain::models::{AppEvent, ConnectionStatus, Device, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::error::BluetoothError;
use crate::infrastructure::bluetooth::listeners::DeviceListeners;
use btleplug::api::{Central, CentralEvent, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

type DiscoveredMap = Arc<Mutex<HashMap<String, (Peripheral, Device)>>>;

/// Device ids already reported during the current scan
#[derive(Debug, Default)]
pub struct ScanSightings {
    seen: HashSet<String>,
}

impl ScanSightings {
    /// Forget every sighting so the next scan reports devices again
    pub fn begin_scan(&mut self) {
        self.seen.clear();
    }

    /// `true` the first time `id` is seen in this scan
    pub fn first_sighting(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }
}

/// BLE Scanner for discovering glucose sensors
pub struct BleScanner {
    adapter: Adapter,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    listeners: DeviceListeners,
    discovered: DiscoveredMap,
    sightings: Arc<Mutex<ScanSightings>>,
    task: Option<JoinHandle<()>>,
}

/// Build the application view of an advertising peripheral
pub fn device_from_properties(id: String, props: &PeripheralProperties) -> Device {
    let name = props
        .local_name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Device {
        id,
        name,
        connected: false,
        service_uuid: props.services.first().map(Uuid::to_string),
        characteristic_uuid: None,
    }
}

/// Whether an advertisement should be reported to listeners
pub fn advertises_service(
    props: &PeripheralProperties,
    service_uuid: Uuid,
    show_all: bool,
) -> bool {
    show_all || props.services.contains(&service_uuid)
}

impl BleScanner {
    /// Create a new scanner
    pub fn new(
        adapter: Adapter,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        listeners: DeviceListeners,
    ) -> Self {
        Self {
            adapter,
            event_sender,
            listeners,
            discovered: Arc::new(Mutex::new(HashMap::new())),
            sightings: Arc::new(Mutex::new(ScanSightings::default())),
            task: None,
        }
    }

    /// Start scanning for BLE devices
    ///
    /// # Arguments
    /// * `service_uuid` - The service UUID to filter for
    /// * `show_all_devices` - If true, report every BLE device regardless of service UUID
    pub async fn start(
        &mut self,
        service_uuid: Uuid,
        show_all_devices: bool,
    ) -> Result<(), BluetoothError> {
        if self.is_scanning() {
            debug!("Scan already running");
            return Ok(());
        }

        info!("Starting BLE scan for service UUID: {}", service_uuid);
        self.send_log("Scanning for glucose sensors...", MessageSeverity::Info);

        self.sightings
            .lock()
            .map_err(|_| BluetoothError::Lock)?
            .begin_scan();

        let mut events = self.adapter.events().await?;
        let filter = if show_all_devices {
            ScanFilter::default()
        } else {
            ScanFilter {
                services: vec![service_uuid],
            }
        };
        self.adapter.start_scan(filter).await?;
        let _ = self
            .event_sender
            .send(AppEvent::ConnectionStatus(ConnectionStatus::Scanning));

        let adapter = self.adapter.clone();
        let sender = self.event_sender.clone();
        let listeners = self.listeners.clone();
        let discovered = self.discovered.clone();
        let sightings = self.sightings.clone();

        self.task = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                if let Err(e) = Self::handle_discovery(
                    &adapter,
                    &id,
                    service_uuid,
                    show_all_devices,
                    &discovered,
                    &sightings,
                    &sender,
                    &listeners,
                )
                .await
                {
                    warn!("Failed to inspect discovered peripheral: {}", e);
                }
            }

            warn!("Adapter event stream ended, stopping scan");
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        }));

        Ok(())
    }

    async fn handle_discovery(
        adapter: &Adapter,
        id: &PeripheralId,
        service_uuid: Uuid,
        show_all_devices: bool,
        discovered: &DiscoveredMap,
        sightings: &Mutex<ScanSightings>,
        sender: &mpsc::UnboundedSender<AppEvent>,
        listeners: &DeviceListeners,
    ) -> Result<(), BluetoothError> {
        let peripheral = adapter.peripheral(id).await?;
        let Some(props) = peripheral.properties().await? else {
            return Ok(());
        };

        if !advertises_service(&props, service_uuid, show_all_devices) {
            return Ok(());
        }

        let key = peripheral.address().to_string();
        let device = device_from_properties(key.clone(), &props);
        if !sightings
            .lock()
            .map_err(|_| BluetoothError::Lock)?
            .first_sighting(&key)
        {
            return Ok(());
        }
        discovered
            .lock()
            .map_err(|_| BluetoothError::Lock)?
            .insert(key, (peripheral, device.clone()));

        info!(
            "Found device {} ({}) rssi={:?}",
            device.name, device.id, props.rssi
        );
        listeners.notify(Some(&device));
        let _ = sender.send(AppEvent::DeviceFound(device));
        Ok(())
    }

    /// Stop scanning
    pub async fn stop(&mut self) -> Result<(), BluetoothError> {
        if let Some(task) = self.task.take() {
            info!("Stopping BLE scan...");
            task.abort();
            self.send_log("Scan stopped.", MessageSeverity::Info);
            self.adapter.stop_scan().await?;
        }
        Ok(())
    }

    /// Check if currently scanning
    pub fn is_scanning(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Peripheral and device view previously reported under `device_id`
    pub fn discovered(&self, device_id: &str) -> Option<(Peripheral, Device)> {
        self.discovered.lock().ok()?.get(device_id).cloned()
    }

    pub fn discovered_devices(&self) -> Vec<Device> {
        self.discovered
            .lock()
            .map(|map| map.values().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::GLUCOSE_SERVICE_UUID;

    fn props(name: Option<&str>, services: Vec<Uuid>) -> PeripheralProperties {
        PeripheralProperties {
            local_name: name.map(str::to_string),
            services,
            ..PeripheralProperties::default()
        }
    }

    #[test]
    fn test_device_from_properties() {
        let device = device_from_properties(
            "AA:BB:CC:DD:EE:FF".to_string(),
            &props(Some("GlucoSense"), vec![GLUCOSE_SERVICE_UUID]),
        );
        assert_eq!(device.name, "GlucoSense");
        assert!(!device.connected);
        assert_eq!(
            device.service_uuid.as_deref(),
            Some("00001808-0000-1000-8000-00805f9b34fb")
        );

        let unnamed = device_from_properties("x".to_string(), &props(Some(""), vec![]));
        assert_eq!(unnamed.name, "Unknown");
        assert_eq!(unnamed.service_uuid, None);
    }

    #[test]
    fn test_sightings_reset_per_scan() {
        let mut sightings = ScanSightings::default();
        sightings.begin_scan();
        assert!(sightings.first_sighting("AA:BB:CC:DD:EE:FF"));
        assert!(!sightings.first_sighting("AA:BB:CC:DD:EE:FF"));
        assert!(sightings.first_sighting("11:22:33:44:55:66"));

        // a restarted scan reports the same device again
        sightings.begin_scan();
        assert!(sightings.first_sighting("AA:BB:CC:DD:EE:FF"));
        assert!(!sightings.first_sighting("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_advertises_service() {
        let glucose = props(None, vec![GLUCOSE_SERVICE_UUID]);
        let other = props(None, vec![Uuid::nil()]);
        assert!(advertises_service(&glucose, GLUCOSE_SERVICE_UUID, false));
        assert!(!advertises_service(&other, GLUCOSE_SERVICE_UUID, false));
        assert!(advertises_service(&other, GLUCOSE_SERVICE_UUID, true));
    }
}
