//! BLE Connection Module
//!
//! Handles device connection, GATT discovery and notification subscription.

use crate::domain::models::{AppEvent, Device, MessageSeverity, StatusMessage};
use crate::domain::settings::{PayloadFormat, Settings};
use crate::infrastructure::bluetooth::error::BluetoothError;
use crate::infrastructure::bluetooth::protocol;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, Service};
use btleplug::platform::Peripheral;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service UUID to look for
    pub service_uuid: Uuid,
    /// Glucose measurement characteristic UUID
    pub characteristic_uuid: Uuid,
    pub payload_format: PayloadFormat,
    /// Subscription attempts before giving up
    pub subscribe_max_attempts: u32,
    pub subscribe_retry_delay: Duration,
    /// Log every notification payload as hex
    pub raw_data_logging: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_uuid: protocol::GLUCOSE_SERVICE_UUID,
            characteristic_uuid: protocol::GLUCOSE_MEASUREMENT_UUID,
            payload_format: PayloadFormat::default(),
            subscribe_max_attempts: 3,
            subscribe_retry_delay: Duration::from_millis(1000),
            raw_data_logging: false,
        }
    }
}

impl ConnectionConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, BluetoothError> {
        Ok(Self {
            service_uuid: protocol::parse_uuid(&settings.ble_service_uuid)?,
            characteristic_uuid: protocol::parse_uuid(&settings.ble_characteristic_uuid)?,
            payload_format: settings.payload_format,
            subscribe_max_attempts: settings.subscribe_max_attempts.max(1),
            subscribe_retry_delay: settings.subscribe_retry_delay(),
            raw_data_logging: settings.debug_raw_data_logging,
        })
    }
}

/// Result of a successful connection
pub struct ConnectionResult {
    pub peripheral: Peripheral,
    pub characteristic: Characteristic,
    pub device: Device,
}

/// Locate `characteristic_uuid` inside `service_uuid`
pub fn find_characteristic(
    services: &BTreeSet<Service>,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
) -> Result<Characteristic, BluetoothError> {
    let service = services
        .iter()
        .find(|s| s.uuid == service_uuid)
        .ok_or(BluetoothError::ServiceNotFound(service_uuid))?;

    info!(
        "Found glucose service with {} characteristics",
        service.characteristics.len()
    );

    service
        .characteristics
        .iter()
        .find(|c| c.uuid == characteristic_uuid)
        .cloned()
        .ok_or(BluetoothError::CharacteristicNotFound(characteristic_uuid))
}

/// BLE Connection handler
pub struct BleConnection {
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: ConnectionConfig,
}

impl BleConnection {
    /// Create a new connection handler
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>, config: ConnectionConfig) -> Self {
        Self {
            event_sender,
            config,
        }
    }

    /// Connect, discover the glucose characteristic and subscribe to it
    pub async fn connect(
        &self,
        peripheral: Peripheral,
        mut device: Device,
    ) -> Result<ConnectionResult, BluetoothError> {
        info!("Connecting to Bluetooth device: {} ({})", device.name, device.id);
        self.send_log("Connecting to device...", MessageSeverity::Info);

        // Step 1: Connect
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        info!("Device connected");

        // Step 2: Discover services and characteristics
        peripheral.discover_services().await?;
        let characteristic = find_characteristic(
            &peripheral.services(),
            self.config.service_uuid,
            self.config.characteristic_uuid,
        )?;

        // Step 3: Subscribe to notifications
        self.enable_notifications(&peripheral, &characteristic)
            .await?;

        device.connected = true;
        device.service_uuid = Some(self.config.service_uuid.to_string());
        device.characteristic_uuid = Some(characteristic.uuid.to_string());

        Ok(ConnectionResult {
            peripheral,
            characteristic,
            device,
        })
    }

    /// Subscribe to the characteristic with retry logic
    async fn enable_notifications(
        &self,
        peripheral: &Peripheral,
        characteristic: &Characteristic,
    ) -> Result<(), BluetoothError> {
        info!("Enabling notifications...");

        if !characteristic
            .properties
            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
        {
            warn!(
                "Characteristic {} does not advertise notify/indicate ({:?})",
                characteristic.uuid, characteristic.properties
            );
        }

        let attempts = self.config.subscribe_max_attempts;
        for attempt in 1..=attempts {
            match peripheral.subscribe(characteristic).await {
                Ok(()) => {
                    info!("Notifications enabled successfully");
                    self.send_log("Connection established!", MessageSeverity::Success);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Notification subscription attempt {} failed: {}", attempt, e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.subscribe_retry_delay).await;
                    }
                }
            }
        }

        error!("Failed to enable notifications after {} attempts", attempts);
        Err(BluetoothError::SubscribeFailed(attempts))
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::{
        GLUCOSE_MEASUREMENT_UUID, GLUCOSE_SERVICE_UUID,
    };

    fn characteristic(uuid: Uuid, service_uuid: Uuid) -> Characteristic {
        Characteristic {
            uuid,
            service_uuid,
            properties: CharPropFlags::NOTIFY,
            descriptors: BTreeSet::new(),
        }
    }

    fn glucose_services() -> BTreeSet<Service> {
        let mut characteristics = BTreeSet::new();
        characteristics.insert(characteristic(GLUCOSE_MEASUREMENT_UUID, GLUCOSE_SERVICE_UUID));
        characteristics.insert(characteristic(
            protocol::uuid_from_short(0x2A52),
            GLUCOSE_SERVICE_UUID,
        ));

        let mut services = BTreeSet::new();
        services.insert(Service {
            uuid: GLUCOSE_SERVICE_UUID,
            primary: true,
            characteristics,
        });
        services
    }

    #[test]
    fn test_find_characteristic() {
        let found = find_characteristic(
            &glucose_services(),
            GLUCOSE_SERVICE_UUID,
            GLUCOSE_MEASUREMENT_UUID,
        )
        .unwrap();
        assert_eq!(found.uuid, GLUCOSE_MEASUREMENT_UUID);
    }

    #[test]
    fn test_missing_service_or_characteristic() {
        let services = glucose_services();
        let heart_rate = protocol::uuid_from_short(0x180D);
        assert!(matches!(
            find_characteristic(&services, heart_rate, GLUCOSE_MEASUREMENT_UUID),
            Err(BluetoothError::ServiceNotFound(uuid)) if uuid == heart_rate
        ));
        assert!(matches!(
            find_characteristic(&services, GLUCOSE_SERVICE_UUID, heart_rate),
            Err(BluetoothError::CharacteristicNotFound(_))
        ));
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.ble_service_uuid = "1808".to_string();
        settings.subscribe_max_attempts = 0;
        let config = ConnectionConfig::from_settings(&settings).unwrap();
        assert_eq!(config.service_uuid, GLUCOSE_SERVICE_UUID);
        assert_eq!(config.characteristic_uuid, GLUCOSE_MEASUREMENT_UUID);
        assert_eq!(config.subscribe_max_attempts, 1);

        settings.ble_characteristic_uuid = "YOUR_CHARACTERISTIC_UUID".to_string();
        assert!(matches!(
            ConnectionConfig::from_settings(&settings),
            Err(BluetoothError::Protocol(_))
        ));
    }
}
