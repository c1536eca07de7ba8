use crate::infrastructure::bluetooth::protocol::ProtocolError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BluetoothError {
    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("No Bluetooth adapter available")]
    NoAdapter,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Service {0} not found on device")]
    ServiceNotFound(Uuid),

    #[error("Characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),

    #[error("Failed to enable notifications after {0} attempts")]
    SubscribeFailed(u32),

    #[error("No device connected")]
    NotConnected,

    #[error("Lock error")]
    Lock,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
