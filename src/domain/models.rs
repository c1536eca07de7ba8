use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of sample a reading was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingType {
    Blood,
    Urine,
}

impl ReadingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blood => "blood",
            Self::Urine => "urine",
        }
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Glucose concentration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[serde(rename = "mg/dL")]
    #[default]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl GlucoseUnit {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MgDl => "mg/dL",
            Self::MmolL => "mmol/L",
        }
    }

    /// Unit named by a stored reading's `unit` string, if recognised
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "mg/dl" => Some(Self::MgDl),
            "mmol/l" => Some(Self::MmolL),
            _ => None,
        }
    }
}

impl fmt::Display for GlucoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A reading that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    #[serde(rename = "type")]
    pub reading_type: ReadingType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// A stored glucose measurement
///
/// The serialized form matches the blob kept under the `glucose_readings`
/// key: `{ "type", "value", "unit", "timestamp", "id" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    #[serde(rename = "type")]
    pub reading_type: ReadingType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn from_new(reading: NewReading, id: String) -> Self {
        Self {
            id,
            reading_type: reading.reading_type,
            value: reading.value,
            unit: reading.unit,
            timestamp: reading.timestamp,
        }
    }
}

/// A BLE peripheral as seen by the rest of the application
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub connected: bool,
    pub service_uuid: Option<String>,
    pub characteristic_uuid: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    DeviceFound(Device),
    ConnectionStatus(ConnectionStatus),
    ReadingReceived(Reading),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
