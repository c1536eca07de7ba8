//! Bluetooth Module
//!
//! Provides BLE communication with the glucose sensor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │  (Connection manager - public API for the application)   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌───────────┐
//! │  Scanner  │  │ Connection │  │ Protocol  │
//! │           │  │            │  │           │
//! │ - BLE     │  │ - Connect  │  │ - UUIDs   │
//! │ discovery │  │ - GATT     │  │ - Payload │
//! │           │  │ - Subscribe│  │   parsing │
//! └───────────┘  └────────────┘  └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Sensor UUIDs and payload decoding
//! - [`scanner`] - BLE device discovery
//! - [`connection`] - Device connection, service discovery and subscription
//! - [`listeners`] - Device listener set
//! - [`service`] - Connection manager, listeners and notification ingestion

pub mod connection;
pub mod error;
pub mod listeners;
pub mod protocol;
pub mod scanner;
pub mod service;

pub use error::BluetoothError;
pub use service::BluetoothService;
