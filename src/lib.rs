//! Glucose tracking over Bluetooth LE
//!
//! Readings arrive from a BLE glucose sensor (or a simulated one), are
//! persisted to a local key-value store and summarised against the user's
//! thresholds.

pub mod domain;
pub mod infrastructure;
