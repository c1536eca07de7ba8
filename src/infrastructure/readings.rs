//! Readings store.
//!
//! All readings live in one JSON array under [`READINGS_KEY`], newest first.
//! Queries are linear scans over that array.

use crate::domain::models::{NewReading, Reading, ReadingType};
use crate::domain::statistics::ReadingStatistics;
use crate::infrastructure::storage::{KeyValueStore, StorageError, READINGS_KEY};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Selection applied by [`ReadingsRepository::get_readings`]
///
/// The date range only applies when both bounds are set; both ends are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingFilter {
    /// `None` selects every type
    pub reading_type: Option<ReadingType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ReadingFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_type(reading_type: ReadingType) -> Self {
        Self {
            reading_type: Some(reading_type),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn matches(&self, reading: &Reading) -> bool {
        if let Some(reading_type) = self.reading_type {
            if reading.reading_type != reading_type {
                return false;
            }
        }
        match (self.start, self.end) {
            (Some(start), Some(end)) => reading.timestamp >= start && reading.timestamp <= end,
            _ => true,
        }
    }
}

#[derive(Clone)]
pub struct ReadingsRepository {
    store: Arc<dyn KeyValueStore>,
    // serializes read-modify-write cycles on the readings blob
    write_lock: Arc<Mutex<()>>,
}

impl ReadingsRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn load(&self) -> Result<Vec<Reading>, StorageError> {
        match self.store.get_item(READINGS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, readings: &[Reading]) -> Result<(), StorageError> {
        let json = serde_json::to_string(readings)?;
        self.store.set_item(READINGS_KEY, &json)
    }

    /// Store `reading` at the front of the history and return it with its id
    ///
    /// The id is the save time in epoch milliseconds, bumped until unique.
    /// Blocks on the store's I/O while holding the write lock.
    pub fn save(&self, reading: NewReading) -> Result<Reading, StorageError> {
        let _guard = self.write_lock.lock()?;

        let mut readings = self.load().map_err(|e| {
            error!("Error saving reading: {}", e);
            e
        })?;

        let mut id = Utc::now().timestamp_millis();
        while readings.iter().any(|r| r.id == id.to_string()) {
            id += 1;
        }

        let saved = Reading::from_new(reading, id.to_string());
        readings.insert(0, saved.clone());
        self.persist(&readings).map_err(|e| {
            error!("Error saving reading: {}", e);
            e
        })?;

        debug!(
            id = %saved.id,
            "Saved {} reading {} {}",
            saved.reading_type,
            saved.value,
            saved.unit
        );
        Ok(saved)
    }

    /// Readings matching `filter`, newest first. Storage failures yield an empty list.
    pub fn get_readings(&self, filter: &ReadingFilter) -> Vec<Reading> {
        match self.load() {
            Ok(readings) => readings.into_iter().filter(|r| filter.matches(r)).collect(),
            Err(e) => {
                error!("Error getting readings: {}", e);
                Vec::new()
            }
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<Reading> {
        self.get_readings(&ReadingFilter::all())
            .into_iter()
            .find(|r| r.id == id)
    }

    /// Remove the reading with `id`. Returns `true` whether or not it existed.
    pub fn delete(&self, id: &str) -> bool {
        let result = self
            .write_lock
            .lock()
            .map_err(StorageError::from)
            .and_then(|_guard| {
                let mut readings = self.load()?;
                readings.retain(|r| r.id != id);
                self.persist(&readings)
            });

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Error deleting reading: {}", e);
                false
            }
        }
    }

    pub fn clear_all(&self) -> bool {
        let result = self
            .write_lock
            .lock()
            .map_err(StorageError::from)
            .and_then(|_guard| self.store.remove_item(READINGS_KEY));

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Error clearing readings: {}", e);
                false
            }
        }
    }

    pub fn statistics(&self, filter: &ReadingFilter) -> ReadingStatistics {
        ReadingStatistics::from_readings(&self.get_readings(filter))
    }
}
