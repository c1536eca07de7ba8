//! Persisted profile, thresholds and display preferences.

use crate::domain::profile::{Preferences, Profile, Thresholds};
use crate::infrastructure::storage::{
    KeyValueStore, StorageError, PREFERENCES_KEY, PROFILE_KEY, THRESHOLDS_KEY,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct PreferencesStore {
    store: Arc<dyn KeyValueStore>,
}

impl PreferencesStore {
    /// Open the store, writing defaults for any entry that is not set yet
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let prefs = Self { store };
        prefs.initialize_defaults();
        prefs
    }

    fn initialize_defaults(&self) {
        self.write_default_if_missing(PROFILE_KEY, &Profile::default());
        self.write_default_if_missing(THRESHOLDS_KEY, &Thresholds::default());
        self.write_default_if_missing(PREFERENCES_KEY, &Preferences::default());
    }

    fn write_default_if_missing<T: Serialize>(&self, key: &str, value: &T) {
        match self.store.get_item(key) {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.write(key, value) {
                    error!("Error writing default {}: {}", key, e);
                } else {
                    info!("Initialized default {}", key);
                }
            }
            Err(e) => error!("Error reading {}: {}", key, e),
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let result: Result<Option<T>, StorageError> = self.store.get_item(key).and_then(|json| {
            json.map(|json| serde_json::from_str(&json).map_err(StorageError::from))
                .transpose()
        });
        result.unwrap_or_else(|e| {
            error!("Error getting {}: {}", key, e);
            None
        })
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.store.set_item(key, &json)
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match self.write(key, value) {
            Ok(()) => true,
            Err(e) => {
                error!("Error saving {}: {}", key, e);
                false
            }
        }
    }

    pub fn get_profile(&self) -> Option<Profile> {
        self.read(PROFILE_KEY)
    }

    pub fn save_profile(&self, profile: &Profile) -> bool {
        self.save(PROFILE_KEY, profile)
    }

    pub fn get_thresholds(&self) -> Option<Thresholds> {
        self.read(THRESHOLDS_KEY)
    }

    pub fn save_thresholds(&self, thresholds: &Thresholds) -> bool {
        self.save(THRESHOLDS_KEY, thresholds)
    }

    pub fn get_preferences(&self) -> Option<Preferences> {
        self.read(PREFERENCES_KEY)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> bool {
        self.save(PREFERENCES_KEY, preferences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GlucoseUnit;
    use crate::domain::profile::Gender;
    use crate::infrastructure::storage::MemoryStore;

    #[test]
    fn test_defaults_written_on_first_open() {
        let store = Arc::new(MemoryStore::new());
        let prefs = PreferencesStore::new(store.clone());

        assert_eq!(prefs.get_profile(), Some(Profile::default()));
        assert_eq!(prefs.get_thresholds(), Some(Thresholds::default()));
        assert_eq!(prefs.get_preferences(), Some(Preferences::default()));
        assert!(store.get_item(THRESHOLDS_KEY).unwrap().is_some());
    }

    #[test]
    fn test_existing_values_are_kept() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_item(
                THRESHOLDS_KEY,
                r#"{"bloodLow":"60","bloodHigh":"180","urineLow":"0","urineHigh":"20"}"#,
            )
            .unwrap();

        let prefs = PreferencesStore::new(store);
        let thresholds = prefs.get_thresholds().unwrap();
        assert_eq!(thresholds.blood_low, "60");
        assert_eq!(thresholds.limits().blood.high, 180.0);
    }

    #[test]
    fn test_save_and_get() {
        let prefs = PreferencesStore::new(Arc::new(MemoryStore::new()));

        let profile = Profile {
            age: "35".to_string(),
            weight: "80".to_string(),
            height: "175".to_string(),
            gender: Gender::Female,
        };
        assert!(prefs.save_profile(&profile));
        assert_eq!(prefs.get_profile(), Some(profile));

        let preferences = Preferences {
            unit: GlucoseUnit::MmolL,
            notifications: false,
            dark_mode: true,
        };
        assert!(prefs.save_preferences(&preferences));
        assert_eq!(prefs.get_preferences(), Some(preferences));
    }

    #[test]
    fn test_corrupt_entry_reads_none() {
        let store = Arc::new(MemoryStore::new());
        store.set_item(PROFILE_KEY, "{broken").unwrap();
        let prefs = PreferencesStore::new(store);
        assert_eq!(prefs.get_profile(), None);
    }
}
