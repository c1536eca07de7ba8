use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR_NAME: &str = "GlucoseTracker";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "glucose_tracker".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// How notification payloads from the sensor are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `[ech:sang][valeur:120][unit:mg/dL]`
    #[default]
    TagText,
    /// Little-endian u16 in the first two bytes, blood mg/dL
    U16Le,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // BLE
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_characteristic_uuid")]
    pub ble_characteristic_uuid: String,
    #[serde(default)]
    pub payload_format: PayloadFormat,
    #[serde(default = "default_false")]
    pub debug_show_all_devices: bool,
    /// Substring matched against advertised names when auto-selecting a sensor
    #[serde(default)]
    pub preferred_device_name: Option<String>,
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,
    #[serde(default = "default_subscribe_max_attempts")]
    pub subscribe_max_attempts: u32,
    #[serde(default = "default_subscribe_retry_delay_ms")]
    pub subscribe_retry_delay_ms: u64,
    #[serde(default = "default_false")]
    pub debug_raw_data_logging: bool,

    // Auto reading
    #[serde(default = "default_auto_reading_interval_secs")]
    pub auto_reading_interval_secs: u64,
    #[serde(default = "default_true")]
    pub auto_reading_simulated: bool,
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    /// Overrides the platform data directory for the readings store
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),

            ble_service_uuid: default_service_uuid(),
            ble_characteristic_uuid: default_characteristic_uuid(),
            payload_format: PayloadFormat::default(),
            debug_show_all_devices: false,
            preferred_device_name: None,
            scan_duration_secs: default_scan_duration_secs(),
            subscribe_max_attempts: default_subscribe_max_attempts(),
            subscribe_retry_delay_ms: default_subscribe_retry_delay_ms(),
            debug_raw_data_logging: false,

            auto_reading_interval_secs: default_auto_reading_interval_secs(),
            auto_reading_simulated: true,
            simulated_delay_ms: default_simulated_delay_ms(),

            data_dir: None,
        }
    }
}

impl Settings {
    pub fn auto_reading_interval(&self) -> Duration {
        Duration::from_secs(self.auto_reading_interval_secs.max(1))
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn subscribe_retry_delay(&self) -> Duration {
        Duration::from_millis(self.subscribe_retry_delay_ms)
    }
}

// Glucose Service (0x1808) / Glucose Measurement (0x2A18)
fn default_service_uuid() -> String {
    "00001808-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_characteristic_uuid() -> String {
    "00002a18-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_scan_duration_secs() -> u64 {
    10
}
fn default_subscribe_max_attempts() -> u32 {
    3
}
fn default_subscribe_retry_delay_ms() -> u64 {
    1000
}
fn default_auto_reading_interval_secs() -> u64 {
    60
}
fn default_simulated_delay_ms() -> u64 {
    3000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load settings stored at `settings_path`, falling back to defaults
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push(APP_DIR_NAME);
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Directory holding the key-value readings store
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.settings.data_dir {
            return Ok(dir.clone());
        }
        let mut path = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        path.push(APP_DIR_NAME);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = SettingsService::from_path(dir.path().join("settings.json"));
        assert_eq!(service.get().auto_reading_interval_secs, 60);
        assert_eq!(service.get().payload_format, PayloadFormat::TagText);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"auto_reading_interval_secs": 5, "payload_format": "u16_le"}"#,
        )
        .unwrap();

        let service = SettingsService::from_path(path);
        let settings = service.get();
        assert_eq!(settings.auto_reading_interval(), Duration::from_secs(5));
        assert_eq!(settings.payload_format, PayloadFormat::U16Le);
        assert_eq!(settings.ble_service_uuid, default_service_uuid());
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut service = SettingsService::from_path(path.clone());
        service.get_mut().preferred_device_name = Some("GlucoMeter".to_string());
        service.get_mut().data_dir = Some(dir.path().join("data"));
        service.save().unwrap();

        let reloaded = SettingsService::from_path(path);
        assert_eq!(
            reloaded.get().preferred_device_name.as_deref(),
            Some("GlucoMeter")
        );
        assert_eq!(reloaded.data_dir().unwrap(), dir.path().join("data"));
    }
}
