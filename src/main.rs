use anyhow::Context;
use glucose_tracker::domain::health::{self, BmiCategory, GlucoseStatus};
use glucose_tracker::domain::models::{
    AppEvent, Device, GlucoseUnit, MessageSeverity, Reading, ReadingType,
};
use glucose_tracker::domain::profile::ThresholdLimits;
use glucose_tracker::domain::settings::{Settings, SettingsService};
use glucose_tracker::infrastructure::auto_reading::{
    AutoReadingService, BleSensor, ReadingSource, SimulatedSensor,
};
use glucose_tracker::infrastructure::bluetooth::BluetoothService;
use glucose_tracker::infrastructure::logging::init_logger;
use glucose_tracker::infrastructure::preferences::PreferencesStore;
use glucose_tracker::infrastructure::readings::{ReadingFilter, ReadingsRepository};
use glucose_tracker::infrastructure::storage::FileStore;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const USAGE: &str = "usage: glucose-tracker \
    [monitor | poll [blood|urine] | simulate [blood|urine] | stats | delete <id>]";

enum Command {
    /// Store readings pushed by the sensor
    Monitor,
    /// Timer-driven readings; the source follows `auto_reading_simulated`
    Poll(ReadingType),
    /// Timer-driven readings from the simulated sensor
    Simulate(ReadingType),
    Stats,
    /// Remove one stored reading
    Delete(String),
}

fn parse_reading_type(arg: Option<&String>) -> anyhow::Result<ReadingType> {
    match arg.map(String::as_str) {
        None | Some("blood") => Ok(ReadingType::Blood),
        Some("urine") => Ok(ReadingType::Urine),
        Some(other) => anyhow::bail!("unknown reading type {other:?}\n{USAGE}"),
    }
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        None | Some("monitor") => Ok(Command::Monitor),
        Some("stats") => Ok(Command::Stats),
        Some("poll") => parse_reading_type(args.get(1)).map(Command::Poll),
        Some("simulate") => parse_reading_type(args.get(1)).map(Command::Simulate),
        Some("delete") => match args.get(1) {
            Some(id) => Ok(Command::Delete(id.clone())),
            None => anyhow::bail!("delete needs a reading id\n{USAGE}"),
        },
        Some(other) => anyhow::bail!("unknown command {other:?}\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();
    let _log_guard = init_logger(&settings.log_settings)?;
    info!("Starting Glucose Tracker");

    // write back so fields added since the file was created show up in it
    if let Err(e) = settings_service.save() {
        warn!("Failed to save settings: {}", e);
    }

    let data_dir = settings_service.data_dir()?;
    let store = Arc::new(
        FileStore::open(&data_dir)
            .with_context(|| format!("opening data directory {}", data_dir.display()))?,
    );
    let readings = ReadingsRepository::new(store.clone());
    let preferences = PreferencesStore::new(store);
    let settings_service = Arc::new(Mutex::new(settings_service));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (reading_type, simulated) = match command {
        Command::Stats => {
            print_report(&readings, &preferences);
            return Ok(());
        }
        Command::Delete(id) => {
            return delete_reading(&readings, &id);
        }
        Command::Monitor => {
            let bluetooth =
                connect_sensor(&settings, settings_service, readings, tx, &mut rx).await?;
            run_event_loop(rx, &preferences).await;
            disconnect(&bluetooth).await;
            return Ok(());
        }
        Command::Poll(reading_type) => (reading_type, settings.auto_reading_simulated),
        Command::Simulate(reading_type) => (reading_type, true),
    };

    let mut bluetooth = None;
    let source: Arc<dyn ReadingSource> = if simulated {
        Arc::new(SimulatedSensor::new(settings.simulated_delay()))
    } else {
        let connected = connect_sensor(
            &settings,
            settings_service,
            readings.clone(),
            tx.clone(),
            &mut rx,
        )
        .await?;
        bluetooth = Some(connected.clone());
        Arc::new(BleSensor::new(connected))
    };

    let poller = AutoReadingService::new(source, readings, settings.auto_reading_interval())
        .with_events(tx);
    poller.start(reading_type).await?;
    run_event_loop(rx, &preferences).await;
    if let Some(reading_type) = poller.current_reading_type() {
        info!("Stopping {} auto reading", reading_type);
    }
    poller.stop();

    if let Some(bluetooth) = bluetooth {
        disconnect(&bluetooth).await;
    }
    Ok(())
}

/// Scan for the sensor and connect to it
async fn connect_sensor(
    settings: &Settings,
    settings_service: Arc<Mutex<SettingsService>>,
    readings: ReadingsRepository,
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: &mut mpsc::UnboundedReceiver<AppEvent>,
) -> anyhow::Result<Arc<tokio::sync::Mutex<BluetoothService>>> {
    let bluetooth = Arc::new(tokio::sync::Mutex::new(BluetoothService::new(
        tx,
        settings_service,
        readings,
    )));

    bluetooth.lock().await.start_scan().await?;
    let device = match wait_for_device(
        rx,
        settings.preferred_device_name.as_deref(),
        settings.scan_duration(),
    )
    .await
    {
        Some(device) => device,
        None => {
            let mut service = bluetooth.lock().await;
            warn!(
                "Scan ended with {} device(s) discovered",
                service.discovered_devices().len()
            );
            service.stop_scan().await?;
            anyhow::bail!("No glucose sensor found");
        }
    };

    bluetooth.lock().await.connect(&device.id).await?;
    Ok(bluetooth)
}

async fn disconnect(bluetooth: &tokio::sync::Mutex<BluetoothService>) {
    if let Err(e) = bluetooth.lock().await.disconnect().await {
        warn!("Error disconnecting device: {}", e);
    }
}

/// Wait for a discovered device, preferring one whose name contains `preferred`
async fn wait_for_device(
    rx: &mut mpsc::UnboundedReceiver<AppEvent>,
    preferred: Option<&str>,
    timeout: std::time::Duration,
) -> Option<Device> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut fallback = None;

    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(AppEvent::DeviceFound(device))) => {
                let wanted = preferred.map_or(true, |p| {
                    device.name.to_lowercase().contains(&p.to_lowercase())
                });
                if wanted {
                    return Some(device);
                }
                fallback.get_or_insert(device);
            }
            Ok(Some(event)) => log_event(&event),
            Ok(None) | Err(_) => return fallback,
        }
    }
}

async fn run_event_loop(mut rx: mpsc::UnboundedReceiver<AppEvent>, preferences: &PreferencesStore) {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(AppEvent::ReadingReceived(reading)) => report_reading(&reading, preferences),
                Some(event) => log_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }
}

fn log_event(event: &AppEvent) {
    match event {
        AppEvent::LogMessage(msg) => match msg.severity {
            MessageSeverity::Error => error!("{}", msg.message),
            MessageSeverity::Warning => warn!("{}", msg.message),
            MessageSeverity::Info | MessageSeverity::Success => info!("{}", msg.message),
        },
        AppEvent::ConnectionStatus(status) => info!("Connection status: {:?}", status),
        AppEvent::DeviceFound(device) => info!("Device found: {} ({})", device.name, device.id),
        AppEvent::ReadingReceived(reading) => info!("Reading {}: {}", reading.id, reading.value),
    }
}

fn report_reading(reading: &Reading, preferences: &PreferencesStore) {
    let limits = preferences
        .get_thresholds()
        .map(|t| t.limits())
        .unwrap_or_default();
    let preferred = preferences.get_preferences().unwrap_or_default().unit;

    // thresholds are expressed in mg/dL
    let Some(unit) = GlucoseUnit::from_label(&reading.unit) else {
        info!(
            "{} glucose: {} {} (unknown unit, not classified)",
            reading.reading_type, reading.value, reading.unit
        );
        return;
    };
    let mg_dl = health::to_unit(reading.value, unit, GlucoseUnit::MgDl);
    let status = GlucoseStatus::classify(reading.reading_type, mg_dl, &limits);
    info!(
        "{} glucose: {} {} ({:?})",
        reading.reading_type,
        health::to_unit(reading.value, unit, preferred),
        preferred,
        status
    );
}

fn delete_reading(readings: &ReadingsRepository, id: &str) -> anyhow::Result<()> {
    let Some(reading) = readings.get_by_id(id) else {
        anyhow::bail!("No reading with id {id}");
    };
    if !readings.delete(id) {
        anyhow::bail!("Failed to delete reading {id}");
    }
    println!(
        "Deleted {} reading {} {} from {}",
        reading.reading_type, reading.value, reading.unit, reading.timestamp
    );
    Ok(())
}

fn print_report(readings: &ReadingsRepository, preferences: &PreferencesStore) {
    let limits: ThresholdLimits = preferences
        .get_thresholds()
        .map(|t| t.limits())
        .unwrap_or_default();

    for reading_type in [ReadingType::Blood, ReadingType::Urine] {
        let filter = ReadingFilter::of_type(reading_type);
        let stats = readings.statistics(&filter);
        let range = limits.for_type(reading_type);
        println!(
            "{:<6} count={:<4} avg={:.1} min={} max={}  (normal {}-{})",
            reading_type, stats.count, stats.avg, stats.min, stats.max, range.low, range.high
        );
    }

    if let Some(profile) = preferences.get_profile() {
        let bmi = health::calculate_bmi(profile.weight_kg(), profile.height_cm());
        println!(
            "BMI    {:.1} ({}) at {:.0}% of the scale",
            bmi,
            BmiCategory::from_bmi(bmi),
            health::bmi_scale_position(bmi)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_command() {
        assert!(matches!(parse_command(&args(&[])), Ok(Command::Monitor)));
        assert!(matches!(parse_command(&args(&["stats"])), Ok(Command::Stats)));
        assert!(matches!(
            parse_command(&args(&["simulate", "urine"])),
            Ok(Command::Simulate(ReadingType::Urine))
        ));
        assert!(matches!(
            parse_command(&args(&["simulate"])),
            Ok(Command::Simulate(ReadingType::Blood))
        ));
        assert!(matches!(
            parse_command(&args(&["poll", "blood"])),
            Ok(Command::Poll(ReadingType::Blood))
        ));
        assert!(parse_command(&args(&["poll", "saliva"])).is_err());
        assert!(matches!(
            parse_command(&args(&["delete", "1700000000000"])),
            Ok(Command::Delete(id)) if id == "1700000000000"
        ));
        assert!(parse_command(&args(&["delete"])).is_err());
        assert!(parse_command(&args(&["simulate", "saliva"])).is_err());
        assert!(parse_command(&args(&["frobnicate"])).is_err());
    }

    #[test]
    fn test_delete_reading() {
        use glucose_tracker::domain::models::NewReading;
        use glucose_tracker::infrastructure::storage::MemoryStore;

        let readings = ReadingsRepository::new(Arc::new(MemoryStore::new()));
        let saved = readings
            .save(NewReading {
                reading_type: ReadingType::Blood,
                value: 104.0,
                unit: "mg/dL".to_string(),
                timestamp: chrono::Utc::now(),
            })
            .unwrap();

        delete_reading(&readings, &saved.id).unwrap();
        assert!(readings.get_by_id(&saved.id).is_none());
        assert!(delete_reading(&readings, &saved.id).is_err());
    }

    #[tokio::test]
    async fn test_wait_for_device_prefers_name() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in ["Thermo", "GlucoSense 42"] {
            tx.send(AppEvent::DeviceFound(Device {
                id: name.to_string(),
                name: name.to_string(),
                ..Device::default()
            }))
            .unwrap();
        }

        let device = wait_for_device(
            &mut rx,
            Some("glucosense"),
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert_eq!(device.name, "GlucoSense 42");
    }

    #[tokio::test]
    async fn test_wait_for_device_falls_back_to_first() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(AppEvent::DeviceFound(Device {
            id: "1".to_string(),
            name: "Meter".to_string(),
            ..Device::default()
        }))
        .unwrap();
        drop(tx);

        let device = wait_for_device(&mut rx, Some("other"), std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(device.id, "1");
    }
}
