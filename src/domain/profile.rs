//! User-entered profile, thresholds and display preferences.
//!
//! These mirror what the settings forms capture: numeric fields are kept as the
//! strings the user typed, with parsed views for the code that needs numbers.

use crate::domain::models::{GlucoseUnit, ReadingType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub age: String,
    /// Kilograms
    pub weight: String,
    /// Centimetres
    pub height: String,
    pub gender: Gender,
}

impl Profile {
    pub fn weight_kg(&self) -> f64 {
        parse_or(&self.weight, 0.0)
    }

    pub fn height_cm(&self) -> f64 {
        parse_or(&self.height, 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub blood_low: String,
    pub blood_high: String,
    pub urine_low: String,
    pub urine_high: String,
}

pub const DEFAULT_BLOOD_LOW: f64 = 70.0;
pub const DEFAULT_BLOOD_HIGH: f64 = 140.0;
pub const DEFAULT_URINE_LOW: f64 = 0.0;
pub const DEFAULT_URINE_HIGH: f64 = 15.0;

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            blood_low: "70".to_string(),
            blood_high: "140".to_string(),
            urine_low: "0".to_string(),
            urine_high: "15".to_string(),
        }
    }
}

/// Numeric bounds for one reading type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

/// Numeric view of [`Thresholds`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdLimits {
    pub blood: Range,
    pub urine: Range,
}

impl ThresholdLimits {
    pub fn for_type(&self, reading_type: ReadingType) -> Range {
        match reading_type {
            ReadingType::Blood => self.blood,
            ReadingType::Urine => self.urine,
        }
    }
}

impl Default for ThresholdLimits {
    fn default() -> Self {
        Thresholds::default().limits()
    }
}

impl Thresholds {
    /// Fields that do not parse fall back to their default bound.
    pub fn limits(&self) -> ThresholdLimits {
        ThresholdLimits {
            blood: Range {
                low: parse_or(&self.blood_low, DEFAULT_BLOOD_LOW),
                high: parse_or(&self.blood_high, DEFAULT_BLOOD_HIGH),
            },
            urine: Range {
                low: parse_or(&self.urine_low, DEFAULT_URINE_LOW),
                high: parse_or(&self.urine_high, DEFAULT_URINE_HIGH),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub unit: GlucoseUnit,
    pub notifications: bool,
    pub dark_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            unit: GlucoseUnit::MgDl,
            notifications: true,
            dark_mode: false,
        }
    }
}

fn parse_or(raw: &str, fallback: f64) -> f64 {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_json_uses_camel_case() {
        let json = serde_json::to_value(Thresholds::default()).unwrap();
        assert_eq!(json["bloodLow"], "70");
        assert_eq!(json["urineHigh"], "15");
    }

    #[test]
    fn test_limits_fall_back_per_field() {
        let thresholds = Thresholds {
            blood_low: "65".to_string(),
            blood_high: "".to_string(),
            urine_low: "abc".to_string(),
            urine_high: "20,5".to_string(),
        };
        let limits = thresholds.limits();
        assert_eq!(limits.blood.low, 65.0);
        assert_eq!(limits.blood.high, DEFAULT_BLOOD_HIGH);
        assert_eq!(limits.urine.low, DEFAULT_URINE_LOW);
        assert_eq!(limits.urine.high, 20.5);
    }

    #[test]
    fn test_profile_numeric_views() {
        let profile = Profile {
            age: "42".to_string(),
            weight: " 72.5 ".to_string(),
            height: "".to_string(),
            gender: Gender::Female,
        };
        assert_eq!(profile.weight_kg(), 72.5);
        assert_eq!(profile.height_cm(), 0.0);
    }

    #[test]
    fn test_preferences_roundtrip_keys() {
        let json = r#"{"unit":"mmol/L","notifications":false,"darkMode":true}"#;
        let prefs: Preferences = serde_json::from_str(json).unwrap();
        assert_eq!(prefs.unit, GlucoseUnit::MmolL);
        assert!(prefs.dark_mode);
    }
}
