use crate::domain::models::{GlucoseUnit, ReadingType};
use crate::domain::profile::ThresholdLimits;
use std::fmt;

/// mg/dL per mmol/L for glucose
pub const MGDL_PER_MMOLL: f64 = 18.0;

/// Convert a glucose value out of `from` into the other unit.
///
/// mg/dL → mmol/L is rounded to one decimal, mmol/L → mg/dL to an integer.
pub fn convert_glucose_unit(value: f64, from: GlucoseUnit) -> f64 {
    match from {
        GlucoseUnit::MgDl => (value / MGDL_PER_MMOLL * 10.0).round() / 10.0,
        GlucoseUnit::MmolL => (value * MGDL_PER_MMOLL).round(),
    }
}

/// Express `value` (in `from`) in `to`, leaving it untouched when the units match
pub fn to_unit(value: f64, from: GlucoseUnit, to: GlucoseUnit) -> f64 {
    if from == to {
        value
    } else {
        convert_glucose_unit(value, from)
    }
}

/// Body mass index from kilograms and centimetres, 0 for non-positive input
pub fn calculate_bmi(weight_kg: f64, height_cm: f64) -> f64 {
    if weight_kg <= 0.0 || height_cm <= 0.0 {
        return 0.0;
    }
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmiCategory {
    Undetermined,
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi <= 0.0 {
            Self::Undetermined
        } else if bmi < 18.5 {
            Self::Underweight
        } else if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Overweight
        } else {
            Self::Obese
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Undetermined => "Undetermined",
            Self::Underweight => "Underweight",
            Self::Normal => "Normal weight",
            Self::Overweight => "Overweight",
            Self::Obese => "Obese",
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const BMI_SCALE_MIN: f64 = 15.0;
const BMI_SCALE_MAX: f64 = 40.0;

/// Position of `bmi` on the 15..40 gauge, as a percentage
pub fn bmi_scale_position(bmi: f64) -> f64 {
    if bmi <= 0.0 {
        return 0.0;
    }
    if bmi >= BMI_SCALE_MAX {
        return 100.0;
    }
    let position = (bmi - BMI_SCALE_MIN) / (BMI_SCALE_MAX - BMI_SCALE_MIN) * 100.0;
    position.clamp(0.0, 100.0)
}

/// Where a reading falls relative to the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseStatus {
    Low,
    Normal,
    High,
}

impl GlucoseStatus {
    /// `value` must be in the same unit as the thresholds (mg/dL).
    pub fn classify(reading_type: ReadingType, value: f64, limits: &ThresholdLimits) -> Self {
        let range = limits.for_type(reading_type);
        if value < range.low {
            Self::Low
        } else if value > range.high {
            Self::High
        } else {
            Self::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_mgdl_to_mmoll() {
        assert_eq!(convert_glucose_unit(90.0, GlucoseUnit::MgDl), 5.0);
        assert_eq!(convert_glucose_unit(100.0, GlucoseUnit::MgDl), 5.6);
    }

    #[test]
    fn test_convert_mmoll_to_mgdl() {
        assert_eq!(convert_glucose_unit(5.5, GlucoseUnit::MmolL), 99.0);
        assert_eq!(convert_glucose_unit(7.0, GlucoseUnit::MmolL), 126.0);
    }

    #[test]
    fn test_unit_roundtrip_within_tolerance() {
        for mgdl in [40.0, 70.0, 99.0, 126.0, 180.0, 250.0, 400.0] {
            let mmol = convert_glucose_unit(mgdl, GlucoseUnit::MgDl);
            let back = convert_glucose_unit(mmol, GlucoseUnit::MmolL);
            // one decimal of mmol/L is 1.8 mg/dL
            assert!((back - mgdl).abs() <= 1.0, "{mgdl} -> {mmol} -> {back}");
        }
    }

    #[test]
    fn test_to_unit_same_unit_is_identity() {
        assert_eq!(to_unit(101.0, GlucoseUnit::MgDl, GlucoseUnit::MgDl), 101.0);
        assert_eq!(to_unit(90.0, GlucoseUnit::MgDl, GlucoseUnit::MmolL), 5.0);
    }

    #[test]
    fn test_bmi_non_positive_inputs() {
        assert_eq!(calculate_bmi(0.0, 180.0), 0.0);
        assert_eq!(calculate_bmi(70.0, 0.0), 0.0);
        assert_eq!(calculate_bmi(-5.0, 170.0), 0.0);
    }

    #[test]
    fn test_bmi_value() {
        let bmi = calculate_bmi(72.0, 180.0);
        assert!((bmi - 22.222).abs() < 0.01);
    }

    #[test]
    fn test_bmi_categories() {
        assert_eq!(BmiCategory::from_bmi(0.0), BmiCategory::Undetermined);
        assert_eq!(BmiCategory::from_bmi(18.4), BmiCategory::Underweight);
        assert_eq!(BmiCategory::from_bmi(18.5), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(24.9), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(25.0), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(29.9), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(30.0), BmiCategory::Obese);
    }

    #[test]
    fn test_bmi_scale_position() {
        assert_eq!(bmi_scale_position(0.0), 0.0);
        assert_eq!(bmi_scale_position(10.0), 0.0);
        assert_eq!(bmi_scale_position(27.5), 50.0);
        assert_eq!(bmi_scale_position(45.0), 100.0);
    }

    #[test]
    fn test_classify_blood() {
        let limits = ThresholdLimits::default();
        assert_eq!(
            GlucoseStatus::classify(ReadingType::Blood, 69.0, &limits),
            GlucoseStatus::Low
        );
        assert_eq!(
            GlucoseStatus::classify(ReadingType::Blood, 70.0, &limits),
            GlucoseStatus::Normal
        );
        assert_eq!(
            GlucoseStatus::classify(ReadingType::Blood, 140.0, &limits),
            GlucoseStatus::Normal
        );
        assert_eq!(
            GlucoseStatus::classify(ReadingType::Blood, 141.0, &limits),
            GlucoseStatus::High
        );
    }

    #[test]
    fn test_classify_urine() {
        let limits = ThresholdLimits::default();
        assert_eq!(
            GlucoseStatus::classify(ReadingType::Urine, 0.0, &limits),
            GlucoseStatus::Normal
        );
        assert_eq!(
            GlucoseStatus::classify(ReadingType::Urine, 16.0, &limits),
            GlucoseStatus::High
        );
    }
}
