use crate::domain::models::Reading;

/// Aggregate over a set of readings; all zeros when the set is empty
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadingStatistics {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl ReadingStatistics {
    pub fn from_readings(readings: &[Reading]) -> Self {
        if readings.is_empty() {
            return Self::default();
        }

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for reading in readings {
            sum += reading.value;
            min = min.min(reading.value);
            max = max.max(reading.value);
        }

        Self {
            avg: sum / readings.len() as f64,
            min,
            max,
            count: readings.len(),
        }
    }
}
