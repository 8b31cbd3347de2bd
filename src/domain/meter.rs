//! Meter profile and population row types.
//!
//! A profile is the hour-of-day average of one meter's raw time series.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Number of hour-of-day buckets in a raw profile.
pub const HOURS_PER_DAY: u8 = 24;

/// Average usage per hour of day for a single meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterProfile {
    /// Source meter identifier
    pub meter_id: String,

    /// Value per hour bucket (0-23). Hours without readings are absent.
    pub values: BTreeMap<u8, f64>,
}

impl MeterProfile {
    /// Create a profile from explicit hour/value pairs.
    #[must_use]
    pub fn new(meter_id: impl Into<String>, values: impl IntoIterator<Item = (u8, f64)>) -> Self {
        Self {
            meter_id: meter_id.into(),
            values: values.into_iter().collect(),
        }
    }

    /// Create a profile holding the same 24 values as `values`, indexed by hour.
    #[must_use]
    pub fn from_hourly(meter_id: impl Into<String>, values: &[f64]) -> Self {
        Self::new(
            meter_id,
            values
                .iter()
                .take(HOURS_PER_DAY as usize)
                .enumerate()
                .map(|(h, v)| (h as u8, *v)),
        )
    }

    /// Derive a profile by averaging a raw time series per hour of day.
    ///
    /// Non-finite readings are skipped.
    #[must_use]
    pub fn from_readings(meter_id: impl Into<String>, readings: &[(DateTime<Utc>, f64)]) -> Self {
        let mut sums: BTreeMap<u8, (f64, usize)> = BTreeMap::new();
        for (at, value) in readings {
            if !value.is_finite() {
                continue;
            }
            let entry = sums.entry(at.hour() as u8).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        Self {
            meter_id: meter_id.into(),
            values: sums
                .into_iter()
                .map(|(hour, (sum, count))| (hour, sum / count as f64))
                .collect(),
        }
    }

    /// Largest value in the profile, if any.
    #[must_use]
    pub fn max_value(&self) -> Option<f64> {
        self.values.values().copied().reduce(f64::max)
    }

    /// Whether the profile has no hourly values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Raw time series of one catalog meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReadings {
    pub meter_id: String,

    /// (timestamp, usage) pairs in any order
    pub readings: Vec<(DateTime<Utc>, f64)>,
}

impl MeterReadings {
    /// Hour-of-day profile of these readings.
    #[must_use]
    pub fn to_profile(&self) -> MeterProfile {
        MeterProfile::from_readings(self.meter_id.clone(), &self.readings)
    }
}

/// One persisted row of a synthetic population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    /// Population label this row belongs to
    pub population: String,

    /// Synthetic meter identifier, unique within the population
    pub meter_id: String,

    /// Hour of day (0-23)
    pub hour: u8,

    /// Usage value
    pub value: f64,
}

impl PopulationRecord {
    /// Create a new population row.
    #[must_use]
    pub fn new(population: impl Into<String>, meter_id: impl Into<String>, hour: u8, value: f64) -> Self {
        Self {
            population: population.into(),
            meter_id: meter_id.into(),
            hour,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_readings_averages_per_hour() {
        let readings = vec![
            (Utc.with_ymd_and_hms(2021, 1, 1, 0, 15, 0).unwrap(), 1.0),
            (Utc.with_ymd_and_hms(2021, 1, 2, 0, 45, 0).unwrap(), 3.0),
            (Utc.with_ymd_and_hms(2021, 1, 1, 13, 0, 0).unwrap(), 5.0),
            (Utc.with_ymd_and_hms(2021, 1, 1, 14, 0, 0).unwrap(), f64::NAN),
        ];

        let profile = MeterProfile::from_readings("m1", &readings);
        assert_eq!(profile.values.len(), 2);
        assert!((profile.values[&0] - 2.0).abs() < f64::EPSILON);
        assert!((profile.values[&13] - 5.0).abs() < f64::EPSILON);
        assert!(!profile.values.contains_key(&14));
    }

    #[test]
    fn test_from_hourly_and_max() {
        let values: Vec<f64> = (0..24).map(f64::from).collect();
        let profile = MeterProfile::from_hourly("m2", &values);
        assert_eq!(profile.values.len(), 24);
        assert_eq!(profile.max_value(), Some(23.0));
        assert!(MeterProfile::new("empty", []).max_value().is_none());
    }
}
