use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;

/// Probabilistic override of the normal draw, used to fake alert conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyPolicy {
    pub probability: f64,
    pub band: RangeInclusive<f64>,
}

const CRITICAL_TEMPERATURE: AnomalyPolicy = AnomalyPolicy {
    probability: 0.10,
    band: 40.0..=45.0,
};

/// Readings above this are shown and counted as alerts.
pub const TEMPERATURE_ALERT_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
}

impl SensorKind {
    /// Name of the JSON field carrying the reading.
    pub fn field_name(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
        }
    }

    pub fn anomaly(&self) -> Option<AnomalyPolicy> {
        match self {
            SensorKind::Temperature => Some(CRITICAL_TEMPERATURE),
            SensorKind::Humidity => None,
        }
    }
}

/// A simulated physical sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub device_id: String,
    pub topic: String,
    pub min: f64,
    pub max: f64,
    #[serde(rename = "type")]
    pub kind: SensorKind,
}

impl SensorDefinition {
    pub fn value_range(&self) -> RangeInclusive<f64> {
        self.min..=self.max
    }
}

/// One record of a sensor catalogue file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(flatten)]
    pub definition: SensorDefinition,
}

/// Ordered, immutable set of sensors. Iteration order is publish order.
#[derive(Debug, Clone)]
pub struct SensorSet {
    sensors: Vec<(String, SensorDefinition)>,
}

impl SensorSet {
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Validation(
                "Sensor catalogue cannot be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for entry in &entries {
            if !names.insert(entry.name.as_str()) {
                return Err(Error::Validation(format!(
                    "Duplicate sensor name {}",
                    entry.name
                )));
            }
            validate(&entry.name, &entry.definition)?;
        }

        Ok(Self {
            sensors: entries
                .into_iter()
                .map(|entry| (entry.name, entry.definition))
                .collect(),
        })
    }

    /// Default catalogue: one temperature and one humidity sensor at branch 01.
    pub fn builtin() -> Self {
        Self {
            sensors: vec![
                (
                    "sensor_001_temp".to_string(),
                    SensorDefinition {
                        device_id: "sensor_001".to_string(),
                        topic: "twingrid/temperatura/sucursal01".to_string(),
                        min: 20.0,
                        max: 45.0,
                        kind: SensorKind::Temperature,
                    },
                ),
                (
                    "sensor_002_humidity".to_string(),
                    SensorDefinition {
                        device_id: "sensor_002".to_string(),
                        topic: "twingrid/humidity/sucursal01".to_string(),
                        min: 30.0,
                        max: 90.0,
                        kind: SensorKind::Humidity,
                    },
                ),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Self::new(entries)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorDefinition)> {
        self.sensors.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }
}

fn validate(name: &str, def: &SensorDefinition) -> Result<()> {
    if def.device_id.is_empty() {
        return Err(Error::Validation(format!(
            "Sensor {} has an empty device ID",
            name
        )));
    }

    if def.topic.is_empty() || def.topic.contains(['+', '#']) {
        return Err(Error::Validation(format!(
            "Sensor {} has invalid publish topic '{}'",
            name, def.topic
        )));
    }

    if !def.min.is_finite() || !def.max.is_finite() || def.min >= def.max {
        return Err(Error::Validation(format!(
            "Sensor {} range [{}, {}] is invalid",
            name, def.min, def.max
        )));
    }

    // Readings are rounded to 2 dp, finer bounds would let them escape the range
    if !is_centesimal(def.min) || !is_centesimal(def.max) {
        return Err(Error::Validation(format!(
            "Sensor {} range [{}, {}] has more than two decimals",
            name, def.min, def.max
        )));
    }

    Ok(())
}

fn is_centesimal(bound: f64) -> bool {
    (bound * 100.0).round() / 100.0 == bound
}
