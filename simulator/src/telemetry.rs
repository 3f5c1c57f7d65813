use crate::errors::Result;
use crate::sensor::{SensorDefinition, SensorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind-named reading; flattened so the envelope carries exactly one of these keys.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reading {
    Temperature(f64),
    Humidity(f64),
}

impl Reading {
    pub fn new(kind: SensorKind, value: f64) -> Self {
        match kind {
            SensorKind::Temperature => Reading::Temperature(value),
            SensorKind::Humidity => Reading::Humidity(value),
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Reading::Temperature(value) | Reading::Humidity(value) => *value,
        }
    }
}

/// Message body published for one sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub device_id: String,
    #[serde(with = "iso_utc")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub reading: Reading,
}

impl Envelope {
    pub fn new(sensor: &SensorDefinition, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: sensor.device_id.clone(),
            timestamp,
            reading: Reading::new(sensor.kind, value),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Issues UTC timestamps that never go backwards, even if the wall clock does.
#[derive(Debug, Default)]
pub struct Clock {
    last: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn now(&mut self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    fn observe(&mut self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last {
            Some(last) if last > wall => last,
            _ => wall,
        };
        self.last = Some(ts);
        ts
    }
}

mod iso_utc {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
