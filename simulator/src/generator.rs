use crate::sensor::{SensorDefinition, SensorKind, TEMPERATURE_ALERT_THRESHOLD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces independent synthetic readings. Owns its random source so tests can seed it.
pub struct ValueGenerator<R = StdRng> {
    rng: R,
}

impl ValueGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ValueGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate_value(&mut self, sensor: &SensorDefinition) -> f64 {
        let mut value = self.rng.gen_range(sensor.value_range());

        // Band is absolute, independent of the sensor's own range
        if let Some(policy) = sensor.kind.anomaly() {
            if self.rng.gen_bool(policy.probability) {
                value = self.rng.gen_range(policy.band);
            }
        }

        round2(value)
    }
}

pub fn is_anomalous(kind: SensorKind, value: f64) -> bool {
    kind == SensorKind::Temperature && value > TEMPERATURE_ALERT_THRESHOLD
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
