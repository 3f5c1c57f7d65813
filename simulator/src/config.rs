use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "simulator_combined";
const DEFAULT_INTERVAL_SECS: u64 = 5;

/// Runtime settings, read once from the environment at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub client_id: String,
    pub interval: Duration,
    pub sensor_catalog: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mqtt_host = lookup("MQTT_HOST")
            .or_else(|| lookup("MQTT_BROKER"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let mqtt_port: u16 = lookup("MQTT_PORT")
            .unwrap_or_else(|| DEFAULT_PORT.to_string())
            .parse()
            .unwrap_or(DEFAULT_PORT);
        let client_id = lookup("MQTT_CLIENT_ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let interval_secs: u64 = lookup("PUBLISH_INTERVAL_SECS")
            .unwrap_or_else(|| DEFAULT_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        let sensor_catalog = lookup("SENSOR_CATALOG")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);
        let seed = lookup("SIMULATOR_SEED").and_then(|seed| seed.parse::<u64>().ok());

        Self {
            mqtt_host,
            mqtt_port,
            client_id,
            interval: Duration::from_secs(interval_secs),
            sensor_catalog,
            seed,
        }
    }

    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.mqtt_host, self.mqtt_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.mqtt_host, "localhost");
        assert_eq!(config.mqtt_port, 1883);
        assert_eq!(config.client_id, "simulator_combined");
        assert_eq!(config.interval, Duration::from_secs(5));
        assert!(config.sensor_catalog.is_none());
        assert!(config.seed.is_none());
        assert_eq!(config.broker_addr(), "localhost:1883");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("MQTT_HOST", "mosquitto"),
            ("MQTT_PORT", "1884"),
            ("MQTT_CLIENT_ID", "sim-a"),
            ("PUBLISH_INTERVAL_SECS", "2"),
            ("SENSOR_CATALOG", "/etc/twingrid/sensors.json"),
            ("SIMULATOR_SEED", "1234"),
        ]);

        assert_eq!(config.mqtt_host, "mosquitto");
        assert_eq!(config.mqtt_port, 1884);
        assert_eq!(config.client_id, "sim-a");
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(
            config.sensor_catalog,
            Some(PathBuf::from("/etc/twingrid/sensors.json"))
        );
        assert_eq!(config.seed, Some(1234));
    }

    #[test]
    fn test_broker_fallback_variable() {
        let config = config_from(&[("MQTT_BROKER", "emqx")]);
        assert_eq!(config.mqtt_host, "emqx");

        let config = config_from(&[("MQTT_BROKER", "emqx"), ("MQTT_HOST", "mosquitto")]);
        assert_eq!(config.mqtt_host, "mosquitto");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("MQTT_PORT", "not-a-port"),
            ("MQTT_CLIENT_ID", "   "),
            ("PUBLISH_INTERVAL_SECS", "0"),
        ]);

        assert_eq!(config.mqtt_port, 1883);
        assert_eq!(config.client_id, "simulator_combined");
        assert_eq!(config.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_client_id_trimmed() {
        assert_eq!(config_from(&[("MQTT_CLIENT_ID", " sim-a")]).client_id, "sim-a");
        assert_eq!(config_from(&[("MQTT_CLIENT_ID", "sim-b ")]).client_id, "sim-b");
    }
}
