mod config;
mod errors;
mod generator;
mod metrics;
mod mqtt;
mod sensor;
mod telemetry;

use config::Config;
use errors::Result;
use generator::ValueGenerator;
use mqtt::ConnectionManager;
use sensor::SensorSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting TwinGrid sensor simulator");
    info!(
        "Broker: {}, Client ID: {}, Interval: {}s",
        config.broker_addr(),
        config.client_id,
        config.interval.as_secs()
    );

    if let Err(e) = metrics::init_metrics() {
        warn!("Failed to register metrics: {}", e);
    }

    let sensors = match load_sensors(&config) {
        Ok(sensors) => sensors,
        Err(e) => {
            error!("Failed to load sensor catalogue: {}", e);
            std::process::exit(1);
        }
    };
    for (name, sensor) in sensors.iter() {
        info!(
            "Sensor {}: {} {} [{}, {}] → {}",
            name,
            sensor.device_id,
            sensor.kind.field_name(),
            sensor.min,
            sensor.max,
            sensor.topic
        );
    }

    let mut generator = match config.seed {
        Some(seed) => {
            info!("Using fixed random seed {}", seed);
            ValueGenerator::seeded(seed)
        }
        None => ValueGenerator::from_entropy(),
    };

    let outcome = ConnectionManager::start(&config)
        .run(&sensors, &mut generator, config.interval, shutdown_signal())
        .await;

    info!("Totals: {}", metrics::summary());
    match metrics::gather_metrics() {
        Ok(text) => debug!("Final metrics:\n{}", text),
        Err(e) => warn!("Failed to gather metrics: {}", e),
    }

    if outcome.is_err() {
        std::process::exit(1);
    }
}

fn load_sensors(config: &Config) -> Result<SensorSet> {
    match &config.sensor_catalog {
        Some(path) => {
            info!("Loading sensor catalogue from {}", path.display());
            SensorSet::from_json_file(path)
        }
        None => Ok(SensorSet::builtin()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
