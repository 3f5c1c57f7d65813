use crate::errors::Result;
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CYCLES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_cycles_total",
        "Total publish cycles run over the sensor set"
    ))
    .unwrap();
    pub static ref PUBLISH_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_publish_requests_total",
        "Total publish requests handed to the MQTT client"
    ))
    .unwrap();
    pub static ref PUBLISH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_publish_failures_total",
        "Total publish requests rejected by the MQTT client"
    ))
    .unwrap();
    pub static ref PUBLISH_ACKS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_publish_acks_total",
        "Total PUBACKs received from the broker"
    ))
    .unwrap();
    pub static ref ANOMALIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "simulator_anomalies_total",
        "Total temperature readings above the alert threshold"
    ))
    .unwrap();
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PUBLISH_ACKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ANOMALIES_TOTAL.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn summary() -> String {
    format!(
        "cycles={} published={} failed={} acked={} anomalies={}",
        CYCLES_TOTAL.get(),
        PUBLISH_REQUESTS_TOTAL.get(),
        PUBLISH_FAILURES_TOTAL.get(),
        PUBLISH_ACKS_TOTAL.get(),
        ANOMALIES_TOTAL.get()
    )
}
