use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Not connected to the broker")]
    NotConnected,

    #[error("Connection to broker lost: {0}")]
    ConnectionLost(String),

    #[error("Could not connect to broker: {0}")]
    ConnectFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
