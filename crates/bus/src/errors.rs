use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Timed out after {0:?} waiting for the broker")]
    Timeout(Duration),

    #[error("MQTT event loop closed")]
    Disconnected,
}
