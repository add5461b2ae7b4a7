use bus::{BusError, ResultSink};
use schema::{PredictionMessage, SchemaError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] SchemaError),

    #[error("Failed to publish result: {0}")]
    Transport(#[from] BusError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// No outbound endpoint configured.
    Disabled,
    Failed,
}

/// Sends prediction results downstream. Failures are logged here and never
/// reach the caller as errors.
pub struct ResultPublisher<S: ResultSink> {
    sink: Option<S>,
}

impl<S: ResultSink> ResultPublisher<S> {
    pub fn new(sink: Option<S>) -> Self {
        if sink.is_none() {
            tracing::info!("Result transmit disabled, predictions will only be logged");
        }
        Self { sink }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn publish(&self, message: &PredictionMessage) -> PublishOutcome {
        let Some(sink) = &self.sink else {
            return PublishOutcome::Disabled;
        };

        match Self::try_publish(sink, message) {
            Ok(()) => {
                tracing::debug!(
                    destination = %sink.destination(),
                    camera = %message.cam_name,
                    "Published prediction"
                );
                PublishOutcome::Sent
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    destination = %sink.destination(),
                    camera = %message.cam_name,
                    "Failed to publish prediction"
                );
                PublishOutcome::Failed
            }
        }
    }

    fn try_publish(sink: &S, message: &PredictionMessage) -> Result<(), PublishError> {
        let payload = message.to_json()?;
        sink.send(&payload)?;
        Ok(())
    }
}
