use crate::config::WorkerConfig;
use common::TelemetryGuard;

const SERVICE_NAME: &str = "classifier";

/// Installs the global subscriber. With an OTLP endpoint configured the
/// returned guard keeps the exporters alive and must be held until exit.
pub fn setup_logging(config: &WorkerConfig) -> anyhow::Result<Option<TelemetryGuard>> {
    match &config.otel_endpoint {
        Some(endpoint) => {
            let guard = TelemetryGuard::init(SERVICE_NAME, endpoint, config.environment)?;
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(config.environment);
            Ok(None)
        }
    }
}
