use crate::backend::ExecutionProvider;
use crate::error::ConfigError;
use bus::BusEndpoint;
use common::config::{Lookup, parse_or, process_env, var_or};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use common::Environment;

const DEFAULT_MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub environment: Environment,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub classifier_tag: String,
    /// Only captures from this camera are handled; `None` accepts every camera.
    pub camera_filter: Option<String>,
    pub input_size: u32,
    pub execution_provider: ExecutionProvider,
    pub receive: BusEndpoint,
    /// `None` when publishing is disabled.
    pub transmit: Option<BusEndpoint>,
    pub publish_timeout: Duration,
    pub low_confidence_threshold: f32,
    pub archive_dir: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    /// Settings that were present but unusable and replaced by a default.
    /// Collected here because the config is read before logging exists.
    pub warnings: Vec<String>,
}

/// The slice of [`WorkerConfig`] the message router needs.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub input_size: u32,
    pub camera_filter: Option<String>,
    pub classifier_tag: String,
    pub low_confidence_threshold: f32,
    pub archive_dir: Option<PathBuf>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            input_size: preprocess::DEFAULT_INPUT_SIZE,
            camera_filter: None,
            classifier_tag: String::new(),
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            archive_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Self {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let environment = Environment::from_lookup(lookup);
        let mut warnings = Vec::new();

        let execution_provider = match lookup("EXECUTION_PROVIDER") {
            Some(raw) => raw.parse::<ExecutionProvider>().unwrap_or_else(|e| {
                warnings.push(format!("EXECUTION_PROVIDER: {e} Falling back to `cpu`."));
                ExecutionProvider::Cpu
            }),
            None => ExecutionProvider::default(),
        };

        let max_packet_bytes = parse_or(lookup, "MQTT_MAX_PACKET_BYTES", DEFAULT_MAX_PACKET_BYTES);
        let receive = receive_endpoint(lookup, max_packet_bytes);
        let transmit = transmit_endpoint(lookup, &receive);

        Self {
            environment,
            model_path: non_empty(lookup("MODEL_PATH")).map(PathBuf::from),
            labels_path: non_empty(lookup("LABELS_PATH")).map(PathBuf::from),
            classifier_tag: var_or(lookup, "CLASSIFIER_TAG", ""),
            camera_filter: non_empty(lookup("CAMERA_NAME")),
            input_size: parse_or(lookup, "INPUT_SIZE", preprocess::DEFAULT_INPUT_SIZE),
            execution_provider,
            receive,
            transmit,
            publish_timeout: Duration::from_millis(parse_or(
                lookup,
                "MQTT_PUBLISH_TIMEOUT_MS",
                DEFAULT_PUBLISH_TIMEOUT_MS,
            )),
            low_confidence_threshold: parse_or(
                lookup,
                "PREDICTION_LOW_CONFIDENCE_THRESHOLD",
                DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            ),
            archive_dir: non_empty(lookup("PREDICTION_LOW_CONFIDENCE_DIR")).map(PathBuf::from),
            otel_endpoint: non_empty(lookup("OTEL_EXPORTER_OTLP_ENDPOINT")),
            warnings,
        }
    }

    /// Reports the settings that fell back to defaults. Call once the
    /// subscriber is installed.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            tracing::warn!(setting = %warning, "Ignoring invalid setting");
        }
    }

    /// Checks that the model and label files exist and returns their paths.
    pub fn validate(&self) -> Result<(&Path, &Path), ConfigError> {
        let model = self.model_path.as_deref().ok_or(ConfigError::MissingModelPath)?;
        if !model.is_file() {
            return Err(ConfigError::ModelNotFound(model.to_path_buf()));
        }

        let labels = self
            .labels_path
            .as_deref()
            .ok_or(ConfigError::MissingLabelsPath)?;
        if !labels.is_file() {
            return Err(ConfigError::LabelsNotFound(labels.to_path_buf()));
        }

        Ok((model, labels))
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            input_size: self.input_size,
            camera_filter: self.camera_filter.clone(),
            classifier_tag: self.classifier_tag.clone(),
            low_confidence_threshold: self.low_confidence_threshold,
            archive_dir: self.archive_dir.clone(),
        }
    }
}

fn receive_endpoint(lookup: Lookup<'_>, max_packet_bytes: usize) -> BusEndpoint {
    BusEndpoint {
        host: var_or(lookup, "MQTT_RECEIVE_HOST", "localhost"),
        port: parse_or(lookup, "MQTT_RECEIVE_PORT", 1883),
        vdir: var_or(lookup, "MQTT_RECEIVE_VDIR", "/"),
        user: non_empty(lookup("MQTT_RECEIVE_USER")),
        password: lookup("MQTT_RECEIVE_PASS"),
        exchange: var_or(lookup, "MQTT_RECEIVE_EXCHANGE", "knightware.cameraImages"),
        routing_key: var_or(lookup, "MQTT_RECEIVE_ROUTING_KEY", "actions.write.image"),
        queue: var_or(lookup, "MQTT_RECEIVE_QUEUE", ""),
        max_packet_bytes,
    }
}

/// Every transmit setting falls back to its receive counterpart, except the
/// routing key. An explicitly empty host turns publishing off.
fn transmit_endpoint(lookup: Lookup<'_>, receive: &BusEndpoint) -> Option<BusEndpoint> {
    let host = lookup("MQTT_TRANSMIT_HOST").unwrap_or_else(|| receive.host.clone());
    if host.trim().is_empty() {
        return None;
    }

    Some(BusEndpoint {
        host,
        port: parse_or(lookup, "MQTT_TRANSMIT_PORT", receive.port),
        vdir: lookup("MQTT_TRANSMIT_VDIR").unwrap_or_else(|| receive.vdir.clone()),
        user: lookup("MQTT_TRANSMIT_USER")
            .map(Some)
            .unwrap_or_else(|| receive.user.clone())
            .filter(|u| !u.is_empty()),
        password: lookup("MQTT_TRANSMIT_PASS").or_else(|| receive.password.clone()),
        exchange: lookup("MQTT_TRANSMIT_EXCHANGE").unwrap_or_else(|| receive.exchange.clone()),
        routing_key: var_or(lookup, "MQTT_TRANSMIT_ROUTING_KEY", "actions.write.prediction"),
        queue: String::new(),
        max_packet_bytes: receive.max_packet_bytes,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn config_from(pairs: &[(&str, &str)]) -> WorkerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(&move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.model_path, None);
        assert_eq!(config.input_size, 224);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.camera_filter, None);
        assert_eq!(config.classifier_tag, "");
        assert_eq!(config.low_confidence_threshold, 0.9);
        assert_eq!(config.archive_dir, None);
        assert_eq!(config.publish_timeout, Duration::from_millis(5000));
        assert_eq!(config.otel_endpoint, None);

        assert_eq!(config.receive.host, "localhost");
        assert_eq!(config.receive.port, 1883);
        assert_eq!(config.receive.max_packet_bytes, 16 * 1024 * 1024);
        assert_eq!(
            config.receive.topic(),
            "knightware.cameraImages/actions/write/image"
        );
        assert!(config.receive.queue.is_empty());
    }

    #[test]
    fn test_transmit_inherits_receive_settings() {
        let config = config_from(&[
            ("MQTT_RECEIVE_HOST", "rabbit"),
            ("MQTT_RECEIVE_PORT", "1884"),
            ("MQTT_RECEIVE_USER", "worker"),
            ("MQTT_RECEIVE_PASS", "secret"),
            ("MQTT_RECEIVE_QUEUE", "classifier"),
        ]);

        let transmit = config.transmit.expect("transmit enabled by default");
        assert_eq!(transmit.host, "rabbit");
        assert_eq!(transmit.port, 1884);
        assert_eq!(transmit.user.as_deref(), Some("worker"));
        assert_eq!(transmit.password.as_deref(), Some("secret"));
        assert_eq!(transmit.exchange, "knightware.cameraImages");
        assert_eq!(
            transmit.topic(),
            "knightware.cameraImages/actions/write/prediction"
        );
        assert!(transmit.queue.is_empty());
    }

    #[test]
    fn test_transmit_overrides() {
        let config = config_from(&[
            ("MQTT_TRANSMIT_HOST", "results"),
            ("MQTT_TRANSMIT_VDIR", "/plant"),
            ("MQTT_TRANSMIT_EXCHANGE", "knightware.predictions"),
            ("MQTT_TRANSMIT_ROUTING_KEY", "out.result"),
        ]);

        let transmit = config.transmit.unwrap();
        assert_eq!(transmit.host, "results");
        assert_eq!(transmit.topic(), "plant/knightware.predictions/out/result");
    }

    #[test]
    fn test_empty_transmit_host_disables_publishing() {
        let config = config_from(&[("MQTT_TRANSMIT_HOST", "")]);
        assert!(config.transmit.is_none());
    }

    #[test]
    fn test_empty_strings_mean_unset() {
        let config = config_from(&[
            ("CAMERA_NAME", ""),
            ("PREDICTION_LOW_CONFIDENCE_DIR", ""),
            ("MQTT_RECEIVE_USER", ""),
        ]);

        assert_eq!(config.camera_filter, None);
        assert_eq!(config.archive_dir, None);
        assert_eq!(config.receive.user, None);
    }

    #[test]
    fn test_router_options_carry_processing_settings() {
        let options = config_from(&[
            ("CAMERA_NAME", "front"),
            ("CLASSIFIER_TAG", "pets-v2"),
            ("INPUT_SIZE", "192"),
            ("PREDICTION_LOW_CONFIDENCE_THRESHOLD", "0.75"),
            ("PREDICTION_LOW_CONFIDENCE_DIR", "/srv/review"),
        ])
        .router_options();

        assert_eq!(options.camera_filter.as_deref(), Some("front"));
        assert_eq!(options.classifier_tag, "pets-v2");
        assert_eq!(options.input_size, 192);
        assert_eq!(options.low_confidence_threshold, 0.75);
        assert_eq!(options.archive_dir, Some(PathBuf::from("/srv/review")));
    }

    #[test]
    fn test_unknown_execution_provider_falls_back_to_cpu() {
        let config = config_from(&[("EXECUTION_PROVIDER", "tpu")]);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.warnings.len(), 1);
        assert!(config.warnings[0].contains("tpu"));

        let config = config_from(&[("EXECUTION_PROVIDER", "cuda")]);
        assert_eq!(config.execution_provider, ExecutionProvider::Cuda);
        assert!(config.warnings.is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_misspelled_execution_provider_is_logged_once_logging_is_up() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(log.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let config = config_from(&[("EXECUTION_PROVIDER", "cdua")]);
            config.log_warnings();
        });

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        let warnings: Vec<&str> = output.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 1, "unexpected log output:\n{output}");
        assert!(warnings[0].contains("cdua"));
        assert!(warnings[0].contains("Ignoring invalid setting"));
    }

    #[test]
    fn test_validate_requires_model_and_labels() {
        let config = config_from(&[]);
        assert!(matches!(config.validate(), Err(ConfigError::MissingModelPath)));

        let model = tempfile::NamedTempFile::new().unwrap();
        let model_path = model.path().to_str().unwrap();

        let config = config_from(&[("MODEL_PATH", model_path)]);
        assert!(matches!(config.validate(), Err(ConfigError::MissingLabelsPath)));

        let config = config_from(&[("MODEL_PATH", model_path), ("LABELS_PATH", "/nope/labels.txt")]);
        assert!(matches!(config.validate(), Err(ConfigError::LabelsNotFound(_))));

        let labels = tempfile::NamedTempFile::new().unwrap();
        let config = config_from(&[
            ("MODEL_PATH", model_path),
            ("LABELS_PATH", labels.path().to_str().unwrap()),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_directory_is_not_a_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_from(&[("MODEL_PATH", dir.path().to_str().unwrap())]);

        assert!(matches!(config.validate(), Err(ConfigError::ModelNotFound(_))));
    }
}
