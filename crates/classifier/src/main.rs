use anyhow::Context;
use bus::{MqttPublisher, MqttSubscriber};
use classifier::{
    Classifier, LabelTable, MessageRouter, WorkerConfig, backend::ort::OrtClassifier,
    logging::setup_logging,
};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    let _telemetry = setup_logging(&config)?;
    config.log_warnings();

    tracing::info!(config = ?config, "Loaded configuration");

    let (model_path, labels_path) = match config.validate() {
        Ok(paths) => paths,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;

    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    let labels = LabelTable::load(labels_path).context("Failed to load label table")?;
    tracing::info!(classes = labels.len(), path = %labels_path.display(), "Labels loaded");

    let classifier = OrtClassifier::load_model(model_path, config.execution_provider)
        .context("Failed to load classification model")?;

    let sink = config
        .transmit
        .clone()
        .map(|endpoint| MqttPublisher::new(endpoint, config.publish_timeout));

    let mut subscriber = MqttSubscriber::connect(&config.receive);
    let mut router = MessageRouter::new(classifier, labels, sink, config.router_options());

    router.run(&mut subscriber, &shutdown);

    tracing::info!("Classifier stopped gracefully");
    Ok(())
}
