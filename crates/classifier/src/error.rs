use crate::selection::SelectionError;
use preprocess::PreprocessError;
use schema::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

/// Startup misconfiguration. The process exits before touching the bus.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("A model file is required via MODEL_PATH")]
    MissingModelPath,

    #[error("Model path '{}' is not a file", .0.display())]
    ModelNotFound(PathBuf),

    #[error("A label file is required via LABELS_PATH")]
    MissingLabelsPath,

    #[error("Label path '{}' is not a file", .0.display())]
    LabelsNotFound(PathBuf),
}

/// Failure while handling a single delivery. The message is dropped and the
/// worker moves on.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Malformed capture message: {0}")]
    Decode(#[from] SchemaError),

    #[error("Unreadable image: {0}")]
    ImageDecode(#[from] PreprocessError),

    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("Prediction selection failed: {0}")]
    Selection(#[from] SelectionError),
}

impl WorkerError {
    /// Pipeline stage the failure happened in, for log fields and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            WorkerError::Decode(_) => "decode",
            WorkerError::ImageDecode(_) => "preprocess",
            WorkerError::Inference(_) => "inference",
            WorkerError::Selection(_) => "selection",
        }
    }
}
