pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod labels;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod router;
pub mod selection;

/// Local time format used for `processedTime` and archive filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

// Re-export commonly used types for convenience
pub use backend::{Classifier, ExecutionProvider};
pub use config::{RouterOptions, WorkerConfig};
pub use error::{ConfigError, WorkerError};
pub use labels::LabelTable;
pub use router::{MessageRouter, Outcome, RouterStats};
pub use selection::{PredictionMatch, PredictionSelector};
