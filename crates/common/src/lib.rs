pub mod config;
pub mod logging;
pub mod retry;
pub mod telemetry;

pub use config::Environment;
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;
