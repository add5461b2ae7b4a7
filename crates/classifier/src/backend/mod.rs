use ndarray::{Array, IxDyn};
use std::path::Path;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Where the model graph executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(format!(
                "{} is not a supported execution provider. Use either `cpu` or `cuda`.",
                other
            )),
        }
    }
}

/// A trained image classifier, opaque apart from its input/output contract.
pub trait Classifier {
    fn load_model(path: &Path, provider: ExecutionProvider) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Runs one `[1, H, W, 3]` tensor and returns the per-class confidences,
    /// index-aligned with the label table.
    fn predict(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<Vec<f32>>;
}
