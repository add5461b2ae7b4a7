use crate::labels::LabelTable;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SelectionError {
    #[error("No label for class index {0}")]
    MissingLabel(usize),
}

/// Best-scoring class of one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionMatch {
    pub label: String,
    pub confidence: f32,
    pub class_index: usize,
}

/// Picks the winning class out of a confidence vector.
pub struct PredictionSelector {
    labels: LabelTable,
}

impl PredictionSelector {
    pub fn new(labels: LabelTable) -> Self {
        Self { labels }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Leftmost strictly-greatest score wins.
    ///
    /// The scan starts from `(index 0, confidence 0.0)`, so a vector with no
    /// positive entry (all zeros, empty, NaN) reports class 0 at confidence
    /// 0.0 instead of failing. That result still needs a label for index 0.
    pub fn select(&self, scores: &[f32]) -> Result<PredictionMatch, SelectionError> {
        let mut class_index = 0usize;
        let mut confidence = 0.0f32;

        for (index, &score) in scores.iter().enumerate() {
            if score > confidence {
                confidence = score;
                class_index = index;
            }
        }

        let label = self
            .labels
            .get(class_index)
            .ok_or(SelectionError::MissingLabel(class_index))?;

        Ok(PredictionMatch {
            label: label.to_string(),
            confidence,
            class_index,
        })
    }
}
