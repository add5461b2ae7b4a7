use crate::TIMESTAMP_FORMAT;
use crate::selection::PredictionMatch;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Keeps low-confidence inputs on disk so someone can review and relabel them.
#[derive(Debug, Clone)]
pub struct LowConfidenceArchiver {
    threshold: f32,
    directory: Option<PathBuf>,
}

impl LowConfidenceArchiver {
    pub fn new(threshold: f32, directory: Option<PathBuf>) -> Self {
        Self {
            threshold,
            directory,
        }
    }

    pub fn should_archive(&self, confidence: f32) -> bool {
        self.directory.is_some() && confidence < self.threshold
    }

    /// Writes `image` as JPEG when the prediction is below the threshold.
    ///
    /// Best effort: failures are logged and reported as `None`.
    pub fn archive(
        &self,
        image: &RgbImage,
        prediction: &PredictionMatch,
        cam_name: &str,
    ) -> Option<PathBuf> {
        if !self.should_archive(prediction.confidence) {
            return None;
        }
        let directory = self.directory.as_deref()?;

        match write(directory, image, prediction, cam_name, &Local::now()) {
            Ok(path) => {
                tracing::info!(
                    confidence = prediction.confidence,
                    path = %path.display(),
                    "Saved low confidence image for review"
                );
                Some(path)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    camera = cam_name,
                    "Failed to write low confidence image"
                );
                None
            }
        }
    }
}

fn write(
    directory: &Path,
    image: &RgbImage,
    prediction: &PredictionMatch,
    cam_name: &str,
    now: &DateTime<Local>,
) -> Result<PathBuf, ArchiveError> {
    let path = directory.join(archive_filename(now, cam_name, prediction));

    image.save(&path).map_err(|source| ArchiveError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

/// `{timestamp}-{camera}-{confidence}-{index}-{label}.jpg`
///
/// Path separators in the camera name or label are replaced with `_`.
pub fn archive_filename(
    timestamp: &DateTime<Local>,
    cam_name: &str,
    prediction: &PredictionMatch,
) -> String {
    format!(
        "{}-{}-{}-{}-{}.jpg",
        timestamp.format(TIMESTAMP_FORMAT),
        sanitize(cam_name),
        prediction.confidence,
        prediction.class_index,
        sanitize(&prediction.label)
    )
}

fn sanitize(component: &str) -> String {
    component.replace(['/', '\\'], "_")
}
