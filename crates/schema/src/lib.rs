//! Wire formats exchanged over the message bus.
//!
//! Both directions are UTF-8 JSON documents with camelCase keys. Inbound
//! capture messages carry the image as a hex string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid message JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hex image payload: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Image published by a camera capture process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMessage {
    pub cam_name: String,
    pub capture_time: String,
    /// Encoded image file (JPEG, PNG, ...) as hex text.
    pub image_data: String,
}

impl CaptureMessage {
    /// Builds a message around raw image file bytes.
    pub fn encode(cam_name: &str, capture_time: &str, image: &[u8]) -> Self {
        Self {
            cam_name: cam_name.to_string(),
            capture_time: capture_time.to_string(),
            image_data: hex::encode(image),
        }
    }

    /// Parses a delivery body. Every field is required.
    pub fn from_slice(body: &[u8]) -> Result<Self, SchemaError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Reads only `camName`, so a capture meant for another worker can be
    /// skipped without validating the rest of it.
    pub fn peek_camera(body: &[u8]) -> Result<String, SchemaError> {
        let envelope: CameraEnvelope = serde_json::from_slice(body)?;
        Ok(envelope.cam_name)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes the hex payload back into image file bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(hex::decode(self.image_data.trim())?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CameraEnvelope {
    cam_name: String,
}

/// Classification result republished for every processed capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionMessage {
    pub prediction_confidence: f32,
    pub prediction_label: String,
    pub prediction_index: usize,
    pub cam_name: String,
    pub capture_time: String,
    pub processed_time: String,
    /// Seconds spent decoding, preprocessing, inferring and selecting.
    pub processing_duration: f64,
    pub classifier_tag: String,
}

impl PredictionMessage {
    pub fn to_json(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(self)?)
    }
}
