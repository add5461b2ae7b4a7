use crate::{
    TIMESTAMP_FORMAT,
    archive::LowConfidenceArchiver,
    backend::Classifier,
    config::RouterOptions,
    error::WorkerError,
    labels::LabelTable,
    metrics::RouterMetrics,
    publisher::{PublishOutcome, ResultPublisher},
    selection::{PredictionMatch, PredictionSelector},
};
use bus::{DeliverySource, ResultSink};
use chrono::Local;
use image::RgbImage;
use preprocess::ImagePreprocessor;
use schema::{CaptureMessage, PredictionMessage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const STATS_LOG_EVERY: u64 = 100;

/// What happened to one delivery.
#[derive(Debug)]
pub enum Outcome {
    Classified(Classification),
    /// Capture from a camera this worker does not handle.
    Filtered,
    Rejected(WorkerError),
}

#[derive(Debug)]
pub struct Classification {
    pub result: PredictionMessage,
    pub archived: Option<PathBuf>,
    pub publish: PublishOutcome,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub received: u64,
    pub classified: u64,
    pub filtered: u64,
    pub rejected: u64,
    pub archived: u64,
    pub publish_failures: u64,
}

/// Drives every delivery through decode, preprocess, inference, selection,
/// archive and publish, one message at a time.
pub struct MessageRouter<C: Classifier, S: ResultSink> {
    classifier: C,
    selector: PredictionSelector,
    preprocessor: ImagePreprocessor,
    archiver: LowConfidenceArchiver,
    publisher: ResultPublisher<S>,
    camera_filter: Option<String>,
    classifier_tag: String,
    metrics: RouterMetrics,
    stats: RouterStats,
}

impl<C: Classifier, S: ResultSink> MessageRouter<C, S> {
    pub fn new(classifier: C, labels: LabelTable, sink: Option<S>, options: RouterOptions) -> Self {
        Self {
            classifier,
            selector: PredictionSelector::new(labels),
            preprocessor: ImagePreprocessor::new(options.input_size),
            archiver: LowConfidenceArchiver::new(
                options.low_confidence_threshold,
                options.archive_dir,
            ),
            publisher: ResultPublisher::new(sink),
            camera_filter: options.camera_filter,
            classifier_tag: options.classifier_tag,
            metrics: RouterMetrics::new("classifier"),
            stats: RouterStats::default(),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Pumps deliveries until `shutdown` is raised. The flag is checked
    /// between deliveries; a message being handled is finished first.
    pub fn run(&mut self, source: &mut impl DeliverySource, shutdown: &AtomicBool) {
        tracing::info!(
            camera_filter = self.camera_filter.as_deref().unwrap_or("<any>"),
            labels = self.selector.labels().len(),
            transmit = self.publisher.is_enabled(),
            "Message router starting"
        );

        while !shutdown.load(Ordering::Relaxed) {
            let Some(delivery) = source.next_delivery(POLL_INTERVAL) else {
                continue;
            };

            tracing::trace!(
                topic = %delivery.topic,
                bytes = delivery.payload.len(),
                "Delivery received"
            );

            self.handle_delivery(&delivery.payload);

            if self.stats.received.is_multiple_of(STATS_LOG_EVERY) {
                self.log_stats("Router progress");
            }
        }

        self.log_stats("Message router stopped");
    }

    /// Handles one delivery body. Never fails: every error is logged and
    /// reported through the returned [`Outcome`].
    pub fn handle_delivery(&mut self, body: &[u8]) -> Outcome {
        self.stats.received += 1;

        // Captures for other cameras are skipped before the rest of the
        // message is validated.
        if let Some(filter) = self.camera_filter.as_deref() {
            let camera = match CaptureMessage::peek_camera(body) {
                Ok(camera) => camera,
                Err(e) => return self.reject(WorkerError::from(e), None),
            };

            if camera != filter {
                tracing::trace!(
                    camera = %camera,
                    expected = %filter,
                    "Ignoring capture from another camera"
                );
                self.stats.filtered += 1;
                self.metrics.record_filtered();
                return Outcome::Filtered;
            }
        }

        let capture = match CaptureMessage::from_slice(body) {
            Ok(capture) => capture,
            Err(e) => return self.reject(WorkerError::from(e), None),
        };

        let span = tracing::info_span!("handle_delivery", camera = %capture.cam_name);
        let _enter = span.enter();

        tracing::info!(
            camera = %capture.cam_name,
            capture_time = %capture.capture_time,
            "Processing capture"
        );

        let start = Instant::now();
        let (scores, best, image) = match self.classify(&capture) {
            Ok(classified) => classified,
            Err(e) => return self.reject(e, Some(&capture.cam_name)),
        };
        let elapsed = start.elapsed().as_secs_f64();

        let processed_time = Local::now().format(TIMESTAMP_FORMAT).to_string();
        tracing::debug!(processed_time = %processed_time, scores = ?scores, "Prediction");
        tracing::info!(
            processed_time = %processed_time,
            label = %best.label,
            index = best.class_index,
            confidence = best.confidence,
            duration_s = elapsed,
            "Best match"
        );

        self.stats.classified += 1;
        self.metrics.record_processed(elapsed, &best.label);

        let archived = self.archiver.archive(&image, &best, &capture.cam_name);
        if archived.is_some() {
            self.stats.archived += 1;
            self.metrics.record_archived();
        }

        let result = PredictionMessage {
            prediction_confidence: best.confidence,
            prediction_label: best.label,
            prediction_index: best.class_index,
            cam_name: capture.cam_name,
            capture_time: capture.capture_time,
            processed_time,
            processing_duration: elapsed,
            classifier_tag: self.classifier_tag.clone(),
        };

        let publish = self.publisher.publish(&result);
        if publish == PublishOutcome::Failed {
            self.stats.publish_failures += 1;
            self.metrics.record_publish_failure();
        }

        Outcome::Classified(Classification {
            result,
            archived,
            publish,
        })
    }

    fn classify(
        &mut self,
        capture: &CaptureMessage,
    ) -> Result<(Vec<f32>, PredictionMatch, RgbImage), WorkerError> {
        let bytes = capture.image_bytes()?;

        let input = self.preprocessor.preprocess(&bytes)?;

        let scores = {
            let _span = tracing::info_span!("model_inference").entered();
            self.classifier
                .predict(&input.tensor)
                .map_err(WorkerError::Inference)?
        };

        let labels = self.selector.labels().len();
        if scores.len() != labels {
            tracing::warn!(
                scores = scores.len(),
                labels,
                "Model output size does not match the label table"
            );
        }

        let best = self.selector.select(&scores)?;
        Ok((scores, best, input.image))
    }

    fn reject(&mut self, error: WorkerError, camera: Option<&str>) -> Outcome {
        tracing::error!(
            stage = error.stage(),
            camera = camera.unwrap_or("<unknown>"),
            error = %error,
            "Dropping message"
        );
        self.stats.rejected += 1;
        self.metrics.record_rejected(error.stage());
        Outcome::Rejected(error)
    }

    fn log_stats(&self, message: &'static str) {
        let RouterStats {
            received,
            classified,
            filtered,
            rejected,
            archived,
            publish_failures,
        } = self.stats;
        tracing::info!(
            received,
            classified,
            filtered,
            rejected,
            archived,
            publish_failures,
            "{message}"
        );
    }
}
