use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Router instruments on the global meter. Without an OTLP endpoint the
/// global provider is a no-op and recording costs next to nothing.
pub struct RouterMetrics {
    duration: Histogram<f64>,
    processed: Counter<u64>,
    filtered: Counter<u64>,
    rejected: Counter<u64>,
    archived: Counter<u64>,
    publish_failures: Counter<u64>,
}

impl RouterMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];

        Self {
            duration: meter
                .f64_histogram("classifier_processing_duration_seconds")
                .with_description("Time to decode, preprocess, classify and select one capture")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            processed: meter
                .u64_counter("classifier_messages_processed_total")
                .with_description("Captures classified")
                .build(),
            filtered: meter
                .u64_counter("classifier_messages_filtered_total")
                .with_description("Captures skipped because they came from another camera")
                .build(),
            rejected: meter
                .u64_counter("classifier_messages_rejected_total")
                .with_description("Captures dropped because of a processing error")
                .build(),
            archived: meter
                .u64_counter("classifier_images_archived_total")
                .with_description("Low confidence images written for review")
                .build(),
            publish_failures: meter
                .u64_counter("classifier_publish_failures_total")
                .with_description("Prediction results that could not be published")
                .build(),
        }
    }

    pub fn record_processed(&self, seconds: f64, label: &str) {
        self.duration.record(seconds, &[]);
        self.processed
            .add(1, &[KeyValue::new("label", label.to_string())]);
    }

    pub fn record_filtered(&self) {
        self.filtered.add(1, &[]);
    }

    pub fn record_rejected(&self, stage: &'static str) {
        self.rejected.add(1, &[KeyValue::new("stage", stage)]);
    }

    pub fn record_archived(&self) {
        self.archived.add(1, &[]);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.add(1, &[]);
    }
}
