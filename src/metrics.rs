//! Metrics and observability for threaded sources.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Metrics collector for one threaded source
#[derive(Debug, Clone)]
pub struct SourceMetrics {
    /// Stats instance for labeling
    source: String,
}

impl SourceMetrics {
    /// Create a new metrics collector
    pub fn new(source: impl Into<String>) -> Self {
        Self::register_metrics();

        Self {
            source: source.into(),
        }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "threaded_source_messages_fetched_total",
            "Total number of messages read from the source and queued downstream"
        );
        describe_counter!(
            "threaded_source_messages_acked_total",
            "Total number of messages acknowledged as processed"
        );
        describe_counter!(
            "threaded_source_messages_nacked_total",
            "Total number of messages acknowledged as aborted"
        );
        describe_counter!(
            "threaded_source_read_errors_total",
            "Total number of reads that found the source not connected"
        );
        describe_counter!(
            "threaded_source_reopen_attempts_total",
            "Total number of times the reopen timer was armed"
        );
        describe_counter!(
            "threaded_source_ack_callback_failures_total",
            "Total number of worker ack/nack callbacks that returned an error"
        );

        describe_histogram!(
            "threaded_source_batch_size",
            "Number of messages fetched in one scheduling turn"
        );

        describe_gauge!(
            "threaded_source_window_size",
            "Remaining number of messages the source may send before suspending"
        );
    }

    /// Record a message fetched and queued
    pub fn record_fetched(&self) {
        counter!("threaded_source_messages_fetched_total", "source" => self.source.clone())
            .increment(1);
    }

    /// Record a message acknowledged as processed
    pub fn record_acked(&self) {
        counter!("threaded_source_messages_acked_total", "source" => self.source.clone())
            .increment(1);
    }

    /// Record a message acknowledged as aborted
    pub fn record_nacked(&self) {
        counter!("threaded_source_messages_nacked_total", "source" => self.source.clone())
            .increment(1);
    }

    /// Record a read that found the source not connected
    pub fn record_read_error(&self) {
        counter!("threaded_source_read_errors_total", "source" => self.source.clone())
            .increment(1);
    }

    /// Record the reopen timer being armed
    pub fn record_reopen(&self) {
        counter!("threaded_source_reopen_attempts_total", "source" => self.source.clone())
            .increment(1);
    }

    /// Record a failed worker ack/nack callback
    pub fn record_ack_callback_failure(&self) {
        counter!(
            "threaded_source_ack_callback_failures_total",
            "source" => self.source.clone(),
        )
        .increment(1);
    }

    /// Record the size of a fetch batch
    pub fn record_batch_size(&self, size: usize) {
        histogram!("threaded_source_batch_size", "source" => self.source.clone())
            .record(size as f64);
    }

    /// Set the remaining window
    pub fn set_window(&self, window: isize) {
        gauge!("threaded_source_window_size", "source" => self.source.clone()).set(window as f64);
    }
}
