//! Logical source endpoint: flow-control window and the ack path.

use crate::ack::{AckId, AckTracker, Bookmark};
use crate::{AckType, LogMessage, MessageAck, Pipeline, SourceMetrics, TrackedMessage};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// The endpoint a driver emits messages through
///
/// Owns the window: the number of messages that may still be handed to the
/// pipeline before the driver has to wait for acknowledgements. Posting takes
/// a slot, acknowledging gives it back, and giving back the slot of an
/// exhausted window wakes the driver up.
pub(crate) struct ThreadedSource {
    name: String,
    window: AtomicIsize,
    wakeup: Arc<Notify>,
    tracker: Arc<dyn AckTracker>,
    pipeline: Arc<dyn Pipeline>,
    ack_handler: Option<Arc<dyn MessageAck>>,
    metrics: SourceMetrics,
}

impl ThreadedSource {
    pub(crate) fn new(
        name: impl Into<String>,
        init_window_size: usize,
        wakeup: Arc<Notify>,
        tracker: Arc<dyn AckTracker>,
        pipeline: Arc<dyn Pipeline>,
        ack_handler: Option<Arc<dyn MessageAck>>,
        metrics: SourceMetrics,
    ) -> Self {
        let window = isize::try_from(init_window_size).unwrap_or(isize::MAX);
        metrics.set_window(window);
        Self {
            name: name.into(),
            window: AtomicIsize::new(window),
            wakeup,
            tracker,
            pipeline,
            ack_handler,
            metrics,
        }
    }

    /// Whether another message may be posted
    pub(crate) fn free_to_send(&self) -> bool {
        self.window.load(Ordering::Acquire) > 0
    }

    pub(crate) fn window(&self) -> isize {
        self.window.load(Ordering::Acquire)
    }

    pub(crate) fn pending_acks(&self) -> usize {
        self.tracker.pending()
    }

    /// Hand a fetched message to the pipeline
    ///
    /// # Panics
    ///
    /// Panics if the window is already exhausted: callers must check
    /// `free_to_send` before every post.
    pub(crate) fn post(self: &Arc<Self>, msg: LogMessage, bookmark: Option<Bookmark>) {
        let id = self.tracker.track(bookmark);

        let old_window = self.window.fetch_sub(1, Ordering::AcqRel);
        assert!(
            old_window > 0,
            "message posted to source {} with an exhausted window",
            self.name
        );
        self.metrics.set_window(old_window - 1);

        self.pipeline
            .queue(TrackedMessage::new(msg, Arc::clone(self), id));
    }

    /// Settle a message: worker callback, tracker bookkeeping, then window release
    ///
    /// Runs on the acknowledging thread and never waits for the worker.
    pub(crate) fn msg_ack(&self, msg: &LogMessage, id: AckId, ack_type: AckType) {
        if let Some(handler) = &self.ack_handler {
            let result = match ack_type {
                AckType::Processed => handler.ack(msg),
                AckType::Aborted => handler.nack(msg),
            };
            if let Err(e) = result {
                warn!(source = %self.name, ?ack_type, error = %e, "Worker acknowledgement callback failed");
                self.metrics.record_ack_callback_failure();
            }
        }

        self.tracker.manage_msg_ack(id, ack_type);

        match ack_type {
            AckType::Processed => self.metrics.record_acked(),
            AckType::Aborted => self.metrics.record_nacked(),
        }

        let old_window = self.window.fetch_add(1, Ordering::AcqRel);
        self.metrics.set_window(old_window + 1);
        if old_window <= 0 {
            self.wakeup.notify_one();
        }
    }
}
