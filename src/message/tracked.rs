//! TrackedMessage - a fetched message on its way through the pipeline

use crate::ack::AckId;
use crate::runtime::ThreadedSource;
use crate::{AckType, LogMessage};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Message handed to the `Pipeline`, carrying its acknowledgement handle
///
/// The acknowledgement is delivered exactly once: `ack` and `nack` consume the
/// message, and dropping a message that was never acknowledged counts as an
/// abort. Acknowledging releases a slot of the source window and, for
/// position-tracked sources, commits or discards the message's bookmark.
pub struct TrackedMessage {
    msg: LogMessage,
    handle: Option<AckHandle>,
}

struct AckHandle {
    source: Arc<ThreadedSource>,
    id: AckId,
}

impl TrackedMessage {
    pub(crate) fn new(msg: LogMessage, source: Arc<ThreadedSource>, id: AckId) -> Self {
        Self {
            msg,
            handle: Some(AckHandle { source, id }),
        }
    }

    /// Mark the message as processed
    pub fn ack(mut self) {
        self.finish(AckType::Processed);
    }

    /// Mark the message as aborted
    pub fn nack(mut self) {
        self.finish(AckType::Aborted);
    }

    /// Acknowledge with an explicit outcome
    pub fn acknowledge(mut self, ack_type: AckType) {
        self.finish(ack_type);
    }

    fn finish(&mut self, ack_type: AckType) {
        if let Some(handle) = self.handle.take() {
            handle.source.msg_ack(&self.msg, handle.id, ack_type);
        }
    }
}

impl Deref for TrackedMessage {
    type Target = LogMessage;

    fn deref(&self) -> &LogMessage {
        &self.msg
    }
}

impl Drop for TrackedMessage {
    fn drop(&mut self) {
        self.finish(AckType::Aborted);
    }
}

impl fmt::Debug for TrackedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedMessage")
            .field("msg", &self.msg)
            .field("ack_id", &self.handle.as_ref().map(|h| h.id))
            .finish()
    }
}
