//! Acknowledgement bookkeeping.
//!
//! Every message handed to the pipeline is registered with an `AckTracker`
//! together with its optional `Bookmark`. When the pipeline acknowledges the
//! message, the tracker decides whether the bookmark is saved or discarded.

mod bookmark;
mod tracker;

use crate::config::AckTracking;
use crate::AckType;
use std::sync::Arc;

pub use bookmark::Bookmark;
pub use tracker::{ConsecutiveAckTracker, InstantAckTracker};

/// Identifier of a tracked in-flight message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckId(u64);

/// Associates in-flight messages with their bookmarks
///
/// `manage_msg_ack` may be called from any thread. Every bookmark passed to
/// `track` ends up either saved or discarded exactly once.
pub trait AckTracker: Send + Sync {
    /// Register a message that is about to be handed to the pipeline
    fn track(&self, bookmark: Option<Bookmark>) -> AckId;

    /// Settle a tracked message; unknown or already settled ids are ignored
    fn manage_msg_ack(&self, id: AckId, ack_type: AckType);

    /// Number of messages tracked but not yet settled
    fn pending(&self) -> usize;
}

/// Build the tracker selected in the configuration
pub fn tracker_for(mode: AckTracking) -> Arc<dyn AckTracker> {
    match mode {
        AckTracking::Instant => Arc::new(InstantAckTracker::new()),
        AckTracking::Consecutive => Arc::new(ConsecutiveAckTracker::new()),
    }
}
