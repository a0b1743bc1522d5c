//! Ack trackers: pair in-flight messages with their bookmarks.

use super::{AckId, AckTracker, Bookmark};
use crate::AckType;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Commits each message's bookmark as soon as that message is acknowledged
///
/// Acknowledgements may arrive in any order, so after a crash the persisted
/// position can be ahead of messages that were still in flight.
#[derive(Debug, Default)]
pub struct InstantAckTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<AckId, Option<Bookmark>>>,
}

impl InstantAckTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AckTracker for InstantAckTracker {
    fn track(&self, bookmark: Option<Bookmark>) -> AckId {
        let id = AckId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.lock().insert(id, bookmark);
        id
    }

    fn manage_msg_ack(&self, id: AckId, ack_type: AckType) {
        let Some(bookmark) = self.pending.lock().remove(&id) else {
            debug!(?id, "Ack for an untracked message");
            return;
        };

        if let Some(bookmark) = bookmark {
            match ack_type {
                AckType::Processed => bookmark.save(),
                AckType::Aborted => bookmark.discard(),
            }
        }
    }

    fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Advances the persisted position over the fully acknowledged prefix only
///
/// Messages are kept in fetch order. Once the oldest in-flight messages are
/// all acknowledged, the newest bookmark of that run is saved and the rest are
/// discarded. Aborted messages complete their slot like processed ones.
#[derive(Debug, Default)]
pub struct ConsecutiveAckTracker {
    inner: Mutex<ConsecutiveInner>,
}

#[derive(Debug, Default)]
struct ConsecutiveInner {
    next_id: u64,
    slots: VecDeque<Slot>,
}

#[derive(Debug)]
struct Slot {
    id: AckId,
    bookmark: Option<Bookmark>,
    done: bool,
}

impl ConsecutiveAckTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AckTracker for ConsecutiveAckTracker {
    fn track(&self, bookmark: Option<Bookmark>) -> AckId {
        let mut inner = self.inner.lock();
        let id = AckId(inner.next_id);
        inner.next_id += 1;
        inner.slots.push_back(Slot {
            id,
            bookmark,
            done: false,
        });
        id
    }

    fn manage_msg_ack(&self, id: AckId, _ack_type: AckType) {
        let mut inner = self.inner.lock();

        let Some(front) = inner.slots.front().map(|s| s.id.0) else {
            debug!(?id, "Ack for an untracked message");
            return;
        };
        let offset = id.0.wrapping_sub(front) as usize;
        match inner.slots.get_mut(offset) {
            Some(slot) if slot.id == id && !slot.done => slot.done = true,
            _ => {
                debug!(?id, "Ack for an untracked message");
                return;
            }
        }

        let mut latest: Option<Bookmark> = None;
        while inner.slots.front().is_some_and(|s| s.done) {
            if let Some(bookmark) = inner.slots.pop_front().and_then(|s| s.bookmark) {
                if let Some(older) = latest.replace(bookmark) {
                    older.discard();
                }
            }
        }

        // saved under the lock so concurrent prefixes commit in fetch order
        if let Some(bookmark) = latest {
            bookmark.save();
        }
    }

    fn pending(&self) -> usize {
        self.inner.lock().slots.len()
    }
}
