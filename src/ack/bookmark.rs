//! Bookmark - deferred commit of a message's position

use crate::persist::{cursor_record, EntryHandle, PersistState};
use std::sync::Arc;
use tracing::warn;

/// Position snapshot of one fetched message, committed once the message is acknowledged
///
/// A bookmark is created on the worker thread right after a successful read and
/// is consumed exactly once: `save` copies the cursor into the persisted record,
/// `discard` drops it. Both take `self`, so a bookmark cannot outlive its
/// message's acknowledgement. The record handle is shared by all bookmarks of
/// a driver and the store is kept alive by the bookmark itself.
#[derive(Debug)]
pub struct Bookmark {
    persist: Arc<PersistState>,
    handle: EntryHandle,
    cursor: String,
}

impl Bookmark {
    pub(crate) fn new(persist: Arc<PersistState>, handle: EntryHandle, cursor: &str) -> Self {
        let cursor = cursor_record::truncate(cursor, cursor_record::MAX_CURSOR_LENGTH - 1);
        Self {
            persist,
            handle,
            cursor: cursor.to_string(),
        }
    }

    /// Cursor captured at fetch time
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Write the cursor into the persisted record
    pub fn save(self) {
        match self.persist.map_entry(self.handle) {
            Ok(mut record) => cursor_record::write_cursor(&mut record, &self.cursor),
            Err(e) => warn!(cursor = %self.cursor, error = %e, "Failed to save bookmark"),
        }
    }

    /// Drop the bookmark without touching the persisted record
    pub fn discard(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(persist: &PersistState) -> EntryHandle {
        let handle = persist
            .alloc_entry("test:bookmark", cursor_record::RECORD_SIZE)
            .unwrap();
        cursor_record::init(&mut persist.map_entry(handle).unwrap());
        handle
    }

    fn stored(persist: &PersistState, handle: EntryHandle) -> Option<String> {
        cursor_record::read_cursor(&persist.map_entry(handle).unwrap())
    }

    #[test]
    fn test_save_writes_cursor() {
        let persist = Arc::new(PersistState::in_memory());
        let handle = record(&persist);

        let bookmark = Bookmark::new(Arc::clone(&persist), handle, "c=17");
        assert_eq!(bookmark.cursor(), "c=17");
        bookmark.save();

        assert_eq!(stored(&persist, handle).as_deref(), Some("c=17"));
    }

    #[test]
    fn test_discard_leaves_record_alone() {
        let persist = Arc::new(PersistState::in_memory());
        let handle = record(&persist);

        Bookmark::new(Arc::clone(&persist), handle, "c=1").save();
        Bookmark::new(Arc::clone(&persist), handle, "c=2").discard();

        assert_eq!(stored(&persist, handle).as_deref(), Some("c=1"));
    }

    #[test]
    fn test_long_cursor_truncated_at_creation() {
        let persist = Arc::new(PersistState::in_memory());
        let handle = record(&persist);

        let long = "z".repeat(4096);
        let bookmark = Bookmark::new(Arc::clone(&persist), handle, &long);
        assert_eq!(bookmark.cursor().len(), cursor_record::MAX_CURSOR_LENGTH - 1);
        bookmark.save();

        assert_eq!(stored(&persist, handle).unwrap().len(), cursor_record::MAX_CURSOR_LENGTH - 1);
    }
}
