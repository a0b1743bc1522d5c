//! Persisted cursor of a position-tracked driver.

use crate::ack::Bookmark;
use crate::persist::{cursor_record, EntryHandle, PersistState};
use crate::PositionTracking;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Cursor capabilities of the worker, captured when the driver is spawned
pub(crate) struct CursorOps<W> {
    cursor: fn(&mut W) -> String,
    seek_to_cursor: fn(&mut W, Option<&str>) -> bool,
}

impl<W: PositionTracking> CursorOps<W> {
    pub(crate) fn new() -> Self {
        Self {
            cursor: <W as PositionTracking>::cursor,
            seek_to_cursor: <W as PositionTracking>::seek_to_cursor,
        }
    }
}

/// Position record of one driver inside the persist store
pub(crate) struct PositionState<W> {
    ops: CursorOps<W>,
    persist: Arc<PersistState>,
    persist_name: String,
    handle: Option<EntryHandle>,
}

impl<W> PositionState<W> {
    pub(crate) fn new(ops: CursorOps<W>, persist: Arc<PersistState>, persist_name: String) -> Self {
        Self {
            ops,
            persist,
            persist_name,
            handle: None,
        }
    }

    pub(crate) fn persist_name(&self) -> &str {
        &self.persist_name
    }

    pub(crate) fn persist(&self) -> &Arc<PersistState> {
        &self.persist
    }

    /// Attach to the stored record and seek the freshly opened worker
    ///
    /// A missing, undersized or foreign-format record is (re)created empty
    /// and the worker starts from the beginning.
    pub(crate) fn init(&mut self, worker: &mut W, source: &str) {
        match self.stored_record(source) {
            Some(handle) => {
                self.handle = Some(handle);
                self.seek_to_saved_state(handle, worker, source);
            }
            None => {
                self.handle = self.alloc_record(source);
                self.seek_to_start(worker, source);
            }
        }
    }

    /// Bookmark for the message the worker just returned
    pub(crate) fn bookmark(&self, worker: &mut W) -> Option<Bookmark> {
        let handle = self.handle?;
        let cursor = (self.ops.cursor)(worker);
        Some(Bookmark::new(Arc::clone(&self.persist), handle, &cursor))
    }

    /// Replace the stored cursor, creating the record when needed
    pub(crate) fn overwrite_cursor(&mut self, cursor: &str, source: &str) {
        let handle = match self.stored_record(source) {
            Some(handle) => Some(handle),
            None => self.alloc_record(source),
        };
        let Some(handle) = handle else {
            return;
        };

        match self.persist.map_entry(handle) {
            Ok(mut record) => cursor_record::write_cursor(&mut record, cursor),
            Err(e) => {
                error!(source = %source, persist_name = %self.persist_name, error = %e, "Failed to store cursor");
                return;
            }
        }
        self.handle = Some(handle);
    }

    /// Existing record, if its size and header match the cursor record layout
    fn stored_record(&self, source: &str) -> Option<EntryHandle> {
        let entry = self.persist.lookup_entry(&self.persist_name)?;
        if entry.size < cursor_record::RECORD_SIZE {
            warn!(
                source = %source,
                persist_name = %self.persist_name,
                size = entry.size,
                "Persisted position record too small, recreating it"
            );
            return None;
        }

        let header_matches = self
            .persist
            .map_entry(entry.handle)
            .map(|record| cursor_record::header_matches(&record))
            .unwrap_or(false);
        if !header_matches {
            warn!(
                source = %source,
                persist_name = %self.persist_name,
                "Persisted position record has an unknown version or byte order, recreating it"
            );
            return None;
        }
        Some(entry.handle)
    }

    fn alloc_record(&self, source: &str) -> Option<EntryHandle> {
        let handle = match self
            .persist
            .alloc_entry(&self.persist_name, cursor_record::RECORD_SIZE)
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(source = %source, persist_name = %self.persist_name, error = %e, "Failed to allocate position record");
                return None;
            }
        };

        match self.persist.map_entry(handle) {
            Ok(mut record) => cursor_record::init(&mut record),
            Err(e) => {
                error!(source = %source, persist_name = %self.persist_name, error = %e, "Failed to initialize position record");
                return None;
            }
        }
        Some(handle)
    }

    fn seek_to_saved_state(&self, handle: EntryHandle, worker: &mut W, source: &str) {
        let stored = match self.persist.map_entry(handle) {
            Ok(record) => cursor_record::read_cursor(&record),
            Err(e) => {
                warn!(source = %source, error = %e, "Failed to read the saved cursor position");
                None
            }
        };

        let Some(cursor) = stored else {
            self.seek_to_start(worker, source);
            return;
        };

        if (self.ops.seek_to_cursor)(worker, Some(&cursor)) {
            debug!(source = %source, cursor = %cursor, "Seeking to the last cursor position");
        } else {
            warn!(source = %source, cursor = %cursor, "Failed to seek to the saved cursor position");
            self.seek_to_start(worker, source);
        }
    }

    fn seek_to_start(&self, worker: &mut W, source: &str) {
        if !(self.ops.seek_to_cursor)(worker, None) {
            warn!(source = %source, "Failed to seek to the start of the source");
        }
    }
}
