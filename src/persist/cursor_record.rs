//! Layout of the persisted position record.
//!
//! ```text
//! +---------+------------+------------------------------------------+
//! | version | big endian | cursor, NUL terminated (1024 byte area)  |
//! +---------+------------+------------------------------------------+
//! ```

/// Size of the cursor area, terminator included
pub const MAX_CURSOR_LENGTH: usize = 1024;

/// Format version written into fresh records
pub const RECORD_VERSION: u8 = 0;

const HEADER_LEN: usize = 2;

/// Total size of a position record
pub const RECORD_SIZE: usize = HEADER_LEN + MAX_CURSOR_LENGTH;

/// Initialize a freshly allocated record: header set, cursor empty
pub fn init(record: &mut [u8]) {
    record.fill(0);
    if let Some(header) = record.get_mut(..HEADER_LEN) {
        header[0] = RECORD_VERSION;
        header[1] = byte_order_tag();
    }
}

fn byte_order_tag() -> u8 {
    u8::from(cfg!(target_endian = "big"))
}

/// Whether the header carries the version and byte order written by `init`
pub fn header_matches(record: &[u8]) -> bool {
    record.get(..HEADER_LEN) == Some(&[RECORD_VERSION, byte_order_tag()][..])
}

/// Stored cursor; `None` when nothing was committed yet
pub fn read_cursor(record: &[u8]) -> Option<String> {
    let area = record.get(HEADER_LEN..)?;
    let end = area.iter().position(|b| *b == 0).unwrap_or(area.len());
    if end == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&area[..end]).into_owned())
}

/// Overwrite the stored cursor, truncating it to fit the record
pub fn write_cursor(record: &mut [u8], cursor: &str) {
    let Some(area) = record.get_mut(HEADER_LEN..) else {
        return;
    };
    let cursor = truncate(cursor, area.len().saturating_sub(1));
    area.fill(0);
    area[..cursor.len()].copy_from_slice(cursor.as_bytes());
}

/// Longest prefix of `cursor` that fits `max` bytes without splitting a character
pub fn truncate(cursor: &str, max: usize) -> &str {
    if cursor.len() <= max {
        return cursor;
    }
    let mut end = max;
    while !cursor.is_char_boundary(end) {
        end -= 1;
    }
    &cursor[..end]
}
