//! Persisted key/value store of fixed-size, versioned records.
//!
//! Every record is allocated once under a name and then accessed through a
//! scoped mapping: `map_entry` hands out a guard over the record bytes and
//! dropping the guard unmaps it. Mappings of all records are serialized
//! against each other, so a bookmark commit arriving from an acknowledging
//! thread never interleaves with a seek or cursor overwrite on the worker
//! thread.
//!
//! A store opened from a file keeps working in memory and writes a snapshot
//! back on `commit`.

pub mod cursor_record;

use crate::{SourceError, SourceResult};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot format written by `commit`
const SNAPSHOT_VERSION: u8 = 1;

/// Handle of an allocated record, valid for the lifetime of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(usize);

/// Result of a successful `lookup_entry`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    pub handle: EntryHandle,
    pub size: usize,
    pub version: u8,
}

/// Scoped view of a record; dropping it unmaps the record
pub type MappedEntry<'a> = MappedMutexGuard<'a, [u8]>;

/// Key -> fixed-size record store
#[derive(Debug)]
pub struct PersistState {
    entries: Mutex<Vec<Entry>>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    name: String,
    version: u8,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u8,
    entries: Vec<Entry>,
}

impl PersistState {
    /// Create a store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            path: None,
        }
    }

    /// Open a file-backed store, loading the snapshot if the file exists
    pub fn open(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let content = std::fs::read(&path).map_err(|e| {
                SourceError::persist(format!(
                    "Failed to read persist file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let snapshot: Snapshot = serde_json::from_slice(&content).map_err(|e| {
                SourceError::persist(format!(
                    "Failed to parse persist file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(SourceError::persist(format!(
                    "Unsupported persist file version {} in {}",
                    snapshot.version,
                    path.display()
                )));
            }
            debug!(path = %path.display(), entries = snapshot.entries.len(), "Loaded persist state");
            snapshot.entries
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    /// File backing this store, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Find the record stored under `name`
    pub fn lookup_entry(&self, name: &str) -> Option<EntryInfo> {
        let entries = self.entries.lock();
        entries
            .iter()
            .position(|e| e.name == name)
            .and_then(|idx| {
                entries.get(idx).map(|e| EntryInfo {
                    handle: EntryHandle(idx),
                    size: e.data.len(),
                    version: e.version,
                })
            })
    }

    /// Allocate a zeroed record of `size` bytes under `name`
    ///
    /// An existing record with the same name is replaced in place and keeps
    /// its handle.
    pub fn alloc_entry(&self, name: &str, size: usize) -> SourceResult<EntryHandle> {
        if size == 0 {
            return Err(SourceError::persist(format!(
                "Cannot allocate an empty record for {}",
                name
            )));
        }

        let mut entries = self.entries.lock();
        let entry = Entry {
            name: name.to_string(),
            version: cursor_record::RECORD_VERSION,
            data: vec![0; size],
        };

        match entries.iter().position(|e| e.name == name) {
            Some(idx) => {
                entries[idx] = entry;
                Ok(EntryHandle(idx))
            }
            None => {
                entries.push(entry);
                Ok(EntryHandle(entries.len() - 1))
            }
        }
    }

    /// Map a record for scoped access
    pub fn map_entry(&self, handle: EntryHandle) -> SourceResult<MappedEntry<'_>> {
        MutexGuard::try_map(self.entries.lock(), |entries| {
            entries.get_mut(handle.0).map(|e| e.data.as_mut_slice())
        })
        .map_err(|_| SourceError::persist(format!("Unknown persist entry handle {}", handle.0)))
    }

    /// Write a snapshot of all records to the backing file
    ///
    /// The snapshot goes to a temporary file first, is synced to disk and
    /// then renamed over the previous one. A no-op for in-memory stores.
    pub fn commit(&self) -> SourceResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries: self.entries.lock().clone(),
        };
        let content = serde_json::to_vec(&snapshot)?;

        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&content)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, path)?;

        debug!(path = %path.display(), entries = snapshot.entries.len(), "Persist state committed");
        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
