use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Snapshot of the first record registered for a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEntry {
    pub source_path: PathBuf,
    pub size: u64,
}

/// Content-addressed index mapping checksum to the first record seen with
/// it. All mutation goes through an internal mutex; first registration
/// wins and later ones are no-ops.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    inner: Mutex<HashMap<String, DuplicateEntry>>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the record's checksum. Records without a checksum never
    /// match anything.
    pub fn find_duplicate(&self, record: &FileRecord) -> Option<DuplicateEntry> {
        let checksum = record.checksum.as_deref()?;
        let map = self.inner.lock().expect("duplicate index poisoned");
        map.get(checksum).cloned()
    }

    /// Registers the record as the owner of its fingerprint. Returns the
    /// previously registered entry when one exists; registration is
    /// idempotent and the first caller wins.
    pub fn register(&self, record: &FileRecord) -> Option<DuplicateEntry> {
        let checksum = record.checksum.clone()?;
        let mut map = self.inner.lock().expect("duplicate index poisoned");
        if let Some(existing) = map.get(&checksum) {
            return Some(existing.clone());
        }
        map.insert(
            checksum,
            DuplicateEntry {
                source_path: record.source_path.clone(),
                size: record.size,
            },
        );
        None
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("duplicate index poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("duplicate index poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
