//! Ordered, persisted collection of loop bookmarks.
//!
//! The whole collection lives in one named record (a JSON array).  Every
//! mutation rewrites the record; `clear()` deletes it.  A missing record and a
//! record holding `[]` both load as an empty collection.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bookmark::{LoopBookmark, VideoId};
use crate::error::LoopError;

pub const DEFAULT_RECORD_NAME: &str = "loopSongs";

// ── record backends ───────────────────────────────────────────────────────────

/// Minimal named-record key-value store.
pub trait RecordStore {
    fn read(&self, name: &str) -> std::io::Result<Option<String>>;
    fn write(&mut self, name: &str, contents: &str) -> std::io::Result<()>;
    /// Removing an absent record is not an error.
    fn remove(&mut self, name: &str) -> std::io::Result<()>;
}

/// One `<name>.json` file per record under `dir`.
#[derive(Debug, Clone)]
pub struct FileRecords {
    dir: PathBuf,
}

impl FileRecords {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RecordStore for FileRecords {
    fn read(&self, name: &str) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, name: &str, contents: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(name), contents)
    }

    fn remove(&mut self, name: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.path_for(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-memory records, for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    records: HashMap<String, String>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(name: &str, contents: &str) -> Self {
        let mut records = HashMap::new();
        records.insert(name.to_string(), contents.to_string());
        Self { records }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.records.get(name).map(String::as_str)
    }
}

impl RecordStore for MemoryRecords {
    fn read(&self, name: &str) -> std::io::Result<Option<String>> {
        Ok(self.records.get(name).cloned())
    }

    fn write(&mut self, name: &str, contents: &str) -> std::io::Result<()> {
        self.records.insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> std::io::Result<()> {
        self.records.remove(name);
        Ok(())
    }
}

// ── collection ────────────────────────────────────────────────────────────────

pub struct CollectionStore<R: RecordStore = FileRecords> {
    records: R,
    record_name: String,
    items: Vec<LoopBookmark>,
}

impl<R: RecordStore> CollectionStore<R> {
    /// Read the persisted collection.  Never fails: an absent record is an
    /// empty collection, an unreadable one is logged and treated as empty.
    pub fn load(records: R, record_name: impl Into<String>) -> Self {
        let record_name = record_name.into();
        let items = match records.read(&record_name) {
            Ok(Some(content)) => match parse_record(&content) {
                Ok(items) => items,
                Err(e) => {
                    warn!("store: ignoring {}: {}", record_name, e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("store: cannot read {}: {}", record_name, e);
                Vec::new()
            }
        };
        info!("store: loaded {} bookmark(s) from {}", items.len(), record_name);
        Self {
            records,
            record_name,
            items,
        }
    }

    /// Insert, or overwrite in place when the video is already saved.
    pub fn upsert(&mut self, bookmark: LoopBookmark) -> Result<(), LoopError> {
        match self.position(&bookmark.video_id) {
            Some(idx) => {
                debug!("store: replacing {} at {}", bookmark.video_id, idx);
                self.items[idx] = bookmark;
            }
            None => {
                debug!("store: appending {}", bookmark.video_id);
                self.items.push(bookmark);
            }
        }
        self.persist()
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, video_id: &VideoId) -> Result<bool, LoopError> {
        let before = self.items.len();
        self.items.retain(|b| &b.video_id != video_id);
        let removed = self.items.len() != before;
        self.persist()?;
        Ok(removed)
    }

    /// Set the title of `video_id` to `new_title` trimmed.  Blank titles and
    /// unknown ids are ignored; returns whether the title changed hands.
    pub fn rename(&mut self, video_id: &VideoId, new_title: &str) -> Result<bool, LoopError> {
        let title = new_title.trim();
        if title.is_empty() {
            return Ok(false);
        }
        let Some(item) = self.items.iter_mut().find(|b| &b.video_id == video_id) else {
            return Ok(false);
        };
        item.title = title.to_string();
        self.persist()?;
        Ok(true)
    }

    /// Drop everything, including the persisted record itself.
    pub fn clear(&mut self) -> Result<(), LoopError> {
        self.items.clear();
        self.records.remove(&self.record_name)?;
        info!("store: cleared {}", self.record_name);
        Ok(())
    }

    pub fn get(&self, video_id: &VideoId) -> Option<&LoopBookmark> {
        self.items.iter().find(|b| &b.video_id == video_id)
    }

    pub fn position(&self, video_id: &VideoId) -> Option<usize> {
        self.items.iter().position(|b| &b.video_id == video_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoopBookmark> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[LoopBookmark] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    fn persist(&mut self) -> Result<(), LoopError> {
        let json = serde_json::to_string_pretty(&self.items).map_err(std::io::Error::from)?;
        if let Err(e) = self.records.write(&self.record_name, &json) {
            warn!("store: failed to persist {}: {}", self.record_name, e);
            return Err(e.into());
        }
        Ok(())
    }
}

fn parse_record(content: &str) -> Result<Vec<LoopBookmark>, LoopError> {
    Ok(serde_json::from_str(content)?)
}
