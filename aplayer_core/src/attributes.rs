//! Persisted per-file duration attribute.
//!
//! The original stored a human-readable "minutes:seconds" string as a file
//! attribute; the portable stand-in is a JSON cache keyed by absolute
//! path, behind a trait so an embedding can plug in a real xattr store.
//! Writes are best-effort throughout: a failed write never blocks playback
//! control flow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("attribute store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("attribute store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub trait AttributeStore: Send {
    /// Stored "m:ss" duration string for `path`, if any.
    fn duration(&self, path: &Path) -> Option<String>;

    fn set_duration(&mut self, path: &Path, value: &str) -> Result<(), AttributeError>;
}

/// Format milliseconds as the stored "m:ss" attribute string.
pub fn format_duration(millis: i64) -> String {
    let total_secs = (millis.max(0) + 500) / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Parse an "m:ss" attribute string back to milliseconds.
pub fn parse_duration(value: &str) -> Option<i64> {
    let (mins, secs) = value.split_once(':')?;
    let mins: i64 = mins.trim().parse().ok()?;
    let secs: i64 = secs.trim().parse().ok()?;
    if mins < 0 || !(0..60).contains(&secs) {
        return None;
    }
    Some((mins * 60 + secs) * 1000)
}

/// Duration cache persisted as a JSON file. Every write saves the whole
/// map; the cache is small and writes are rare.
pub struct JsonAttributeStore {
    file: PathBuf,
    entries: HashMap<String, String>,
}

impl JsonAttributeStore {
    pub fn open(file: impl Into<PathBuf>) -> Result<Self, AttributeError> {
        let file = file.into();
        let entries = match std::fs::read_to_string(&file) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { file, entries })
    }

    fn save(&self) -> Result<(), AttributeError> {
        let text = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.file, text)?;
        Ok(())
    }
}

impl AttributeStore for JsonAttributeStore {
    fn duration(&self, path: &Path) -> Option<String> {
        self.entries.get(&path.to_string_lossy().into_owned()).cloned()
    }

    fn set_duration(&mut self, path: &Path, value: &str) -> Result<(), AttributeError> {
        self.entries
            .insert(path.to_string_lossy().into_owned(), value.to_string());
        self.save()
    }
}

/// Non-persisting store for tests and for clients that opt out of
/// attribute writes.
#[derive(Debug, Default)]
pub struct MemoryAttributeStore {
    entries: HashMap<PathBuf, String>,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AttributeStore for MemoryAttributeStore {
    fn duration(&self, path: &Path) -> Option<String> {
        self.entries.get(path).cloned()
    }

    fn set_duration(&mut self, path: &Path, value: &str) -> Result<(), AttributeError> {
        self.entries.insert(path.to_path_buf(), value.to_string());
        Ok(())
    }
}
