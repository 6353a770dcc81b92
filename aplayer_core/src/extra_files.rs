//! Fallback search for a module's companion files.
//!
//! Some formats keep sample data next to the module under a related name.
//! The search order is fixed: `name.ext` in three case variants, the same
//! three with any existing extension stripped from `name`, then the prefix
//! form `dir/ext.basename` in three case variants. The first existing file
//! wins.

use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ExtraFileError {
    #[error("no extra file found for {name:?} with extension {ext:?}")]
    FileNotFound { name: String, ext: String },
    #[error("open failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Tracks every extra file opened for one player instance; the summed
/// sizes feed the module-size accounting.
#[derive(Debug, Default)]
pub struct ExtraFiles {
    total_size: u64,
}

impl ExtraFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `name` with extension `ext` inside `dir`, trying the documented
    /// fallback order. The opened file's size accumulates into
    /// [`ExtraFiles::total_size`].
    pub fn open(&mut self, dir: &Path, name: &str, ext: &str) -> Result<File, ExtraFileError> {
        for candidate in candidates(dir, name, ext) {
            if candidate.is_file() {
                let file = File::open(&candidate)?;
                if let Ok(meta) = file.metadata() {
                    self.total_size += meta.len();
                }
                return Ok(file);
            }
        }
        Err(ExtraFileError::FileNotFound {
            name: name.to_string(),
            ext: ext.to_string(),
        })
    }

    /// Release a file opened with [`ExtraFiles::open`]. The size stays
    /// counted; closing does not undo the accumulation.
    pub fn close(&mut self, file: File) {
        drop(file);
    }

    /// Summed size of every extra file opened so far.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

fn candidates(dir: &Path, name: &str, ext: &str) -> Vec<PathBuf> {
    let variants = [ext.to_lowercase(), ext.to_uppercase(), capitalize(ext)];

    let mut out = Vec::new();
    for v in &variants {
        out.push(dir.join(format!("{name}.{v}")));
    }
    if let Some(stripped) = strip_extension(name) {
        for v in &variants {
            out.push(dir.join(format!("{stripped}.{v}")));
        }
    }
    let basename = strip_extension(name).unwrap_or(name);
    for v in &variants {
        out.push(dir.join(format!("{v}.{basename}")));
    }
    out
}

fn strip_extension(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => Some(stem),
        _ => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
