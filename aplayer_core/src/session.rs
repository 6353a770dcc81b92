//! One loaded module's server-side lifecycle record.

use std::path::PathBuf;

/// Where a session currently sits in the load/play state machine. There is
/// no variant for "no session": a [`ModuleSession`] exists only between a
/// successful `AddFile` and its matching `RemoveFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Added,
    Loaded,
    Configured,
    Initialized,
    Playing,
}

/// The loader holds an ordered queue of these; index 0 is the currently
/// relevant (playing or about-to-play) session, later entries are modules
/// pre-buffered for double-buffered playback.
#[derive(Debug, Clone)]
pub struct ModuleSession {
    /// Back-reference to the UI list entry that requested this load.
    pub list_index: usize,
    /// Opaque token assigned by the server on `AddFile`; valid until the
    /// matching `RemoveFile`.
    pub file_handle: i32,
    pub path: PathBuf,
    pub output_agent: String,
    pub state: SessionState,
}

impl ModuleSession {
    pub fn new(list_index: usize, file_handle: i32, path: PathBuf, output_agent: String) -> Self {
        Self {
            list_index,
            file_handle,
            path,
            output_agent,
            state: SessionState::Added,
        }
    }
}
