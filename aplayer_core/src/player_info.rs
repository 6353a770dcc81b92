//! Shared snapshot of what is currently playing.
//!
//! Exactly one [`PlayerInfoState`] exists per running client. The loader
//! writes it during the playback-start sequence; UI code reads it on
//! demand. A single plain mutex serializes all access; one writer and
//! occasional readers make reader/writer locking not worth it.

use std::sync::{Mutex, MutexGuard};

/// Sentinel for "time unavailable", in milliseconds.
pub const TIME_UNAVAILABLE: i64 = -1;

/// Initial master volume.
pub const DEFAULT_VOLUME: u16 = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub has_info: bool,
    pub is_playing: bool,
    pub is_muted: bool,
    pub can_change_position: bool,

    pub current_song: u16,
    pub max_song_number: u16,
    pub module_channels: u16,

    pub song_length: i16,
    pub song_position: i16,
    pub total_time_ms: i64,
    /// Playback time at each module position, in milliseconds.
    pub position_times_ms: Vec<i64>,

    pub module_name: String,
    pub author: String,
    pub file_name: String,
    pub module_format: String,
    pub player_name: String,
    pub output_agent: String,
    pub module_size: i64,

    /// Free-form `"description\tvalue"` lines, in server order.
    pub info_lines: Vec<String>,

    pub volume: u16,
}

impl Default for PlayerInfo {
    fn default() -> Self {
        Self {
            has_info: false,
            is_playing: false,
            is_muted: false,
            can_change_position: false,
            current_song: 0,
            max_song_number: 0,
            module_channels: 0,
            song_length: 0,
            song_position: 0,
            total_time_ms: 0,
            position_times_ms: Vec::new(),
            module_name: String::new(),
            author: String::new(),
            file_name: String::new(),
            module_format: String::new(),
            player_name: String::new(),
            output_agent: String::new(),
            module_size: 0,
            info_lines: Vec::new(),
            volume: DEFAULT_VOLUME,
        }
    }
}

/// The shared state object. Per-field accessors take the lock on their
/// own, so a sequence of setter calls is not atomic as a whole; callers
/// needing a consistent multi-field update hold [`PlayerInfoState::lock`]
/// across the whole sequence, as the loader's start-playing commit does.
#[derive(Default)]
pub struct PlayerInfoState {
    inner: Mutex<PlayerInfo>,
}

impl PlayerInfoState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scoped exclusive access for multi-field reads or writes.
    pub fn lock(&self) -> MutexGuard<'_, PlayerInfo> {
        // A panic while holding the guard only poisons; the data is still
        // the last consistent snapshot.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Clear every field back to its default except the master volume.
    /// Called when the last module is freed.
    pub fn reset_info(&self) {
        let mut info = self.lock();
        let volume = info.volume;
        *info = PlayerInfo {
            volume,
            ..PlayerInfo::default()
        };
    }

    pub fn has_info(&self) -> bool {
        self.lock().has_info
    }

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing
    }

    pub fn set_is_playing(&self, playing: bool) {
        self.lock().is_playing = playing;
    }

    pub fn is_muted(&self) -> bool {
        self.lock().is_muted
    }

    pub fn set_is_muted(&self, muted: bool) {
        self.lock().is_muted = muted;
    }

    pub fn can_change_position(&self) -> bool {
        self.lock().can_change_position
    }

    pub fn current_song(&self) -> u16 {
        self.lock().current_song
    }

    pub fn max_song_number(&self) -> u16 {
        self.lock().max_song_number
    }

    pub fn module_channels(&self) -> u16 {
        self.lock().module_channels
    }

    pub fn song_length(&self) -> i16 {
        self.lock().song_length
    }

    pub fn song_position(&self) -> i16 {
        self.lock().song_position
    }

    pub fn set_song_position(&self, position: i16) {
        self.lock().song_position = position;
    }

    pub fn total_time_ms(&self) -> i64 {
        self.lock().total_time_ms
    }

    pub fn module_name(&self) -> String {
        self.lock().module_name.clone()
    }

    pub fn author(&self) -> String {
        self.lock().author.clone()
    }

    pub fn file_name(&self) -> String {
        self.lock().file_name.clone()
    }

    pub fn module_format(&self) -> String {
        self.lock().module_format.clone()
    }

    pub fn player_name(&self) -> String {
        self.lock().player_name.clone()
    }

    pub fn output_agent(&self) -> String {
        self.lock().output_agent.clone()
    }

    pub fn module_size(&self) -> i64 {
        self.lock().module_size
    }

    pub fn volume(&self) -> u16 {
        self.lock().volume
    }

    pub fn set_volume(&self, volume: u16) {
        self.lock().volume = volume;
    }

    pub fn info_line_count(&self) -> usize {
        self.lock().info_lines.len()
    }

    /// Time at a given module position. Returns [`TIME_UNAVAILABLE`] when
    /// the table is empty or the position falls outside it.
    pub fn position_time_ms(&self, position: i32) -> i64 {
        if position < 0 {
            return TIME_UNAVAILABLE;
        }
        self.lock()
            .position_times_ms
            .get(position as usize)
            .copied()
            .unwrap_or(TIME_UNAVAILABLE)
    }

    /// Split stored info line `line` on its first tab. `None` when the
    /// index is out of range or the line has no separator.
    pub fn module_information(&self, line: usize) -> Option<(String, String)> {
        let info = self.lock();
        let raw = info.info_lines.get(line)?;
        let (description, value) = raw.split_once('\t')?;
        Some((description.to_string(), value.to_string()))
    }
}
