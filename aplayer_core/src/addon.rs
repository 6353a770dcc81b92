//! Capability contracts for server-side add-ons.
//!
//! Every add-on binary implements one of four contracts (player, converter,
//! agent or client) on top of a shared base. The host serializes calls per
//! instance; distinct instances of the same add-on may run concurrently in
//! different sessions, so all traits are `Send`.

use std::fs::File;

use aplayer_protocol::AddOnSupport;

/// Optional descriptor for an add-on's settings surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigInfo {
    pub description: String,
}

/// Optional descriptor for an add-on's display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub title: String,
}

/// Sub-song layout of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubSongs {
    pub count: u16,
    pub default_song: u16,
}

/// Result of a converter sniffing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCheck {
    Unknown,
    Ok,
    Error,
}

/// Sample stream descriptor produced by a converter's loader role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub total_samples: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum AddOnError {
    #[error("i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported data: {0}")]
    Unsupported(String),
    #[error("agent command failed: {0}")]
    Agent(String),
}

/// Base contract shared by all four capability types.
pub trait AddOnBase: Send {
    fn version(&self) -> f32;

    fn config_info(&self) -> Option<ConfigInfo> {
        None
    }

    fn display_info(&self) -> Option<DisplayInfo> {
        None
    }

    /// Number of sub-variants this add-on binary exposes.
    fn count(&self) -> usize {
        1
    }

    fn support_flags(&self, index: usize) -> AddOnSupport;
}

/// A module-format player. Stateful per loaded instance.
pub trait PlayerAddOn: AddOnBase {
    fn init_player(&mut self, index: usize) -> bool;
    fn end_player(&mut self, index: usize);
    fn init_sound(&mut self, index: usize, sub_song: u16);
    fn end_sound(&mut self, index: usize);

    /// Produce one quantum of audio into the virtual channel buffers. The
    /// real-time core of playback; implemented per format.
    fn play(&mut self);

    fn module_name(&self) -> String;
    fn author(&self) -> String;
    fn module_channels(&self) -> u16;

    fn virtual_channels(&self) -> u16 {
        self.module_channels()
    }

    fn sub_songs(&self) -> SubSongs;
    fn song_length(&self) -> i16;
    fn song_position(&self) -> i16;
    fn set_song_position(&mut self, position: i16);

    /// Total time plus the per-position time table for one sub-song, in
    /// milliseconds.
    fn time_table(&self, sub_song: u16) -> (i64, Vec<i64>);

    /// Sequential free-form info lines. A line index past the end means
    /// "no more lines", not an error.
    fn info_string(&self, line: usize) -> Option<(String, String)>;
}

/// A sample-data converter. May support the loader role, the saver role,
/// or both; players query [`AddOnBase::support_flags`] to find out which.
pub trait ConverterAddOn: AddOnBase {
    /// Format sniffing, used before committing to the loader role.
    fn file_check(&mut self, file: &mut File) -> FileCheck;

    fn loader_init(&mut self) -> Result<(), AddOnError>;
    fn loader_end(&mut self);
    fn load_header(&mut self, file: &mut File) -> Result<SampleFormat, AddOnError>;

    /// Fill `buffer` with up to `max_samples` decoded samples; returns the
    /// number actually filled.
    fn load_data(
        &mut self,
        file: &mut File,
        buffer: &mut [f32],
        max_samples: usize,
    ) -> Result<usize, AddOnError>;

    fn total_sample_length(&self) -> u64;

    /// Seek to `target` and return the sample actually landed on.
    fn set_sample_position(&mut self, file: &mut File, target: u64) -> u64;

    fn saver_init(&mut self) -> Result<(), AddOnError>;
    fn saver_end(&mut self);
    fn save_header(&mut self, file: &mut File, format: &SampleFormat) -> Result<(), AddOnError>;
    fn save_data(&mut self, file: &mut File, buffer: &[f32]) -> Result<(), AddOnError>;
    fn save_tail(&mut self, file: &mut File) -> Result<(), AddOnError>;
}

/// An agent runs ad-hoc server-side commands, e.g. output routing.
pub trait AgentAddOn: AddOnBase {
    fn init_agent(&mut self, index: usize) -> bool;
    fn end_agent(&mut self, index: usize);

    fn run(&mut self, index: usize, command: &str, args: &[&str]) -> Result<String, AddOnError>;

    /// Rank among multiple agents claiming the same role; higher wins.
    fn plugin_priority(&self, _flag: AddOnSupport) -> i8 {
        0
    }
}

/// Thin marker capability for UI-hosting add-ons.
pub trait ClientAddOn: AddOnBase {
    fn init_client(&mut self) -> bool;
    fn end_client(&mut self);
}
