//! Client settings, persisted as a JSON file.

use std::path::Path;

use aplayer_protocol::MixerSettings;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// What to do when a module fails to load or start during auto-advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Prompt with Skip / Skip-and-remove / Stop.
    #[default]
    ShowError,
    Skip,
    SkipAndRemove,
    Stop,
}

/// What to do after the last list item has played (or failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListEndPolicy {
    Stop,
    #[default]
    JumpToStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Mixer values applied on load; `-1` fields pass through unchanged.
    #[serde(default)]
    pub mixer: MixerSettings,
    /// Output agent applied on load; empty means the server default.
    #[serde(default)]
    pub output_agent: String,
    /// Ask the server to re-detect the file type on load.
    #[serde(default)]
    pub change_file_type: bool,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    #[serde(default)]
    pub list_end: ListEndPolicy,
    /// Run the background duration scan when items are added or reordered.
    #[serde(default)]
    pub scan_files_on_add: bool,
    /// Persist discovered durations back as file attributes.
    #[serde(default = "default_true")]
    pub save_durations: bool,
    /// Re-save the playable list on changes (best-effort).
    #[serde(default = "default_true")]
    pub remember_list: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mixer: MixerSettings::default(),
            output_agent: String::new(),
            change_file_type: false,
            error_policy: ErrorPolicy::default(),
            list_end: ListEndPolicy::default(),
            scan_files_on_add: false,
            save_durations: true,
            remember_list: true,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not
    /// exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
