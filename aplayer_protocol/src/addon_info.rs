use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Which capability contract an add-on binary implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnCategory {
    Player,
    Agent,
    Client,
    Converter,
}

bitflags! {
    /// Capability flags advertised per add-on sub-variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AddOnSupport: u32 {
        /// The add-on can open a display window.
        const DISPLAY_WINDOW  = 1 << 0;
        /// The add-on can open a settings window.
        const SETTINGS_WINDOW = 1 << 1;
        /// Converter supports the loader (decode) role.
        const LOADER          = 1 << 2;
        /// Converter supports the saver (encode) role.
        const SAVER           = 1 << 3;
        /// Agent can act as an output routing target.
        const OUTPUT_AGENT    = 1 << 4;
        /// Player positions can be changed mid-song.
        const SET_POSITION    = 1 << 5;
    }
}

/// Static descriptor of a discovered add-on. Immutable after discovery;
/// protocol commands refer to add-ons by `name`, never by reference across
/// the process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOnInfo {
    pub name: String,
    pub description: String,
    pub version: f32,
    pub category: AddOnCategory,
    pub flags: AddOnSupport,
}
