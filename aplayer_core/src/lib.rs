//! APlayer client core: the module loading/playback protocol engine, the
//! add-on plugin contracts, the shared player-info state, and the
//! background duration scanner.
//!
//! The GUI lives elsewhere; it drives the [`worker::LoaderWorker`] with
//! fire-and-forget requests and reads [`player_info::PlayerInfoState`]
//! back through its shared handle.

pub use aplayer_protocol::{
    encode_error, parse_response, AddOnCategory, AddOnInfo, AddOnSupport, Command, MixerSettings,
    ProtocolError, ServerError, UNCHANGED,
};

pub mod addon;
pub mod attributes;
pub mod config;
pub mod extra_files;
pub mod loader;
pub mod player_info;
pub mod playlist;
pub mod policy;
pub mod registry;
pub mod scanner;
pub mod session;
pub mod transport;
pub mod worker;

pub use addon::{AgentAddOn, ClientAddOn, ConverterAddOn, PlayerAddOn};
pub use attributes::{AttributeStore, JsonAttributeStore, MemoryAttributeStore};
pub use config::{ErrorPolicy, ListEndPolicy, Settings};
pub use loader::{Loader, LoaderError, DEFAULT_START_POS, DEFAULT_SUB_SONG};
pub use player_info::{PlayerInfo, PlayerInfoState, DEFAULT_VOLUME, TIME_UNAVAILABLE};
pub use playlist::{PlaylistView, SimplePlaylist};
pub use registry::{AddOnInstance, AddOnRegistry};
pub use scanner::{FileScanner, ScanRange};
pub use session::{ModuleSession, SessionState};
pub use transport::{LineTransport, ServerTransport, TransportError};
pub use worker::{LoaderRequest, LoaderWorker};
