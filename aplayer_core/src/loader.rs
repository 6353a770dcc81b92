//! The protocol engine: drives one module session at a time through the
//! server-side load/play state machine and keeps the shared player info in
//! step.
//!
//! All protocol calls and session-queue mutations happen on whichever
//! thread owns the [`Loader`] (in production, the loader worker), so the
//! queue needs no locking. The invariant the whole engine is built around:
//! every `AddFile` is paired with exactly one `RemoveFile`, on success and
//! on every failure path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use aplayer_protocol::{
    parse_bool, parse_i16, parse_i32, parse_i64, parse_response, parse_time_list, Command,
    MixerSettings, ProtocolError, ServerError,
};
use tracing::{debug, trace, warn};

use crate::attributes::{format_duration, AttributeStore};
use crate::config::{ListEndPolicy, Settings};
use crate::player_info::PlayerInfoState;
use crate::playlist::{lock_with_timeout, PlaylistView, VIEW_LOCK_TIMEOUT};
use crate::policy::{self, ErrorPrompt, RecoveryAction, SkipPrompt};
use crate::session::{ModuleSession, SessionState};
use crate::transport::{ServerTransport, TransportError};

/// Sub-song argument meaning "let the module pick its default".
pub const DEFAULT_SUB_SONG: i16 = -1;

/// Start-position argument meaning "from the beginning".
pub const DEFAULT_START_POS: i16 = -1;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("server error {}: {}", .0.number, .0.message)]
    Server(ServerError),
    #[error("bad server payload: {0}")]
    Payload(ProtocolError),
}

impl From<ProtocolError> for LoaderError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Server(e) => LoaderError::Server(e),
            other => LoaderError::Payload(other),
        }
    }
}

pub struct Loader {
    transport: Box<dyn ServerTransport>,
    view: Arc<Mutex<dyn PlaylistView>>,
    attributes: Arc<Mutex<dyn AttributeStore>>,
    info: Arc<PlayerInfoState>,
    settings: Settings,
    prompt: Box<dyn ErrorPrompt>,
    sessions: Vec<ModuleSession>,
    enabled_channels: Vec<bool>,
}

impl Loader {
    pub fn new(
        transport: Box<dyn ServerTransport>,
        view: Arc<Mutex<dyn PlaylistView>>,
        attributes: Arc<Mutex<dyn AttributeStore>>,
        info: Arc<PlayerInfoState>,
        settings: Settings,
    ) -> Self {
        Self {
            transport,
            view,
            attributes,
            info,
            settings,
            prompt: Box::new(SkipPrompt),
            sessions: Vec::new(),
            enabled_channels: Vec::new(),
        }
    }

    /// Install the UI's error dialog for the `ShowError` policy.
    pub fn with_prompt(mut self, prompt: Box<dyn ErrorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn info(&self) -> &Arc<PlayerInfoState> {
        &self.info
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Replace the channel-enable mask applied on the next played load.
    pub fn set_channel_mask(&mut self, mask: Vec<bool>) {
        self.enabled_channels = mask;
    }

    // -- protocol plumbing ---------------------------------------------------

    fn call(&mut self, cmd: &Command) -> Result<String, LoaderError> {
        let wire = cmd.encode();
        trace!(command = %wire, "protocol call");
        let raw = self.transport.send_command(&wire)?;
        match parse_response(&raw) {
            Ok(payload) => Ok(payload.to_string()),
            Err(err) => {
                debug!(command = cmd.name(), number = err.number, message = %err.message,
                       "server rejected command");
                Err(LoaderError::Server(err))
            }
        }
    }

    /// Protocol call on an unwind path. Failures are logged and swallowed;
    /// the unwind must keep going so the Add/Remove pairing holds.
    fn call_unwind(&mut self, cmd: &Command) {
        if let Err(err) = self.call(cmd) {
            warn!(command = cmd.name(), error = %err, "reverse call failed during unwind");
        }
    }

    // -- lifecycle operations ------------------------------------------------

    /// Load the list item at `index` and drive it to the initialized state;
    /// with `sub_song` set, apply the channel mask and start playing. A
    /// playing load replaces the current session (the old one is freed
    /// first); without `sub_song` the module queues behind it as a
    /// pre-buffered "next".
    ///
    /// A UI lock timeout abandons the whole operation silently (this is the
    /// deliberate guard against deadlocking a busy UI). With
    /// `suppress_error` the failure is returned to the caller; otherwise
    /// the configured error-recovery policy resolves it and `Ok` is
    /// returned.
    pub fn load_init_module(
        &mut self,
        index: usize,
        sub_song: Option<i16>,
        start_pos: Option<i16>,
        suppress_error: bool,
    ) -> Result<(), LoaderError> {
        let Some(path) = self.view_item_path(index) else {
            return Ok(());
        };
        if sub_song.is_some() && !self.sessions.is_empty() {
            self.free_current_module();
        }
        match self.run_load_sequence(index, &path, sub_song, start_pos) {
            Ok(()) => Ok(()),
            Err(err) if suppress_error => Err(err),
            Err(err) => {
                self.recover(index, &err);
                Ok(())
            }
        }
    }

    fn run_load_sequence(
        &mut self,
        index: usize,
        path: &Path,
        sub_song: Option<i16>,
        start_pos: Option<i16>,
    ) -> Result<(), LoaderError> {
        let payload = self.call(&Command::AddFile {
            path: path.to_string_lossy().into_owned(),
        })?;
        let handle = parse_i32(&payload)?;
        let session = ModuleSession::new(
            index,
            handle,
            path.to_path_buf(),
            self.settings.output_agent.clone(),
        );
        // A playing load becomes the current session; pre-buffer loads
        // queue behind whatever is at index 0.
        let slot = if sub_song.is_some() {
            self.sessions.insert(0, session);
            0
        } else {
            self.sessions.push(session);
            self.sessions.len() - 1
        };

        if let Err(err) = self.advance_to_initialized(slot) {
            self.unwind_session(slot);
            return Err(err);
        }
        if let Some(song) = sub_song {
            if let Err(err) = self.apply_channel_mask(slot) {
                self.unwind_session(slot);
                return Err(err);
            }
            self.start_playing_at(slot, song, start_pos.unwrap_or(DEFAULT_START_POS))?;
        }
        Ok(())
    }

    fn advance_to_initialized(&mut self, slot: usize) -> Result<(), LoaderError> {
        let handle = self.sessions[slot].file_handle;
        self.call(&Command::LoadFile {
            handle,
            change_type: self.settings.change_file_type,
        })?;
        self.sessions[slot].state = SessionState::Loaded;

        self.call(&Command::SetMixerSettings {
            handle,
            mixer: self.settings.mixer,
        })?;
        let agent = self.sessions[slot].output_agent.clone();
        self.call(&Command::SetOutputAgent { handle, agent })?;
        self.sessions[slot].state = SessionState::Configured;

        self.call(&Command::InitPlayer { handle })?;
        self.sessions[slot].state = SessionState::Initialized;
        Ok(())
    }

    /// Collapse each maximal run of disabled channels into a single
    /// `ChangeChannels` call.
    fn apply_channel_mask(&mut self, slot: usize) -> Result<(), LoaderError> {
        let handle = self.sessions[slot].file_handle;
        let mask = self.enabled_channels.clone();
        let mut chan = 0;
        while chan < mask.len() {
            if mask[chan] {
                chan += 1;
                continue;
            }
            let start = chan;
            while chan < mask.len() && !mask[chan] {
                chan += 1;
            }
            self.call(&Command::ChangeChannels {
                handle,
                enabled: false,
                start: start as u16,
                stop: (chan - 1) as u16,
            })?;
        }
        Ok(())
    }

    /// Start playback of the session at `slot` and publish the module
    /// facts. On any failure the session is unwound here; the caller only
    /// decides recovery.
    fn start_playing_at(
        &mut self,
        slot: usize,
        sub_song: i16,
        start_pos: i16,
    ) -> Result<(), LoaderError> {
        let handle = self.sessions[slot].file_handle;
        if let Err(err) = self.call(&Command::StartPlayer {
            handle,
            sub_song,
            start_pos,
        }) {
            self.unwind_session(slot);
            return Err(err);
        }
        self.sessions[slot].state = SessionState::Playing;

        if let Err(err) = self.publish_player_info(slot, sub_song) {
            self.unwind_session(slot);
            return Err(err);
        }
        Ok(())
    }

    /// Query the fixed read-only fact sequence and commit it to the shared
    /// info under one lock guard, the one place that relies on the
    /// coarse-grained lock for multi-field atomicity.
    fn publish_player_info(&mut self, slot: usize, sub_song: i16) -> Result<(), LoaderError> {
        let handle = self.sessions[slot].file_handle;
        let list_index = self.sessions[slot].list_index;
        let path = self.sessions[slot].path.clone();
        let agent = self.sessions[slot].output_agent.clone();

        let song_length = parse_i16(&self.call(&Command::GetSongLength { handle })?)?;
        let song_position = parse_i16(&self.call(&Command::GetSongPosition { handle })?)?;
        let current_song = parse_i32(&self.call(&Command::GetCurrentSong { handle })?)?.max(0) as u16;
        let max_song = parse_i32(&self.call(&Command::GetMaxSongNumber { handle })?)?.max(0) as u16;
        let channels = parse_i32(&self.call(&Command::GetModuleChannels { handle })?)?.max(0) as u16;
        let total_time = parse_i64(&self.call(&Command::GetTotalTime { handle })?)?;
        let times = parse_time_list(&self.call(&Command::GetTimeList { handle })?)?;
        let module_size = parse_i64(&self.call(&Command::GetModuleSize { handle })?)?;
        let module_name = self.call(&Command::GetModuleName { handle })?;
        let author = self.call(&Command::GetAuthor { handle })?;
        let module_format = self.call(&Command::GetModuleFormat { handle })?;
        let player_name = self.call(&Command::GetPlayerName { handle })?;
        let can_change_position = parse_bool(&self.call(&Command::CanChangePosition { handle })?)?;
        let info_payload = self.call(&Command::GetModuleInformation { handle })?;

        {
            let mut info = self.info.lock();
            info.has_info = true;
            info.is_playing = true;
            info.can_change_position = can_change_position;
            info.current_song = current_song;
            info.max_song_number = max_song;
            info.module_channels = channels;
            info.song_length = song_length;
            info.song_position = song_position;
            info.total_time_ms = total_time;
            info.position_times_ms = times;
            info.module_name = module_name;
            info.author = author;
            info.file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info.module_format = module_format;
            info.player_name = player_name;
            info.output_agent = agent;
            info.module_size = module_size;
            info.info_lines = info_payload.lines().map(str::to_string).collect();
        }

        if let Some(mut view) = lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT) {
            view.select_playing(Some(list_index));
            view.set_duration_ms(list_index, total_time);
            view.refresh_windows();
        }

        // Opportunistic: remember the discovered total time when playing
        // the default sub-song. Failures never block playback.
        if self.settings.save_durations && sub_song == DEFAULT_SUB_SONG {
            if let Some(mut attrs) = lock_with_timeout(&self.attributes, VIEW_LOCK_TIMEOUT) {
                if let Err(err) = attrs.set_duration(&path, &format_duration(total_time)) {
                    debug!(error = %err, "duration attribute write failed");
                }
            }
        }
        Ok(())
    }

    /// Stop (if playing) and unwind the current session, reset the shared
    /// info, and tell dependent windows to refresh.
    pub fn free_current_module(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        self.unwind_session(0);
        self.info.reset_info();
        if let Some(mut view) = lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT) {
            view.select_playing(None);
            view.refresh_windows();
        }
    }

    /// Release every pre-buffered session, keeping the current one.
    pub fn free_extra_modules(&mut self) {
        while self.sessions.len() > 1 {
            self.unwind_session(self.sessions.len() - 1);
        }
    }

    /// Release every session including the current one.
    pub fn free_all_modules(&mut self) {
        while !self.sessions.is_empty() {
            self.unwind_session(0);
        }
        self.info.reset_info();
        if let Some(mut view) = lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT) {
            view.select_playing(None);
            view.refresh_windows();
        }
    }

    /// Sub-song navigation: stop the current song and restart at
    /// `song`.
    pub fn start_song(&mut self, song: i16) -> Result<(), LoaderError> {
        if self.sessions.is_empty() {
            return Ok(());
        }
        if self.sessions[0].state == SessionState::Playing {
            let handle = self.sessions[0].file_handle;
            self.call(&Command::StopPlayer { handle })?;
            self.sessions[0].state = SessionState::Initialized;
            self.info.set_is_playing(false);
        }
        self.start_playing_at(0, song, DEFAULT_START_POS)
    }

    // -- pass-throughs (no session ⇒ guarded no-op) --------------------------

    pub fn pause(&mut self) -> Result<(), LoaderError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::PausePlayer { handle })?;
        self.info.set_is_playing(false);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), LoaderError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::ResumePlayer { handle })?;
        self.info.set_is_playing(true);
        Ok(())
    }

    pub fn hold(&mut self, hold: bool) -> Result<(), LoaderError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::HoldPlaying { handle, hold })?;
        Ok(())
    }

    pub fn set_position(&mut self, position: i16) -> Result<(), LoaderError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::SetPosition { handle, position })?;
        self.info.set_song_position(position);
        Ok(())
    }

    pub fn set_volume(&mut self, volume: u16) -> Result<(), LoaderError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::SetVolume { handle, volume })?;
        self.info.set_volume(volume);
        Ok(())
    }

    pub fn set_mixer_settings(&mut self, mixer: MixerSettings) -> Result<(), LoaderError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::SetMixerSettings { handle, mixer })?;
        Ok(())
    }

    pub fn set_channels(
        &mut self,
        enabled: bool,
        start: u16,
        stop: u16,
    ) -> Result<(), LoaderError> {
        for chan in start..=stop {
            if let Some(flag) = self.enabled_channels.get_mut(chan as usize) {
                *flag = enabled;
            }
        }
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };
        self.call(&Command::ChangeChannels {
            handle,
            enabled,
            start,
            stop,
        })?;
        Ok(())
    }

    // -- metadata probe (used by the file scanner) ---------------------------

    /// Run one complete, isolated session lifecycle purely to learn a
    /// module's total time; playback is never started. The session-queue
    /// is untouched and the Add/Remove pairing holds on every path.
    pub fn probe_total_time(&mut self, path: &Path) -> Result<i64, LoaderError> {
        let payload = self.call(&Command::AddFile {
            path: path.to_string_lossy().into_owned(),
        })?;
        let handle = parse_i32(&payload)?;

        if let Err(err) = self.call(&Command::LoadFile {
            handle,
            change_type: false,
        }) {
            self.call_unwind(&Command::RemoveFile { handle });
            return Err(err);
        }
        if let Err(err) = self.call(&Command::InitPlayer { handle }) {
            self.call_unwind(&Command::UnloadFile { handle });
            self.call_unwind(&Command::RemoveFile { handle });
            return Err(err);
        }

        let total = self
            .call(&Command::GetTotalTime { handle })
            .and_then(|p| parse_i64(&p).map_err(LoaderError::from));

        self.call_unwind(&Command::EndPlayer { handle });
        self.call_unwind(&Command::UnloadFile { handle });
        self.call_unwind(&Command::RemoveFile { handle });
        total
    }

    // -- failure recovery ----------------------------------------------------

    /// Apply the configured error policy to a failed auto-advance load.
    fn recover(&mut self, failed_index: usize, err: &LoaderError) {
        let LoaderError::Server(server_err) = err else {
            // Transport trouble is not a per-module problem; deselect and
            // let the user retry once the server is reachable again.
            warn!(error = %err, "load failed below the protocol level");
            if let Some(mut view) = lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT) {
                view.select_playing(None);
                view.refresh_windows();
            }
            return;
        };

        let path = self
            .view_item_path(failed_index)
            .unwrap_or_else(PathBuf::new);
        let policy = self.settings.error_policy;
        let action = policy::resolve(policy, &mut *self.prompt, server_err, &path);
        debug!(index = failed_index, ?action, number = server_err.number,
               "recovering from failed load");

        let mut was_last = false;
        if let Some(mut view) = lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT) {
            view.select_playing(None);
            // Zero-duration marker: remembers the failure and feeds the
            // wrap-around guard below.
            view.set_duration_ms(failed_index, 0);
            was_last = failed_index + 1 >= view.len();
            if action == RecoveryAction::SkipAndRemove {
                view.remove_item(failed_index);
                was_last = failed_index >= view.len();
            }
            view.refresh_windows();
        }

        match action {
            RecoveryAction::Stop => {}
            RecoveryAction::Skip if !was_last => {
                let _ = self.load_init_module(failed_index + 1, Some(DEFAULT_SUB_SONG), None, false);
            }
            RecoveryAction::SkipAndRemove if !was_last => {
                // Removal shifted later items down; the next candidate now
                // sits at the failed index itself.
                let _ = self.load_init_module(failed_index, Some(DEFAULT_SUB_SONG), None, false);
            }
            RecoveryAction::Skip | RecoveryAction::SkipAndRemove => self.wrap_to_start(),
        }
    }

    /// List-end handling after a failed skip: jump back to the first item,
    /// unless it already carries a failure marker (the guard against
    /// spinning forever on an all-broken list).
    fn wrap_to_start(&mut self) {
        if self.settings.list_end != ListEndPolicy::JumpToStart {
            return;
        }
        let retry_first = match lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT) {
            Some(view) => !view.is_empty() && !view.has_zero_duration_marker(0),
            None => false,
        };
        if retry_first {
            let _ = self.load_init_module(0, Some(DEFAULT_SUB_SONG), None, false);
        }
    }

    // -- internals -----------------------------------------------------------

    fn current_handle(&self) -> Option<i32> {
        self.sessions.first().map(|s| s.file_handle)
    }

    fn view_item_path(&self, index: usize) -> Option<PathBuf> {
        let view = lock_with_timeout(&self.view, VIEW_LOCK_TIMEOUT)?;
        view.item_path(index)
    }

    /// Issue the minimal reverse calls for the session's current state and
    /// drop it from the queue. Reverse calls are best-effort, but
    /// `RemoveFile` always goes out.
    fn unwind_session(&mut self, slot: usize) {
        let session = self.sessions.remove(slot);
        let handle = session.file_handle;
        match session.state {
            SessionState::Playing => {
                self.call_unwind(&Command::StopPlayer { handle });
                self.call_unwind(&Command::EndPlayer { handle });
                self.call_unwind(&Command::UnloadFile { handle });
            }
            SessionState::Initialized => {
                self.call_unwind(&Command::EndPlayer { handle });
                self.call_unwind(&Command::UnloadFile { handle });
            }
            SessionState::Configured | SessionState::Loaded => {
                self.call_unwind(&Command::UnloadFile { handle });
            }
            SessionState::Added => {}
        }
        self.call_unwind(&Command::RemoveFile { handle });
    }
}
