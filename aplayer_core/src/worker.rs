//! The loader worker thread.
//!
//! The loader owns the session queue and the server connection; everything
//! else talks to it through fire-and-forget messages on a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aplayer_protocol::MixerSettings;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::loader::Loader;

pub const REQUEST_CAP: usize = 256;

const IDLE_TICK: Duration = Duration::from_millis(100);

/// Control actions accepted by the loader worker. All are fire-and-forget;
/// results land in the shared [`crate::player_info::PlayerInfoState`] and
/// the playlist view.
#[derive(Debug, Clone)]
pub enum LoaderRequest {
    LoadInitModule {
        index: usize,
        sub_song: Option<i16>,
        start_pos: Option<i16>,
        suppress_error: bool,
    },
    FreeCurrentModule,
    FreeExtraModules,
    FreeAllModules,
    StartSong(i16),
    Pause,
    Resume,
    Hold(bool),
    SetPosition(i16),
    SetVolume(u16),
    SetMixerSettings(MixerSettings),
    SetChannels {
        enabled: bool,
        start: u16,
        stop: u16,
    },
    SetChannelMask(Vec<bool>),
}

pub struct LoaderWorker {
    tx: Sender<LoaderRequest>,
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LoaderWorker {
    pub fn spawn(loader: Loader) -> Self {
        let (tx, rx) = bounded(REQUEST_CAP);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle = thread::spawn(move || run_loader(loader, rx, shutdown_for_thread));

        Self {
            tx,
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        }
    }

    /// Queue a request. Dropped (with a log line) when the worker is
    /// saturated; control actions are retryable by the user.
    pub fn request(&self, req: LoaderRequest) {
        if self.tx.try_send(req).is_err() {
            warn!("loader worker queue full, request dropped");
        }
    }

    pub fn sender(&self) -> Sender<LoaderRequest> {
        self.tx.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut handle) = self.join_handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for LoaderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loader(mut loader: Loader, rx: Receiver<LoaderRequest>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        let req = match rx.recv_timeout(IDLE_TICK) {
            Ok(req) => req,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if let Err(err) = dispatch(&mut loader, req) {
            // Fire-and-forget: failures were already resolved through the
            // error policy or belong in the log, not on a caller.
            debug!(error = %err, "loader request failed");
        }
    }
    loader.free_all_modules();
}

fn dispatch(
    loader: &mut Loader,
    req: LoaderRequest,
) -> Result<(), crate::loader::LoaderError> {
    match req {
        LoaderRequest::LoadInitModule {
            index,
            sub_song,
            start_pos,
            suppress_error,
        } => loader.load_init_module(index, sub_song, start_pos, suppress_error),
        LoaderRequest::FreeCurrentModule => {
            loader.free_current_module();
            Ok(())
        }
        LoaderRequest::FreeExtraModules => {
            loader.free_extra_modules();
            Ok(())
        }
        LoaderRequest::FreeAllModules => {
            loader.free_all_modules();
            Ok(())
        }
        LoaderRequest::StartSong(song) => loader.start_song(song),
        LoaderRequest::Pause => loader.pause(),
        LoaderRequest::Resume => loader.resume(),
        LoaderRequest::Hold(hold) => loader.hold(hold),
        LoaderRequest::SetPosition(pos) => loader.set_position(pos),
        LoaderRequest::SetVolume(vol) => loader.set_volume(vol),
        LoaderRequest::SetMixerSettings(mixer) => loader.set_mixer_settings(mixer),
        LoaderRequest::SetChannels {
            enabled,
            start,
            stop,
        } => loader.set_channels(enabled, start, stop),
        LoaderRequest::SetChannelMask(mask) => {
            loader.set_channel_mask(mask);
            Ok(())
        }
    }
}
