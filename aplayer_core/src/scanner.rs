//! Background duration prefetch.
//!
//! Whenever items are added to or reordered within the playable list the
//! scanner walks the affected range: a stored duration attribute satisfies
//! an item without touching any decoder; on a miss it runs one isolated
//! probe session through the protocol engine and optionally writes the
//! attribute back. The stop flag is re-checked between items, so shutdown
//! is honored within one item's processing latency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::attributes::{format_duration, parse_duration, AttributeStore};
use crate::loader::Loader;
use crate::playlist::{lock_with_timeout, PlaylistView, VIEW_LOCK_TIMEOUT};

pub const SCAN_QUEUE_CAP: usize = 64;

const IDLE_TICK: Duration = Duration::from_millis(100);

/// Inclusive index range of list items to scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanRange {
    pub first: usize,
    pub last: usize,
}

pub struct FileScanner {
    tx: Sender<ScanRange>,
    enabled: bool,
    stop: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FileScanner {
    /// Spawn the scanner with its own loader (and thus its own server
    /// connection): probe sessions stay fully independent of playback.
    /// The `scan_files_on_add` and `save_durations` gates come from the
    /// loader's settings.
    pub fn spawn(
        loader: Loader,
        view: Arc<Mutex<dyn PlaylistView>>,
        attributes: Arc<Mutex<dyn AttributeStore>>,
    ) -> Self {
        let enabled = loader.settings().scan_files_on_add;
        let save_durations = loader.settings().save_durations;
        let (tx, rx) = bounded(SCAN_QUEUE_CAP);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);

        let join_handle = thread::spawn(move || {
            run_scanner(loader, view, attributes, save_durations, rx, stop_for_thread)
        });

        Self {
            tx,
            enabled,
            stop,
            join_handle: Mutex::new(Some(join_handle)),
        }
    }

    /// Queue a range for scanning. Dropped when scanning is disabled by
    /// settings, and silently dropped when the queue is full (a later list
    /// change will queue it again).
    pub fn scan(&self, range: ScanRange) {
        if !self.enabled {
            return;
        }
        let _ = self.tx.try_send(range);
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Ok(mut handle) = self.join_handle.lock() {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for FileScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_scanner(
    mut loader: Loader,
    view: Arc<Mutex<dyn PlaylistView>>,
    attributes: Arc<Mutex<dyn AttributeStore>>,
    save_durations: bool,
    rx: Receiver<ScanRange>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let range = match rx.recv_timeout(IDLE_TICK) {
            Ok(range) => range,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        scan_range(
            &mut loader,
            &view,
            &attributes,
            save_durations,
            range,
            &stop,
        );
    }
}

fn scan_range(
    loader: &mut Loader,
    view: &Arc<Mutex<dyn PlaylistView>>,
    attributes: &Arc<Mutex<dyn AttributeStore>>,
    save_durations: bool,
    range: ScanRange,
    stop: &AtomicBool,
) {
    for index in range.first..=range.last {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let Some(path) = lock_with_timeout(view, VIEW_LOCK_TIMEOUT)
            .and_then(|v| v.item_path(index))
        else {
            continue;
        };

        // Fast path: a previously stored attribute, no decoder involved.
        let stored = lock_with_timeout(attributes, VIEW_LOCK_TIMEOUT)
            .and_then(|a| a.duration(&path))
            .and_then(|s| parse_duration(&s));
        if let Some(millis) = stored {
            trace!(?path, millis, "duration attribute hit");
            set_item_duration(view, index, millis);
            continue;
        }

        if stop.load(Ordering::Relaxed) {
            return;
        }
        match loader.probe_total_time(&path) {
            Ok(millis) => {
                set_item_duration(view, index, millis);
                if save_durations {
                    if let Some(mut attrs) = lock_with_timeout(attributes, VIEW_LOCK_TIMEOUT) {
                        if let Err(err) = attrs.set_duration(&path, &format_duration(millis)) {
                            debug!(error = %err, "duration attribute write failed");
                        }
                    }
                }
            }
            Err(err) => {
                debug!(?path, error = %err, "duration probe failed");
            }
        }
    }
}

fn set_item_duration(view: &Arc<Mutex<dyn PlaylistView>>, index: usize, millis: i64) {
    if let Some(mut view) = lock_with_timeout(view, VIEW_LOCK_TIMEOUT) {
        view.set_duration_ms(index, millis);
        view.refresh_windows();
    }
}
