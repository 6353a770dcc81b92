//! External-collaborator seam to the UI's playable list.
//!
//! The loader and the scanner never hold the UI lock indefinitely: list
//! access goes through [`lock_with_timeout`], and a miss means "abandon
//! this attempt silently" rather than block a busy or shutting-down UI.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Default bound on UI lock waits.
pub const VIEW_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// The narrow surface the core needs from the UI list.
pub trait PlaylistView: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the item at `index`, or `None` if the index is out of range.
    fn item_path(&self, index: usize) -> Option<PathBuf>;

    /// Delete the item at `index`; later items shift down by one.
    fn remove_item(&mut self, index: usize);

    /// Mark which item shows as playing; `None` deselects.
    fn select_playing(&mut self, index: Option<usize>);

    /// Stored duration for display, in milliseconds, if known.
    fn duration_ms(&self, index: usize) -> Option<i64>;

    fn set_duration_ms(&mut self, index: usize, millis: i64);

    /// Whether the item carries the zero-duration failure marker left
    /// behind by an earlier failed load.
    fn has_zero_duration_marker(&self, index: usize) -> bool {
        self.duration_ms(index) == Some(0)
    }

    /// Ask dependent windows to re-read shared state and redraw.
    fn refresh_windows(&mut self);
}

/// Bounded-wait lock acquisition against the UI worker. Returns `None`
/// when the lock could not be taken within `timeout`.
pub fn lock_with_timeout<T: ?Sized>(
    lock: &Mutex<T>,
    timeout: Duration,
) -> Option<MutexGuard<'_, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match lock.try_lock() {
            Ok(guard) => return Some(guard),
            Err(std::sync::TryLockError::Poisoned(p)) => return Some(p.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return None;
                }
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// In-memory list implementation. Stands in for the UI list in the mock
/// server binary and in tests; a real client wraps its list window instead.
#[derive(Debug, Default)]
pub struct SimplePlaylist {
    items: Vec<PlaylistItem>,
    playing: Option<usize>,
    refresh_count: usize,
}

#[derive(Debug, Clone)]
pub struct PlaylistItem {
    pub path: PathBuf,
    pub duration_ms: Option<i64>,
}

impl SimplePlaylist {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            items: paths
                .into_iter()
                .map(|p| PlaylistItem {
                    path: p.into(),
                    duration_ms: None,
                })
                .collect(),
            playing: None,
            refresh_count: 0,
        }
    }

    pub fn playing(&self) -> Option<usize> {
        self.playing
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_count
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }
}

impl PlaylistView for SimplePlaylist {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn item_path(&self, index: usize) -> Option<PathBuf> {
        self.items.get(index).map(|i| i.path.clone())
    }

    fn remove_item(&mut self, index: usize) {
        if index < self.items.len() {
            self.items.remove(index);
            // Keep the playing marker pointing at the same item.
            if let Some(playing) = self.playing {
                if playing == index {
                    self.playing = None;
                } else if playing > index {
                    self.playing = Some(playing - 1);
                }
            }
        }
    }

    fn select_playing(&mut self, index: Option<usize>) {
        self.playing = index;
    }

    fn duration_ms(&self, index: usize) -> Option<i64> {
        self.items.get(index).and_then(|i| i.duration_ms)
    }

    fn set_duration_ms(&mut self, index: usize, millis: i64) {
        if let Some(item) = self.items.get_mut(index) {
            item.duration_ms = Some(millis);
        }
    }

    fn refresh_windows(&mut self) {
        self.refresh_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn removal_shifts_playing_marker() {
        let mut list = SimplePlaylist::new(["/a.mod", "/b.mod", "/c.mod"]);
        list.select_playing(Some(2));
        list.remove_item(0);
        assert_eq!(list.playing(), Some(1));
        assert_eq!(list.item_path(1).unwrap(), PathBuf::from("/c.mod"));

        list.remove_item(1);
        assert_eq!(list.playing(), None);
    }

    #[test]
    fn lock_with_timeout_gives_up() {
        let lock = Arc::new(Mutex::new(()));
        let guard = lock.lock().unwrap();
        assert!(lock_with_timeout(&lock, Duration::from_millis(50)).is_none());
        drop(guard);
        assert!(lock_with_timeout(&lock, Duration::from_millis(50)).is_some());
    }
}
