//! Periodic missing-track rescans.
//!
//! While a playlist downloads, files appear in its library folder one by one.
//! [`MissingTracksWatcher`] rescans the folder on a fixed interval and
//! publishes the missing set on a `watch` channel whenever it changes, so a
//! front-end can subscribe instead of polling itself.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::library::missing_tracks;
use crate::snapshot::{SnapshotId, SnapshotStore};
use crate::view::MissingSummary;

/// Default time between rescans.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Missing-track state of one playlist at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTracksUpdate {
    /// Snapshot id.
    pub id: SnapshotId,
    /// Playlist title.
    pub list_name: String,
    /// Number of tracks in the snapshot.
    pub expected: usize,
    /// Expected file names not present in the library folder.
    pub missing: BTreeSet<String>,
}

impl MissingTracksUpdate {
    /// Missing-track headline.
    #[must_use]
    pub fn summary(&self) -> MissingSummary {
        MissingSummary::from_count(self.missing.len())
    }
}

/// Handle to a running watcher.
pub struct WatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop the watcher and wait for its task to end.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!("Missing-track watcher ended abnormally: {}", e);
        }
    }
}

/// Rescans one playlist's library folder on an interval.
pub struct MissingTracksWatcher {
    store: SnapshotStore,
    id: SnapshotId,
    library_root: PathBuf,
    interval: Duration,
}

impl MissingTracksWatcher {
    /// Create a watcher with the default interval.
    #[must_use]
    pub const fn new(store: SnapshotStore, id: SnapshotId, library_root: PathBuf) -> Self {
        Self {
            store,
            id,
            library_root,
            interval: DEFAULT_RESCAN_INTERVAL,
        }
    }

    /// Use a custom rescan interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Scan once.
    ///
    /// The snapshot is reloaded every time so a re-sync is picked up. Returns
    /// `None` when the snapshot is gone, empty or unreadable.
    #[must_use]
    pub fn scan_once(&self) -> Option<MissingTracksUpdate> {
        let snapshot = match self.store.load(&self.id) {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                warn!("Cannot rescan {}: {}", self.id, e);
                return None;
            }
        };

        Some(MissingTracksUpdate {
            id: self.id.clone(),
            missing: missing_tracks(&snapshot, &self.library_root),
            expected: snapshot.tracks.len(),
            list_name: snapshot.list_name,
        })
    }

    /// Start rescanning in a background task.
    ///
    /// The first scan runs immediately and is always published, even when it
    /// finds no snapshot. After that the receiver is updated only when the
    /// result differs from the previous one. The
    /// task ends when the handle is stopped or every receiver is dropped.
    #[must_use]
    pub fn start(self) -> (watch::Receiver<Option<MissingTracksUpdate>>, WatcherHandle) {
        let (update_tx, update_rx) = watch::channel(None);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut timer = interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut first = true;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Missing-track watcher for {} shutting down", self.id);
                        break;
                    }
                    () = update_tx.closed() => {
                        debug!("Missing-track watcher for {} has no subscribers", self.id);
                        break;
                    }
                    _ = timer.tick() => {
                        let update = self.scan_once();
                        if first {
                            first = false;
                            update_tx.send_replace(update);
                        } else {
                            update_tx.send_if_modified(|current| {
                                if *current == update {
                                    false
                                } else {
                                    *current = update;
                                    true
                                }
                            });
                        }
                    }
                }
            }
        });

        (update_rx, WatcherHandle { shutdown_tx, task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Snapshot, Track};
    use std::fs;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn fixture() -> (TempDir, SnapshotStore, SnapshotId, PathBuf) {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let store = SnapshotStore::new(temp_dir.path().join("data")).expect("store");
        let library = temp_dir.path().join("library");

        let snapshot = Snapshot::new(
            "Gym",
            "https://music.youtube.com/playlist?list=PLgym",
            vec![
                Track::new("A", "One", 200, None),
                Track::new("B", "Two", 180, None),
            ],
        );
        let id = SnapshotId::for_url(&snapshot.list_url);
        store.save(&id, &snapshot).expect("save");
        (temp_dir, store, id, library)
    }

    async fn next_update(
        rx: &mut watch::Receiver<Option<MissingTracksUpdate>>,
    ) -> Option<MissingTracksUpdate> {
        tokio::time::timeout(WAIT, rx.changed())
            .await
            .expect("update in time")
            .expect("watcher alive");
        rx.borrow_and_update().clone()
    }

    #[test]
    fn test_scan_once() {
        let (_dir, store, id, library) = fixture();
        let watcher = MissingTracksWatcher::new(store, id.clone(), library);

        let update = watcher.scan_once().expect("snapshot exists");
        assert_eq!(update.id, id);
        assert_eq!(update.list_name, "Gym");
        assert_eq!(update.expected, 2);
        assert_eq!(update.summary(), MissingSummary::Missing(2));
    }

    #[test]
    fn test_scan_once_without_snapshot() {
        let (_dir, store, _id, library) = fixture();
        let watcher = MissingTracksWatcher::new(store, SnapshotId::for_url("other"), library);
        assert!(watcher.scan_once().is_none());
    }

    #[tokio::test]
    async fn test_publishes_changes() {
        let (_dir, store, id, library) = fixture();
        let (mut rx, handle) = MissingTracksWatcher::new(store, id, library.clone())
            .with_interval(Duration::from_millis(50))
            .start();

        let first = next_update(&mut rx).await.expect("initial scan");
        assert_eq!(first.missing.len(), 2);

        let folder = library.join("Gym");
        fs::create_dir_all(&folder).expect("mkdir");
        fs::write(folder.join("A - One.mp3"), b"ID3").expect("write");

        let second = next_update(&mut rx).await.expect("rescan");
        assert_eq!(
            second.missing.into_iter().collect::<Vec<_>>(),
            vec!["B - Two.mp3".to_string()]
        );

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_first_scan_published_without_snapshot() {
        let (_dir, store, _id, library) = fixture();
        let (mut rx, handle) =
            MissingTracksWatcher::new(store, SnapshotId::for_url("gone"), library)
                .with_interval(Duration::from_millis(20))
                .start();

        assert!(next_update(&mut rx).await.is_none());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_publishes_removal() {
        let (_dir, store, id, library) = fixture();
        let (mut rx, handle) = MissingTracksWatcher::new(store.clone(), id.clone(), library)
            .with_interval(Duration::from_millis(50))
            .start();

        assert!(next_update(&mut rx).await.is_some());
        store.delete(&id).expect("delete");
        assert!(next_update(&mut rx).await.is_none());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stops_when_receivers_dropped() {
        let (_dir, store, id, library) = fixture();
        let (rx, handle) = MissingTracksWatcher::new(store, id, library)
            .with_interval(Duration::from_millis(50))
            .start();
        drop(rx);

        tokio::time::timeout(WAIT, handle.task)
            .await
            .expect("task ends")
            .expect("task ok");
    }
}
