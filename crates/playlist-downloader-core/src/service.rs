//! Playlist operations as the front-end sees them.
//!
//! [`PlaylistService`] ties the snapshot store, the downloader and the
//! library scanner together. Batch operations run one playlist at a time and
//! isolate failures: a playlist that cannot be fetched is recorded in the
//! [`BatchReport`] and the batch moves on.

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{info, warn};

use crate::config::AppContext;
use crate::downloader::{Downloader, output_template};
use crate::error::Result;
use crate::process::{OutputSink, ProcessExit};
use crate::snapshot::{SnapshotId, SnapshotStore};
use crate::url::normalize_urls;
use crate::view::PlaylistView;

/// Result of one playlist operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistOutcome {
    /// The downloader ran; see the exit for how it went.
    Completed(ProcessExit),
    /// Nothing to do.
    Skipped(String),
    /// The operation could not be carried out.
    Failed(String),
}

impl PlaylistOutcome {
    /// Whether the downloader ran and exited successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(exit) if exit.success())
    }
}

/// Outcome for one target of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// URL or snapshot id the operation was about.
    pub target: String,
    /// What happened.
    pub outcome: PlaylistOutcome,
}

/// Outcomes of a batch operation, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One entry per target.
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    fn push(&mut self, target: impl Into<String>, outcome: PlaylistOutcome) {
        self.entries.push(BatchEntry {
            target: target.into(),
            outcome,
        });
    }

    /// Number of targets whose downloader run succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    /// Number of skipped targets.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, PlaylistOutcome::Skipped(_)))
            .count()
    }

    /// Number of targets that failed or whose run did not succeed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded() - self.skipped()
    }

    /// Whether no target failed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Playlist operations over one library.
pub struct PlaylistService<D> {
    downloader: D,
    store: SnapshotStore,
    library_root: PathBuf,
}

impl<D: Downloader> PlaylistService<D> {
    /// Create a service.
    pub const fn new(downloader: D, store: SnapshotStore, library_root: PathBuf) -> Self {
        Self {
            downloader,
            store,
            library_root,
        }
    }

    /// Create a service for the context's store and library root.
    pub fn from_context(downloader: D, context: &AppContext) -> Self {
        Self::new(downloader, context.store().clone(), context.library_root())
    }

    /// The snapshot store.
    pub const fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// The library root.
    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// The downloader.
    pub const fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Track every playlist URL found in pasted text.
    pub async fn add_playlists(&self, text: &str, sink: &OutputSink) -> BatchReport {
        let urls = normalize_urls(text);
        info!("Adding {} playlist(s)", urls.len());

        let mut report = BatchReport::default();
        for url in urls {
            let outcome = self.add_playlist(&url, sink).await;
            report.push(url, outcome);
        }
        report
    }

    /// Fetch metadata for one URL and record its source.
    pub async fn add_playlist(&self, url: &str, sink: &OutputSink) -> PlaylistOutcome {
        let id = SnapshotId::for_url(url);
        self.fetch_into(url, &id, sink).await
    }

    /// Refresh the snapshot of a tracked playlist.
    ///
    /// The new metadata replaces the existing file even if the source now
    /// reports a different canonical URL.
    pub async fn sync_playlist(&self, id: &SnapshotId, sink: &OutputSink) -> PlaylistOutcome {
        let snapshot = match self.store.load(id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return PlaylistOutcome::Skipped("no playlist data".to_string()),
            Err(e) => return PlaylistOutcome::Failed(e.to_string()),
        };
        self.fetch_into(&snapshot.list_url, id, sink).await
    }

    /// Refresh every tracked playlist.
    pub async fn sync_all(&self, sink: &OutputSink) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for id in self.store.list_all()? {
            let outcome = self.sync_playlist(&id, sink).await;
            report.push(id.to_string(), outcome);
        }
        Ok(report)
    }

    /// Download the tracks of a tracked playlist into the library.
    pub async fn download_playlist(&self, id: &SnapshotId, sink: &OutputSink) -> PlaylistOutcome {
        let snapshot = match self.store.load(id) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("Nothing to download for {}", id);
                return PlaylistOutcome::Skipped("no playlist data".to_string());
            }
            Err(e) => {
                warn!("Cannot download {}: {}", id, e);
                return PlaylistOutcome::Failed(e.to_string());
            }
        };

        let template = output_template(&self.library_root);
        info!(
            "Downloading '{}' ({} tracks) into {}",
            snapshot.list_name,
            snapshot.tracks.len(),
            self.library_root.display()
        );
        match self
            .downloader
            .fetch_tracks(&snapshot.list_url, &template, sink)
            .await
        {
            Ok(exit) => PlaylistOutcome::Completed(exit),
            Err(e) => {
                warn!("Download of '{}' failed: {}", snapshot.list_name, e);
                PlaylistOutcome::Failed(e.to_string())
            }
        }
    }

    /// Download every tracked playlist.
    pub async fn download_all(&self, sink: &OutputSink) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for id in self.store.list_all()? {
            let outcome = self.download_playlist(&id, sink).await;
            report.push(id.to_string(), outcome);
        }
        Ok(report)
    }

    /// Stop tracking a playlist. Downloaded files are left alone.
    pub fn remove_playlist(&self, id: &SnapshotId) -> Result<()> {
        self.store.delete(id)
    }

    /// Views of every loadable playlist, sorted by name.
    pub fn playlist_views<R>(&self, rng: &mut R) -> Result<Vec<PlaylistView>>
    where
        R: Rng + ?Sized,
    {
        let mut views: Vec<PlaylistView> = self
            .store
            .load_all()?
            .into_iter()
            .map(|(id, snapshot)| PlaylistView::build(id, &snapshot, &self.library_root, rng))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(views)
    }

    /// View of one playlist, if it has data.
    pub fn playlist_view<R>(&self, id: &SnapshotId, rng: &mut R) -> Result<Option<PlaylistView>>
    where
        R: Rng + ?Sized,
    {
        Ok(self
            .store
            .load(id)?
            .map(|snapshot| PlaylistView::build(id.clone(), &snapshot, &self.library_root, rng)))
    }

    async fn fetch_into(&self, url: &str, id: &SnapshotId, sink: &OutputSink) -> PlaylistOutcome {
        let destination = self.store.path_for(id);
        let exit = match self
            .downloader
            .fetch_metadata(url, &destination, sink)
            .await
        {
            Ok(exit) => exit,
            Err(e) => {
                warn!("Fetching metadata for {} failed: {}", url, e);
                return PlaylistOutcome::Failed(e.to_string());
            }
        };

        match self.store.stamp_source(id) {
            Ok(Some(snapshot)) => {
                info!(
                    "Saved '{}' ({} tracks) as {}",
                    snapshot.list_name,
                    snapshot.tracks.len(),
                    id
                );
                PlaylistOutcome::Completed(exit)
            }
            Ok(None) if exit.success() => {
                PlaylistOutcome::Skipped("downloader saved no playlist data".to_string())
            }
            Ok(None) => PlaylistOutcome::Completed(exit),
            Err(e) => {
                warn!("Snapshot for {} is unusable: {}", url, e);
                PlaylistOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::MockDownloader;
    use crate::error::{DownloaderError, Error};
    use crate::process::ExitState;
    use crate::url::SourceKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ok_exit() -> ProcessExit {
        ProcessExit {
            state: ExitState::Success,
            lines: 1,
            stderr_tail: Vec::new(),
        }
    }

    fn playlist_json(name: &str, url: &str) -> String {
        format!(
            r#"[
                {{"artist": "A", "name": "One", "duration": 120000, "cover_url": "https://img/1",
                  "list_name": "{name}", "list_url": "{url}", "list_length": 2}},
                {{"artist": "B", "name": "Two", "duration": 60000, "cover_url": null,
                  "list_name": "{name}", "list_url": "{url}", "list_length": 2}}
            ]"#
        )
    }

    fn sink() -> OutputSink {
        Arc::new(|_| {})
    }

    fn service(downloader: MockDownloader) -> (TempDir, PlaylistService<MockDownloader>) {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let store = SnapshotStore::new(temp_dir.path().join("data")).expect("store");
        let library = temp_dir.path().join("library");
        (temp_dir, PlaylistService::new(downloader, store, library))
    }

    #[tokio::test]
    async fn test_add_playlists_continues_after_failure() {
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch_metadata()
            .times(3)
            .returning(|url, destination, _| {
                if url == "urlB" {
                    return Err(Error::Downloader(DownloaderError::SpawnFailed {
                        program: "spotdl".to_string(),
                        reason: "boom".to_string(),
                    }));
                }
                fs::write(destination, playlist_json(url, url)).expect("write snapshot");
                Ok(ok_exit())
            });
        let (_dir, service) = service(downloader);

        let report = service
            .add_playlists("urlA, urlB\nhttps://open.spotify.com/playlist/c", &sink())
            .await;

        let targets: Vec<&str> = report.entries.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["urlA", "urlB", "https://open.spotify.com/playlist/c"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());
        assert!(matches!(
            report.entries[1].outcome,
            PlaylistOutcome::Failed(_)
        ));
        assert_eq!(service.store().list_all().expect("list").len(), 2);
    }

    #[tokio::test]
    async fn test_add_playlist_stamps_source() {
        let url = "https://open.spotify.com/playlist/c";
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch_metadata()
            .withf(move |u, _, _| u == url)
            .times(1)
            .returning(|url, destination, _| {
                fs::write(destination, playlist_json("Chill", url)).expect("write snapshot");
                Ok(ok_exit())
            });
        let (_dir, service) = service(downloader);

        let outcome = service.add_playlist(url, &sink()).await;
        assert!(outcome.is_success());

        let id = SnapshotId::for_url(url);
        let snapshot = service.store().load(&id).expect("load").expect("exists");
        assert_eq!(snapshot.source, Some(SourceKind::Spotify));
    }

    #[tokio::test]
    async fn test_add_playlist_with_empty_result_is_skipped() {
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch_metadata()
            .returning(|_, destination, _| {
                fs::write(destination, "[]").expect("write snapshot");
                Ok(ok_exit())
            });
        let (_dir, service) = service(downloader);

        let outcome = service.add_playlist("urlA", &sink()).await;
        assert!(matches!(outcome, PlaylistOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_failed_exit_without_file_is_reported() {
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch_metadata().returning(|_, _, _| {
            Ok(ProcessExit {
                state: ExitState::Failed { code: Some(1) },
                lines: 0,
                stderr_tail: vec!["no such playlist".to_string()],
            })
        });
        let (_dir, service) = service(downloader);

        let report = service.add_playlists("bad-url", &sink()).await;
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.entries[0].outcome,
            PlaylistOutcome::Completed(ProcessExit {
                state: ExitState::Failed { code: Some(1) },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_download_uses_library_template() {
        let url = "https://music.youtube.com/playlist?list=PL1";
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch_tracks()
            .withf(move |u, template, _| {
                u == url && template.ends_with("/{list-name}/{artist} - {title}.{output-ext}")
            })
            .times(1)
            .returning(|_, _, _| Ok(ok_exit()));
        let (_dir, service) = service(downloader);

        let id = SnapshotId::for_url(url);
        fs::write(service.store().path_for(&id), playlist_json("Mix", url)).expect("write");

        let outcome = service.download_playlist(&id, &sink()).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_download_empty_snapshot_is_noop() {
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch_tracks().never();
        let (_dir, service) = service(downloader);

        let id = SnapshotId::for_url("empty");
        fs::write(service.store().path_for(&id), "[]").expect("write");

        let outcome = service.download_playlist(&id, &sink()).await;
        assert!(matches!(outcome, PlaylistOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_download_all_isolates_corrupt_snapshot() {
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch_tracks()
            .times(1)
            .returning(|_, _, _| Ok(ok_exit()));
        let (_dir, service) = service(downloader);

        let good = SnapshotId::for_url("good");
        fs::write(service.store().path_for(&good), playlist_json("Good", "good")).expect("write");
        let bad = SnapshotId::for_url("bad");
        fs::write(service.store().path_for(&bad), "{").expect("write");

        let report = service.download_all(&sink()).await.expect("report");
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_sync_rewrites_same_snapshot() {
        let pasted = "https://open.spotify.com/playlist/abc?si=123";
        let canonical = "https://open.spotify.com/playlist/abc";
        let mut downloader = MockDownloader::new();
        downloader
            .expect_fetch_metadata()
            .withf(move |u, _, _| u == canonical)
            .times(1)
            .returning(move |url, destination, _| {
                fs::write(destination, playlist_json("Renamed", url)).expect("write");
                Ok(ok_exit())
            });
        let (_dir, service) = service(downloader);

        let id = SnapshotId::for_url(pasted);
        fs::write(service.store().path_for(&id), playlist_json("Old", canonical)).expect("write");

        let outcome = service.sync_playlist(&id, &sink()).await;
        assert!(outcome.is_success());
        assert_eq!(service.store().list_all().expect("list"), vec![id.clone()]);
        let snapshot = service.store().load(&id).expect("load").expect("data");
        assert_eq!(snapshot.list_name, "Renamed");
    }

    #[tokio::test]
    async fn test_sync_missing_snapshot_is_skipped() {
        let mut downloader = MockDownloader::new();
        downloader.expect_fetch_metadata().never();
        let (_dir, service) = service(downloader);

        let outcome = service
            .sync_playlist(&SnapshotId::for_url("gone"), &sink())
            .await;
        assert!(matches!(outcome, PlaylistOutcome::Skipped(_)));
    }

    #[test]
    fn test_remove_and_views() {
        let (_dir, service) = service(MockDownloader::new());
        for (name, url) in [("Zeta", "z"), ("Alpha", "a")] {
            let id = SnapshotId::for_url(url);
            fs::write(service.store().path_for(&id), playlist_json(name, url)).expect("write");
        }

        let mut rng = StdRng::seed_from_u64(9);
        let views = service.playlist_views(&mut rng).expect("views");
        let names: Vec<&str> = views.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
        assert_eq!(views[0].missing.len(), 2);
        assert_eq!(views[0].cover_urls, vec!["https://img/1".to_string()]);

        service
            .remove_playlist(&SnapshotId::for_url("a"))
            .expect("remove");
        let views = service.playlist_views(&mut rng).expect("views");
        assert_eq!(views.len(), 1);
        assert!(
            service
                .playlist_view(&SnapshotId::for_url("a"), &mut rng)
                .expect("view")
                .is_none()
        );
    }
}
