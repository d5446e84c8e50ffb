//! Adapter for the external `spotdl` downloader.
//!
//! Two operations are exposed: saving a playlist's metadata to a snapshot
//! file, and downloading its tracks into the library. Both run `spotdl` as a
//! child process and stream its stdout through [`run_streaming`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use playlist_downloader_core::downloader::{Downloader, SpotdlDownloader};
//! use playlist_downloader_core::process::OutputSink;
//!
//! # async fn run() -> playlist_downloader_core::Result<()> {
//! let downloader = SpotdlDownloader::new();
//! let sink: OutputSink = Arc::new(|event| println!("{event:?}"));
//! downloader
//!     .fetch_metadata("https://open.spotify.com/playlist/x", Path::new("/tmp/x.spotdl"), &sink)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Result;
use crate::process::{CancelHandle, OutputSink, ProcessExit, run_streaming};

/// Default downloader executable, looked up on PATH.
pub const DEFAULT_SPOTDL_PROGRAM: &str = "spotdl";

/// Output path pattern for a library root.
///
/// The placeholders are filled in by the downloader:
/// `<library_root>/{list-name}/{artist} - {title}.{output-ext}`.
#[must_use]
pub fn output_template(library_root: &Path) -> String {
    let root = library_root.to_string_lossy();
    let root = root.trim_end_matches(['/', '\\']);
    format!("{root}/{{list-name}}/{{artist}} - {{title}}.{{output-ext}}")
}

/// Downloader operations, abstracted for testability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Save playlist metadata for `url` into the snapshot file `destination`.
    async fn fetch_metadata(
        &self,
        url: &str,
        destination: &Path,
        sink: &OutputSink,
    ) -> Result<ProcessExit>;

    /// Download the tracks of `list_url`, naming files with `output_template`.
    async fn fetch_tracks(
        &self,
        list_url: &str,
        output_template: &str,
        sink: &OutputSink,
    ) -> Result<ProcessExit>;
}

/// Configuration for [`SpotdlDownloader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Upper bound for one run; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Arguments appended after the operation's own arguments.
    pub extra_args: Vec<String>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_SPOTDL_PROGRAM),
            timeout: None,
            extra_args: Vec::new(),
        }
    }
}

/// Runs `spotdl` as a child process.
#[derive(Debug, Clone, Default)]
pub struct SpotdlDownloader {
    config: DownloaderConfig,
    cancel: CancelHandle,
}

impl SpotdlDownloader {
    /// Create a downloader with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a downloader with a custom configuration.
    #[must_use]
    pub fn with_config(config: DownloaderConfig) -> Self {
        Self {
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Handle that cancels runs of this downloader, e.g. from a signal handler.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Stop the running process, if any, and refuse new runs.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Allow new runs after a cancellation.
    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    /// Arguments for the metadata operation.
    #[must_use]
    pub fn metadata_args(&self, url: &str, destination: &Path) -> Vec<String> {
        let mut args = vec![
            "save".to_string(),
            url.to_string(),
            "--save-file".to_string(),
            destination.to_string_lossy().into_owned(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Arguments for the track download operation.
    #[must_use]
    pub fn tracks_args(&self, list_url: &str, output_template: &str) -> Vec<String> {
        let mut args = vec![
            list_url.to_string(),
            "--output".to_string(),
            output_template.to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    async fn run(&self, args: Vec<String>, sink: &OutputSink) -> Result<ProcessExit> {
        let mut command = Command::new(&self.config.program);
        command.args(args);
        run_streaming(command, sink, &self.cancel, self.config.timeout).await
    }
}

#[async_trait]
impl Downloader for SpotdlDownloader {
    async fn fetch_metadata(
        &self,
        url: &str,
        destination: &Path,
        sink: &OutputSink,
    ) -> Result<ProcessExit> {
        self.run(self.metadata_args(url, destination), sink).await
    }

    async fn fetch_tracks(
        &self,
        list_url: &str,
        output_template: &str,
        sink: &OutputSink,
    ) -> Result<ProcessExit> {
        self.run(self.tracks_args(list_url, output_template), sink)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DownloaderError, Error};
    use crate::process::{ExitState, OutputEvent};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_output_template() {
        assert_eq!(
            output_template(Path::new("/music/lib")),
            "/music/lib/{list-name}/{artist} - {title}.{output-ext}"
        );
        assert_eq!(
            output_template(Path::new("/music/lib/")),
            "/music/lib/{list-name}/{artist} - {title}.{output-ext}"
        );
    }

    #[test]
    fn test_metadata_args() {
        let downloader = SpotdlDownloader::new();
        let args = downloader.metadata_args(
            "https://open.spotify.com/playlist/x",
            Path::new("/data/abc.spotdl"),
        );
        assert_eq!(
            args,
            vec![
                "save",
                "https://open.spotify.com/playlist/x",
                "--save-file",
                "/data/abc.spotdl"
            ]
        );
    }

    #[test]
    fn test_tracks_args_with_extra() {
        let downloader = SpotdlDownloader::with_config(DownloaderConfig {
            extra_args: vec!["--threads".to_string(), "1".to_string()],
            ..Default::default()
        });
        let args = downloader.tracks_args("url", "/lib/{list-name}/x.{output-ext}");
        assert_eq!(
            args,
            vec!["url", "--output", "/lib/{list-name}/x.{output-ext}", "--threads", "1"]
        );
    }

    #[test]
    fn test_default_program() {
        assert_eq!(
            SpotdlDownloader::new().config().program,
            PathBuf::from("spotdl")
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let downloader = SpotdlDownloader::with_config(DownloaderConfig {
            program: PathBuf::from("/nonexistent/bin/spotdl"),
            ..Default::default()
        });
        let sink: OutputSink = Arc::new(|_| {});

        let err = downloader
            .fetch_metadata("url", Path::new("/tmp/x.spotdl"), &sink)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Downloader(DownloaderError::BinaryNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_program_with_metadata_args() {
        // `echo` stands in for the downloader and prints the arguments it got.
        let downloader = SpotdlDownloader::with_config(DownloaderConfig {
            program: PathBuf::from("echo"),
            ..Default::default()
        });
        let lines = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&lines);
        let sink: OutputSink = Arc::new(move |event| {
            if let OutputEvent::Line(line) = event {
                recorded.lock().expect("lock").push(line);
            }
        });

        let exit = downloader
            .fetch_metadata("urlA", Path::new("/data/a.spotdl"), &sink)
            .await
            .expect("Should run");

        assert_eq!(exit.state, ExitState::Success);
        assert_eq!(
            *lines.lock().expect("lock"),
            vec!["save urlA --save-file /data/a.spotdl".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_blocks_new_runs_until_reset() {
        let downloader = SpotdlDownloader::with_config(DownloaderConfig {
            program: PathBuf::from("echo"),
            ..Default::default()
        });
        let sink: OutputSink = Arc::new(|_| {});

        downloader.cancel();
        let exit = downloader
            .fetch_tracks("url", "template", &sink)
            .await
            .expect("Should run");
        assert_eq!(exit.state, ExitState::Cancelled);

        downloader.reset_cancel();
        let exit = downloader
            .fetch_tracks("url", "template", &sink)
            .await
            .expect("Should run");
        assert_eq!(exit.state, ExitState::Success);
    }
}
