//! Playlist Downloader Core Library
//!
//! This crate provides the core functionality for tracking online playlists
//! and mirroring them into a local music library with `spotdl`:
//! - Playlist URL parsing and source classification
//! - JSON snapshot storage keyed by URL digest
//! - Streaming subprocess execution with timeout and cancellation
//! - Missing-track detection against the library folders
//! - Playlist view models and periodic rescans
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`], whose error type groups the
//! failures by domain. See the [`error`] module for details.
//!
//! ```rust,ignore
//! use playlist_downloader_core::{AppContext, AppPaths, Result};
//!
//! fn open() -> Result<AppContext> {
//!     AppContext::init(AppPaths::resolve())
//! }
//! ```

pub mod config;
pub mod downloader;
pub mod error;
pub mod library;
pub mod process;
pub mod service;
pub mod snapshot;
pub mod url;
pub mod view;
pub mod watcher;

pub use config::{AppConfig, AppContext, AppPaths, CONFIG_PATH_ENV, DATA_DIR_ENV};
pub use downloader::{
    DEFAULT_SPOTDL_PROGRAM, Downloader, DownloaderConfig, SpotdlDownloader, output_template,
};
pub use error::{
    DownloaderError, Error, ErrorKind, FileSystemError, Result, SnapshotError,
};
pub use library::{expected_filename, expected_filenames, missing_tracks, playlist_folder};
pub use process::{CancelHandle, ExitState, OutputEvent, OutputSink, ProcessExit, run_streaming};
pub use service::{BatchEntry, BatchReport, PlaylistOutcome, PlaylistService};
pub use snapshot::{SNAPSHOT_EXTENSION, Snapshot, SnapshotId, SnapshotStore, Track};
pub use url::{DurationUnit, SourceKind, normalize_urls};
pub use view::{MAX_COVERS, MissingSummary, PlaylistView, format_timespan};
pub use watcher::{
    DEFAULT_RESCAN_INTERVAL, MissingTracksUpdate, MissingTracksWatcher, WatcherHandle,
};
