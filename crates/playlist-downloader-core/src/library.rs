//! Library folder scanning.
//!
//! Each playlist is downloaded into `<library_root>/<list_name>/`. Comparing
//! the files found there with the names the snapshot predicts gives the set
//! of missing tracks. Scans only read the filesystem, so any number may run
//! at once.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use walkdir::WalkDir;

use crate::snapshot::Snapshot;
use crate::url::DurationUnit;

/// Extension the downloader produces by default.
pub const EXPECTED_EXTENSION: &str = "mp3";

/// Folder a playlist is downloaded into.
#[must_use]
pub fn playlist_folder(library_root: &Path, list_name: &str) -> PathBuf {
    library_root.join(list_name)
}

/// File name the downloader gives a track: `"<artist> - <name>.mp3"`.
#[must_use]
pub fn expected_filename(artist: &str, name: &str) -> String {
    format!("{artist} - {name}.{EXPECTED_EXTENSION}")
}

/// File names every track of the snapshot should have.
#[must_use]
pub fn expected_filenames(snapshot: &Snapshot) -> BTreeSet<String> {
    snapshot
        .tracks
        .iter()
        .map(|track| expected_filename(&track.artist, &track.name))
        .collect()
}

/// Names of regular files, or symlinks to them, directly inside `folder`.
///
/// A folder that does not exist yet yields an empty set: the first download
/// has simply not created it.
#[must_use]
pub fn present_filenames(folder: &Path) -> BTreeSet<String> {
    if !folder.is_dir() {
        debug!("Library folder {} does not exist yet", folder.display());
        return BTreeSet::new();
    }

    WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file())
        })
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect()
}

/// Tracks of the snapshot whose file is not in the library folder.
#[must_use]
pub fn missing_tracks(snapshot: &Snapshot, library_root: &Path) -> BTreeSet<String> {
    let folder = playlist_folder(library_root, &snapshot.list_name);
    let present = present_filenames(&folder);
    let missing: BTreeSet<String> = expected_filenames(snapshot)
        .difference(&present)
        .cloned()
        .collect();

    debug!(
        "{}: {} missing of {} tracks",
        snapshot.list_name,
        missing.len(),
        snapshot.tracks.len()
    );
    missing
}

/// Total playing time of the snapshot.
///
/// Durations are summed in the unit of the snapshot's source; millisecond
/// totals are truncated to whole seconds. The sum saturates instead of
/// overflowing on absurd values.
#[must_use]
pub fn total_duration(snapshot: &Snapshot) -> Duration {
    let total = snapshot
        .tracks
        .iter()
        .fold(0u64, |acc, t| acc.saturating_add(t.duration));
    match snapshot.source_kind().duration_unit() {
        DurationUnit::Milliseconds => Duration::from_secs(total / 1000),
        DurationUnit::Seconds => Duration::from_secs(total),
    }
}
