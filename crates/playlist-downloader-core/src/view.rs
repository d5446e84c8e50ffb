//! Playlist view model.
//!
//! A [`PlaylistView`] aggregates one snapshot with the state of its library
//! folder: total playing time, a few cover images for a mosaic thumbnail and
//! the tracks still missing. It is plain data with no UI dependency.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::library::{expected_filenames, playlist_folder, present_filenames, total_duration};
use crate::snapshot::{Snapshot, SnapshotId};
use crate::url::SourceKind;

/// Maximum number of covers in the mosaic thumbnail.
pub const MAX_COVERS: usize = 4;

/// Missing-track headline for a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSummary {
    /// Every expected file is present.
    Complete,
    /// This many files are missing.
    Missing(usize),
}

impl MissingSummary {
    /// Summary for a number of missing tracks.
    #[must_use]
    pub const fn from_count(missing: usize) -> Self {
        if missing == 0 {
            Self::Complete
        } else {
            Self::Missing(missing)
        }
    }

    /// Whether nothing is missing.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for MissingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "All tracks downloaded"),
            Self::Missing(1) => write!(f, "1 missing track"),
            Self::Missing(n) => write!(f, "{n} missing tracks"),
        }
    }
}

/// Everything a front-end shows for one playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistView {
    /// Snapshot id.
    pub id: SnapshotId,
    /// Playlist title.
    pub name: String,
    /// Source URL.
    pub url: String,
    /// Streaming service.
    pub source: SourceKind,
    /// Track count reported by the source.
    pub track_count: usize,
    /// Total playing time in whole seconds.
    pub total_duration_secs: u64,
    /// Up to [`MAX_COVERS`] randomly chosen cover URLs.
    pub cover_urls: Vec<String>,
    /// Folder the tracks are downloaded into.
    pub folder: PathBuf,
    /// File names the folder should contain.
    #[serde(skip)]
    expected: BTreeSet<String>,
    /// Expected file names not found in the folder.
    pub missing: BTreeSet<String>,
}

impl PlaylistView {
    /// Build the view for a snapshot, scanning its library folder.
    pub fn build<R>(id: SnapshotId, snapshot: &Snapshot, library_root: &Path, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let folder = playlist_folder(library_root, &snapshot.list_name);
        let expected = expected_filenames(snapshot);
        let missing = expected
            .difference(&present_filenames(&folder))
            .cloned()
            .collect();

        Self {
            id,
            name: snapshot.list_name.clone(),
            url: snapshot.list_url.clone(),
            source: snapshot.source_kind(),
            track_count: snapshot.list_length,
            total_duration_secs: total_duration(snapshot).as_secs(),
            cover_urls: sample_covers(snapshot, rng),
            folder,
            expected,
            missing,
        }
    }

    /// Total playing time.
    #[must_use]
    pub const fn total_duration(&self) -> Duration {
        Duration::from_secs(self.total_duration_secs)
    }

    /// Total playing time as text, e.g. "1 hour, 2 minutes and 3 seconds".
    #[must_use]
    pub fn formatted_duration(&self) -> String {
        format_timespan(self.total_duration())
    }

    /// Missing-track headline.
    #[must_use]
    pub fn missing_summary(&self) -> MissingSummary {
        MissingSummary::from_count(self.missing.len())
    }

    /// Rescan the library folder. Returns whether the missing set changed.
    pub fn refresh_missing(&mut self) -> bool {
        let missing: BTreeSet<String> = self
            .expected
            .difference(&present_filenames(&self.folder))
            .cloned()
            .collect();
        let changed = missing != self.missing;
        self.missing = missing;
        changed
    }
}

/// Pick up to [`MAX_COVERS`] distinct cover URLs from random tracks.
pub fn sample_covers<R>(snapshot: &Snapshot, rng: &mut R) -> Vec<String>
where
    R: Rng + ?Sized,
{
    let covers: Vec<&String> = snapshot
        .tracks
        .iter()
        .filter_map(|t| t.cover_url.as_ref())
        .filter(|url| !url.is_empty())
        .collect();

    covers
        .choose_multiple(rng, MAX_COVERS)
        .map(|url| (*url).clone())
        .collect()
}

/// Format a duration the way people say it.
///
/// ```rust
/// use std::time::Duration;
/// use playlist_downloader_core::view::format_timespan;
///
/// assert_eq!(format_timespan(Duration::from_secs(6)), "6 seconds");
/// assert_eq!(format_timespan(Duration::from_secs(3723)), "1 hour, 2 minutes and 3 seconds");
/// ```
#[must_use]
pub fn format_timespan(duration: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];

    let mut remaining = duration.as_secs();
    let mut parts = Vec::new();
    for (size, name) in UNITS {
        let count = remaining / size;
        remaining %= size;
        if count > 0 {
            let plural = if count == 1 { "" } else { "s" };
            parts.push(format!("{count} {name}{plural}"));
        }
    }

    match parts.as_slice() {
        [] => "0 seconds".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}
