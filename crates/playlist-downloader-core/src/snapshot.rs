//! Playlist snapshots and their on-disk store.
//!
//! A snapshot is the metadata file the downloader writes for one playlist:
//! a JSON array of song records, each repeating the playlist name, URL and
//! length. Files are named after the MD5 digest of the playlist URL, so a
//! URL always maps to the same file and no separate index is needed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, FileSystemError, Result, SnapshotError};
use crate::url::SourceKind;

/// File extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "spotdl";

/// Identifier of a snapshot: the hex MD5 digest of its playlist URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Derive the id for a playlist URL.
    #[must_use]
    pub fn for_url(url: &str) -> Self {
        Self(format!("{:x}", md5::compute(url.as_bytes())))
    }

    /// Accept an existing id, e.g. a file stem or user input.
    ///
    /// Any non-empty name that cannot escape the data directory is accepted,
    /// so files written by older versions keep their ids.
    pub fn parse(id: &str) -> Result<Self> {
        let id = id.trim();
        let reason = if id.is_empty() {
            Some("id is empty")
        } else if id.contains(['/', '\\']) || id == "." || id == ".." {
            Some("id must be a plain file name")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::Snapshot(SnapshotError::InvalidId {
                id: id.to_string(),
                reason: reason.to_string(),
            })),
            None => Ok(Self(id.to_string())),
        }
    }

    /// The id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for compact listings.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }

    /// File name of the snapshot inside the data directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{SNAPSHOT_EXTENSION}", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One track of a playlist snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Performing artist.
    pub artist: String,
    /// Track title.
    pub name: String,
    /// Duration in the unit of the snapshot's source.
    pub duration: u64,
    /// Cover art URL, if the source provided one.
    pub cover_url: Option<String>,
    /// Fields written by the downloader that this crate does not interpret.
    extra: Map<String, Value>,
}

impl Track {
    /// Create a track with no extra downloader fields.
    pub fn new(
        artist: impl Into<String>,
        name: impl Into<String>,
        duration: u64,
        cover_url: Option<String>,
    ) -> Self {
        Self {
            artist: artist.into(),
            name: name.into(),
            duration,
            cover_url,
            extra: Map::new(),
        }
    }

    /// Extra downloader field by key.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Snapshot of a playlist's metadata and track listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Playlist title.
    pub list_name: String,
    /// Source URL identifying the playlist.
    pub list_url: String,
    /// Track count reported by the source when the snapshot was taken.
    pub list_length: usize,
    /// Recorded source; `None` until the store stamps it.
    pub source: Option<SourceKind>,
    /// Tracks in playlist order.
    pub tracks: Vec<Track>,
}

/// A song record as laid out in the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SongRecord {
    #[serde(default)]
    list_name: String,
    #[serde(default)]
    list_url: String,
    #[serde(default)]
    list_length: usize,
    artist: String,
    name: String,
    #[serde(default, deserialize_with = "deserialize_duration")]
    duration: u64,
    #[serde(default)]
    cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<SourceKind>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Accept integral or fractional durations; fractions are truncated.
fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(u64),
        Float(f64),
        Null(()),
    }

    Ok(match Number::deserialize(deserializer)? {
        Number::Int(n) => n,
        Number::Float(f) if f.is_finite() && f > 0.0 => f as u64,
        Number::Float(_) | Number::Null(()) => 0,
    })
}

impl Snapshot {
    /// Create a snapshot whose `list_length` matches the given tracks.
    pub fn new(list_name: impl Into<String>, list_url: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            list_name: list_name.into(),
            list_url: list_url.into(),
            list_length: tracks.len(),
            source: None,
            tracks,
        }
    }

    /// Source of the playlist.
    ///
    /// Uses the recorded source; snapshots that were never stamped are
    /// classified from their URL host.
    #[must_use]
    pub fn source_kind(&self) -> SourceKind {
        self.source
            .unwrap_or_else(|| SourceKind::from_url(&self.list_url))
    }

    /// Parse snapshot file contents.
    ///
    /// Returns `Ok(None)` for an empty array, which is how the downloader
    /// records a playlist it could not resolve.
    pub fn from_json(content: &str) -> serde_json::Result<Option<Self>> {
        let records: Vec<SongRecord> = serde_json::from_str(content)?;
        Ok(Self::from_records(records))
    }

    /// Serialize to the snapshot file layout.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_records())
    }

    fn from_records(records: Vec<SongRecord>) -> Option<Self> {
        let first = records.first()?;
        let list_name = first.list_name.clone();
        let list_url = first.list_url.clone();
        let list_length = first.list_length;
        let source = records.iter().find_map(|r| r.source);

        let tracks = records
            .into_iter()
            .map(|r| Track {
                artist: r.artist,
                name: r.name,
                duration: r.duration,
                cover_url: r.cover_url,
                extra: r.extra,
            })
            .collect();

        Some(Self {
            list_name,
            list_url,
            list_length,
            source,
            tracks,
        })
    }

    fn to_records(&self) -> Vec<SongRecord> {
        self.tracks
            .iter()
            .map(|t| SongRecord {
                list_name: self.list_name.clone(),
                list_url: self.list_url.clone(),
                list_length: self.list_length,
                artist: t.artist.clone(),
                name: t.name.clone(),
                duration: t.duration,
                cover_url: t.cover_url.clone(),
                source: self.source,
                extra: t.extra.clone(),
            })
            .collect()
    }
}

/// Store of snapshot files inside the application data directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    /// Open the store, creating the data directory if needed.
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: data_dir.clone(),
                    reason: e.to_string(),
                })
            })?;
        }
        Ok(Self { data_dir })
    }

    /// Directory holding the snapshot files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the snapshot file for an id.
    #[must_use]
    pub fn path_for(&self, id: &SnapshotId) -> PathBuf {
        self.data_dir.join(id.file_name())
    }

    /// Load a snapshot.
    ///
    /// Missing files and empty snapshots are `Ok(None)`; a file that does not
    /// parse is [`SnapshotError::Corrupt`].
    pub fn load(&self, id: &SnapshotId) -> Result<Option<Snapshot>> {
        let path = self.path_for(id);
        if !path.exists() {
            debug!("No snapshot file for {}", id);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;

        Snapshot::from_json(&content).map_err(|e| {
            Error::Snapshot(SnapshotError::Corrupt {
                path,
                reason: e.to_string(),
            })
        })
    }

    /// Write a snapshot, replacing any previous file atomically.
    pub fn save(&self, id: &SnapshotId, snapshot: &Snapshot) -> Result<()> {
        let path = self.path_for(id);
        let tmp_path = path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));
        let content = snapshot.to_json_pretty()?;

        fs::write(&tmp_path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: tmp_path.clone(),
                reason: e.to_string(),
            })
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Error::FileSystem(FileSystemError::WriteFailed {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;

        debug!("Saved snapshot {} ({} tracks)", id, snapshot.tracks.len());
        Ok(())
    }

    /// Delete a snapshot file.
    pub fn delete(&self, id: &SnapshotId) -> Result<()> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(Error::snapshot_not_found(id.as_str()));
        }

        fs::remove_file(&path).map_err(|e| {
            Error::FileSystem(FileSystemError::DeleteFailed {
                path,
                reason: e.to_string(),
            })
        })?;

        info!("Deleted snapshot {}", id);
        Ok(())
    }

    /// Ids of every snapshot file in the data directory, sorted.
    pub fn list_all(&self) -> Result<Vec<SnapshotId>> {
        let read_failed = |e: std::io::Error| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: self.data_dir.clone(),
                reason: e.to_string(),
            })
        };

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.data_dir).map_err(read_failed)? {
            let path = entry.map_err(read_failed)?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXTENSION)
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match SnapshotId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("Ignoring snapshot file {}: {}", path.display(), e),
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Load every snapshot that holds playlist data.
    ///
    /// Corrupt and empty files are skipped with a warning so one bad file
    /// never hides the rest of the library.
    pub fn load_all(&self) -> Result<Vec<(SnapshotId, Snapshot)>> {
        let mut snapshots = Vec::new();
        for id in self.list_all()? {
            match self.load(&id) {
                Ok(Some(snapshot)) => snapshots.push((id, snapshot)),
                Ok(None) => debug!("Skipping empty snapshot {}", id),
                Err(e) => warn!("Skipping snapshot {}: {}", id, e),
            }
        }
        Ok(snapshots)
    }

    /// Record the playlist source in a freshly fetched snapshot.
    ///
    /// Files written by the downloader carry no source; it is classified from
    /// the URL once here and persisted, so later readers use the stored value.
    pub fn stamp_source(&self, id: &SnapshotId) -> Result<Option<Snapshot>> {
        let Some(mut snapshot) = self.load(id)? else {
            return Ok(None);
        };

        if snapshot.source.is_none() {
            let source = SourceKind::from_url(&snapshot.list_url);
            snapshot.source = Some(source);
            self.save(id, &snapshot)?;
            debug!("Recorded source {} for snapshot {}", source, id);
        }
        Ok(Some(snapshot))
    }

    /// Resolve a full id or a unique id prefix to an existing snapshot.
    pub fn resolve(&self, id_or_prefix: &str) -> Result<SnapshotId> {
        let wanted = SnapshotId::parse(id_or_prefix)?;
        let ids = self.list_all()?;
        if ids.contains(&wanted) {
            return Ok(wanted);
        }

        let mut matches = ids
            .into_iter()
            .filter(|id| id.as_str().starts_with(wanted.as_str()));
        match (matches.next(), matches.count()) {
            (Some(id), 0) => Ok(id),
            (Some(_), rest) => Err(Error::Snapshot(SnapshotError::AmbiguousId {
                prefix: wanted.to_string(),
                matches: rest + 1,
            })),
            (None, _) => Err(Error::snapshot_not_found(wanted.as_str())),
        }
    }
}
