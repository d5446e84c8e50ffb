//! Playlist URL normalization and source classification.
//!
//! Users paste playlist links in bulk, separated by commas or newlines and
//! often with stray whitespace. [`normalize_urls`] turns that text into the
//! ordered list of URLs handed to the downloader. No validation happens here;
//! a malformed entry surfaces later as downloader output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic web video host.
pub const YOUTUBE_WEB_HOST: &str = "www.youtube.com";

/// Music catalog host that `YOUTUBE_WEB_HOST` links are rewritten to.
pub const YOUTUBE_MUSIC_HOST: &str = "music.youtube.com";

/// Split pasted text into canonical playlist URLs.
///
/// Newlines and commas both separate entries, every whitespace character is
/// removed, empty entries are dropped and `www.youtube.com` links are
/// rewritten to `music.youtube.com` so they resolve against the audio catalog.
///
/// ```rust
/// use playlist_downloader_core::url::normalize_urls;
///
/// let urls = normalize_urls("urlA, urlB\nwww.youtube.com/urlC");
/// assert_eq!(urls, vec!["urlA", "urlB", "music.youtube.com/urlC"]);
/// ```
#[must_use]
pub fn normalize_urls(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(|entry| entry.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.replace(YOUTUBE_WEB_HOST, YOUTUBE_MUSIC_HOST))
        .collect()
}

/// How track durations are expressed by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    /// Durations are in milliseconds.
    Milliseconds,
    /// Durations are in seconds.
    Seconds,
}

/// Streaming service a playlist belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Spotify (`open.spotify.com`).
    Spotify,
    /// YouTube Music (`music.youtube.com`).
    YoutubeMusic,
    /// Plain YouTube (`youtube.com`, `youtu.be`).
    Youtube,
    /// Anything else.
    #[default]
    Other,
}

impl SourceKind {
    /// Classify a URL by its host.
    ///
    /// The scheme is optional and the host is compared case-insensitively,
    /// so `open.spotify.com/playlist/x` and `https://OPEN.SPOTIFY.COM/...`
    /// both classify as Spotify.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let Some(host) = host_of(url) else {
            return Self::Other;
        };

        if host == "spotify.com" || host.ends_with(".spotify.com") {
            Self::Spotify
        } else if host == YOUTUBE_MUSIC_HOST {
            Self::YoutubeMusic
        } else if host == "youtube.com"
            || host == YOUTUBE_WEB_HOST
            || host == "m.youtube.com"
            || host == "youtu.be"
        {
            Self::Youtube
        } else {
            Self::Other
        }
    }

    /// Unit the source uses for track durations.
    #[must_use]
    pub const fn duration_unit(self) -> DurationUnit {
        match self {
            Self::Spotify => DurationUnit::Milliseconds,
            Self::YoutubeMusic | Self::Youtube | Self::Other => DurationUnit::Seconds,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spotify => write!(f, "Spotify"),
            Self::YoutubeMusic => write!(f, "YouTube Music"),
            Self::Youtube => write!(f, "YouTube"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Lowercased host of a URL with or without a scheme.
fn host_of(url: &str) -> Option<String> {
    let url = url.trim();
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    // Drop userinfo and port.
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}
