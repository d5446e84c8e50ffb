//! Command-line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "playlist-downloader",
    author,
    version,
    about = "Track Spotify and YouTube Music playlists and download them with spotdl"
)]
pub struct Cli {
    /// Path to the spotdl executable
    #[arg(long, global = true, value_name = "PATH")]
    pub spotdl: Option<PathBuf>,

    /// Kill a downloader run after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Show more log output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Track playlists given as URLs separated by commas or newlines
    Add {
        /// Playlist URLs
        #[arg(required_unless_present = "stdin")]
        text: Vec<String>,
        /// Read URLs from standard input
        #[arg(long, conflicts_with = "text")]
        stdin: bool,
    },
    /// List tracked playlists
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Refresh playlist metadata
    Sync(Target),
    /// Download the tracks of playlists into the library
    Download(Target),
    /// Stop tracking a playlist (downloaded files are kept)
    Remove {
        /// Playlist id or unique id prefix
        id: String,
    },
    /// Show the tracks of a playlist that are not in the library yet
    Missing {
        /// Playlist id or unique id prefix
        id: String,
    },
    /// Print missing-track changes until interrupted
    Watch {
        /// Playlist id or unique id prefix
        id: String,
        /// Seconds between rescans
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
    /// Show or set the library directory
    Library {
        /// New library directory (absolute)
        path: Option<PathBuf>,
    },
}

/// One playlist or all of them.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Playlist id or unique id prefix
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub id: Option<String>,
    /// Every tracked playlist
    #[arg(long)]
    pub all: bool,
}
