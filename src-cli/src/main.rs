//! Playlist Downloader - track online playlists and mirror them into a local
//! music library with `spotdl`.

mod cli;
mod commands;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use playlist_downloader_core::{AppContext, AppPaths};
use tracing::{error, info};

use crate::cli::Cli;
use crate::logging::LoggingConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = AppPaths::resolve();

    let logging_config = LoggingConfig::new(paths.log_dir()).with_verbosity(cli.verbose);
    let _logging_guard = match logging::init(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {e}");
            None
        }
    };

    info!("Starting Playlist Downloader {}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", paths.data_dir.display());

    let context = match AppContext::init(paths) {
        Ok(context) => context,
        Err(e) => {
            error!("Startup failed: {}", e);
            eprintln!("error ({}): {e}", e.kind());
            return ExitCode::FAILURE;
        }
    };

    match commands::run(cli, context).await {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("error ({}): {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
