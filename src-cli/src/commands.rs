//! Command execution.
//!
//! Each subcommand maps onto one [`PlaylistService`] operation. Downloader
//! output is echoed line by line to stdout while the process runs; results
//! and summaries follow once it has finished.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use playlist_downloader_core::{
    AppContext, BatchReport, DEFAULT_SPOTDL_PROGRAM, DownloaderConfig, Error, ExitState,
    MissingTracksUpdate, MissingTracksWatcher, OutputEvent, OutputSink, PlaylistOutcome,
    PlaylistService, PlaylistView, Result, SnapshotId, SpotdlDownloader,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command, Target};

/// Run the parsed command line against an initialized context.
pub async fn run(cli: Cli, mut context: AppContext) -> Result<ExitCode> {
    let config = downloader_config(&cli, &context);
    debug!(
        "Downloader: {} (timeout {:?})",
        config.program.display(),
        config.timeout
    );
    let service = PlaylistService::from_context(SpotdlDownloader::with_config(config), &context);

    match cli.command {
        Command::Add { text, stdin } => {
            let text = if stdin {
                read_stdin().await?
            } else {
                text.join("\n")
            };
            let _cancel = cancel_on_ctrl_c(&service);
            let report = service.add_playlists(&text, &stdout_sink()).await;
            Ok(print_report("add", &report))
        }
        Command::List { json } => {
            let views = service.playlist_views(&mut rand::thread_rng())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                println!("No playlists tracked yet. Add one with `playlist-downloader add <URL>`.");
            } else {
                for view in &views {
                    println!("{}", format_view_row(view));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Sync(target) => {
            let _cancel = cancel_on_ctrl_c(&service);
            let sink = stdout_sink();
            match resolve_target(&service, &target)? {
                Some(id) => Ok(print_outcome(&id, &service.sync_playlist(&id, &sink).await)),
                None => Ok(print_report("sync", &service.sync_all(&sink).await?)),
            }
        }
        Command::Download(target) => {
            let _cancel = cancel_on_ctrl_c(&service);
            let sink = stdout_sink();
            match resolve_target(&service, &target)? {
                Some(id) => Ok(print_outcome(
                    &id,
                    &service.download_playlist(&id, &sink).await,
                )),
                None => Ok(print_report("download", &service.download_all(&sink).await?)),
            }
        }
        Command::Remove { id } => {
            let id = service.store().resolve(&id)?;
            let name = service
                .store()
                .load(&id)
                .ok()
                .flatten()
                .map(|snapshot| snapshot.list_name);
            service.remove_playlist(&id)?;
            match name {
                Some(name) => println!("Removed '{name}' ({id})"),
                None => println!("Removed {id}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Missing { id } => {
            let id = service.store().resolve(&id)?;
            let Some(view) = service.playlist_view(&id, &mut rand::thread_rng())? else {
                println!("{id} has no playlist data");
                return Ok(ExitCode::SUCCESS);
            };
            println!("{}: {}", view.name, view.missing_summary());
            for name in &view.missing {
                println!("  {name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { id, interval } => {
            let id = service.store().resolve(&id)?;
            watch(&service, id, Duration::from_secs(interval)).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::Library { path } => {
            match path {
                Some(path) => {
                    context.set_library(absolute(&path)?)?;
                    println!("Library set to {}", context.library_root().display());
                }
                None => println!("{}", context.library_root().display()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Downloader settings: command-line flags first, then the config file.
pub fn downloader_config(cli: &Cli, context: &AppContext) -> DownloaderConfig {
    let program = cli
        .spotdl
        .clone()
        .or_else(|| context.config().spotdl_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SPOTDL_PROGRAM));

    let timeout = match cli.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => context.config().timeout(),
    };

    DownloaderConfig {
        program,
        timeout,
        ..DownloaderConfig::default()
    }
}

/// Sink that echoes downloader output to stdout.
fn stdout_sink() -> OutputSink {
    Arc::new(|event| match event {
        OutputEvent::Line(line) => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
        OutputEvent::Finished(exit) => debug!("Downloader finished: {:?}", exit.state),
    })
}

/// Cancel the running downloader when Ctrl-C is pressed.
///
/// The returned guard aborts the listener when dropped.
fn cancel_on_ctrl_c(service: &PlaylistService<SpotdlDownloader>) -> AbortOnDrop {
    let cancel = service.downloader().cancel_handle();
    AbortOnDrop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping downloader");
            eprintln!("Cancelling...");
            cancel.cancel();
        }
    }))
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn read_stdin() -> Result<String> {
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    Ok(text)
}

fn resolve_target(
    service: &PlaylistService<SpotdlDownloader>,
    target: &Target,
) -> Result<Option<SnapshotId>> {
    match (&target.id, target.all) {
        (_, true) => Ok(None),
        (Some(id), false) => service.store().resolve(id).map(Some),
        (None, false) => Err(Error::Configuration(
            "Give a playlist id or --all".to_string(),
        )),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

async fn watch(service: &PlaylistService<SpotdlDownloader>, id: SnapshotId, interval: Duration) {
    let watcher = MissingTracksWatcher::new(
        service.store().clone(),
        id.clone(),
        service.library_root().to_path_buf(),
    )
    .with_interval(interval);
    let (mut updates, handle) = watcher.start();
    info!("Watching {} every {:?}", id, interval);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let update = updates.borrow_and_update().clone();
                println!("{}", format_update(&id, update.as_ref()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.stop().await;
}

/// Human-readable result of one operation.
pub fn describe_outcome(outcome: &PlaylistOutcome) -> String {
    match outcome {
        PlaylistOutcome::Completed(exit) => {
            let status = match exit.state {
                ExitState::Success => return "done".to_string(),
                ExitState::Failed { code: Some(code) } => format!("downloader exited with code {code}"),
                ExitState::Failed { code: None } => "downloader was killed".to_string(),
                ExitState::TimedOut => "downloader timed out".to_string(),
                ExitState::Cancelled => "cancelled".to_string(),
            };
            match exit.stderr_tail.last() {
                Some(last) => format!("{status}: {last}"),
                None => status,
            }
        }
        PlaylistOutcome::Skipped(reason) => format!("skipped ({reason})"),
        PlaylistOutcome::Failed(error) => format!("failed: {error}"),
    }
}

fn print_outcome(id: &SnapshotId, outcome: &PlaylistOutcome) -> ExitCode {
    println!("{}: {}", id.short(), describe_outcome(outcome));
    if matches!(outcome, PlaylistOutcome::Skipped(_)) || outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(operation: &str, report: &BatchReport) -> ExitCode {
    for entry in &report.entries {
        println!("{}: {}", entry.target, describe_outcome(&entry.outcome));
    }
    println!("{}", format_report_summary(operation, report));
    if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// One-line batch summary.
pub fn format_report_summary(operation: &str, report: &BatchReport) -> String {
    format!(
        "{operation}: {} succeeded, {} skipped, {} failed",
        report.succeeded(),
        report.skipped(),
        report.failed()
    )
}

/// One row of the playlist listing.
pub fn format_view_row(view: &PlaylistView) -> String {
    format!(
        "{}  {}  [{}]  {} tracks, {}  {}",
        view.id.short(),
        view.name,
        view.source,
        view.track_count,
        view.formatted_duration(),
        view.missing_summary()
    )
}

fn format_update(id: &SnapshotId, update: Option<&MissingTracksUpdate>) -> String {
    match update {
        Some(update) if update.missing.is_empty() => {
            format!("{}: {}", update.list_name, update.summary())
        }
        Some(update) => {
            let names: Vec<&str> = update.missing.iter().map(String::as_str).collect();
            format!(
                "{}: {} of {}: {}",
                update.list_name,
                update.summary(),
                update.expected,
                names.join(", ")
            )
        }
        None => format!("{id}: no playlist data"),
    }
}
