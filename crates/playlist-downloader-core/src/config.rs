//! Application paths, user configuration and the startup context.
//!
//! Startup follows a fixed order: resolve paths, ensure the directories
//! exist, then load the configuration file. The resulting [`AppContext`] is
//! passed explicitly to every component; nothing here is global.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, FileSystemError, Result};
use crate::snapshot::SnapshotStore;

/// Directory name used under the platform data and config directories.
pub const APP_DIR_NAME: &str = "playlist_downloader";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PLAYLIST_DOWNLOADER_DATA_DIR";

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "PLAYLIST_DOWNLOADER_CONFIG";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Filesystem locations used by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Directory holding snapshots, logs and the default library.
    pub data_dir: PathBuf,
    /// Path of the user config file.
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Create paths from explicit locations.
    #[must_use]
    pub const fn new(data_dir: PathBuf, config_file: PathBuf) -> Self {
        Self {
            data_dir,
            config_file,
        }
    }

    /// Keep everything, config included, under one directory.
    #[must_use]
    pub fn portable(data_dir: PathBuf) -> Self {
        let config_file = data_dir.join(CONFIG_FILE_NAME);
        Self::new(data_dir, config_file)
    }

    /// Resolve platform locations, honoring the environment overrides.
    #[must_use]
    pub fn resolve() -> Self {
        let data_dir = env::var_os(DATA_DIR_ENV).map_or_else(
            || {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(APP_DIR_NAME)
            },
            PathBuf::from,
        );

        let config_file = env::var_os(CONFIG_PATH_ENV).map_or_else(
            || {
                dirs::config_dir()
                    .unwrap_or_else(|| data_dir.clone())
                    .join(APP_DIR_NAME)
                    .join(CONFIG_FILE_NAME)
            },
            PathBuf::from,
        );

        Self::new(data_dir, config_file)
    }

    /// Library root used when the user has not chosen one.
    #[must_use]
    pub fn default_library_dir(&self) -> PathBuf {
        self.data_dir.join("library")
    }

    /// Directory for rolling log files.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Create the data directory and the default library directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.default_library_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(|e| {
                    Error::FileSystem(FileSystemError::CreateDirFailed {
                        path: dir.clone(),
                        reason: e.to_string(),
                    })
                })?;
                debug!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }
}

/// User settings persisted in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    /// Library root chosen by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    /// Downloader executable, when not `spotdl` on PATH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotdl_path: Option<PathBuf>,
    /// Upper bound for one downloader run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Load configuration from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to read config file: {e}"),
            })
        })?;

        let config: Self = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to create config directory: {e}"),
                })
            })?;
        }

        let content = toml::to_string(self)?;
        fs::write(path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to write config file: {e}"),
            })
        })?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Configured downloader timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Everything a component needs to know about where things live.
#[derive(Debug, Clone)]
pub struct AppContext {
    paths: AppPaths,
    config: AppConfig,
    store: SnapshotStore,
}

impl AppContext {
    /// Build the context: ensure directories exist, then load the config.
    pub fn init(paths: AppPaths) -> Result<Self> {
        paths.ensure_dirs()?;
        let config = AppConfig::load(&paths.config_file)?;
        let store = SnapshotStore::new(paths.data_dir.clone())?;

        debug!(
            "Context ready: data={}, config={}",
            paths.data_dir.display(),
            paths.config_file.display()
        );
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    /// Resolved paths.
    #[must_use]
    pub const fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Snapshot store in the data directory.
    #[must_use]
    pub const fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Library root: the configured one, or `<data_dir>/library`.
    #[must_use]
    pub fn library_root(&self) -> PathBuf {
        self.config
            .library
            .clone()
            .unwrap_or_else(|| self.paths.default_library_dir())
    }

    /// Choose a new library root and persist it.
    pub fn set_library(&mut self, path: PathBuf) -> Result<()> {
        validate_library_directory(&path)?;
        let mut config = self.config.clone();
        config.library = Some(path);
        config.save(&self.paths.config_file)?;
        self.config = config;
        info!("Library root set to {}", self.library_root().display());
        Ok(())
    }
}

/// Check that a directory can serve as library root, creating it if needed.
fn validate_library_directory(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Configuration(format!(
            "Library directory must be an absolute path: {}",
            path.display()
        )));
    }

    if path.exists() {
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "Path exists but is not a directory: {}",
                path.display()
            )));
        }
    } else {
        fs::create_dir_all(path).map_err(|e| {
            Error::Configuration(format!("Cannot create directory {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_empty() {
        let config = AppConfig::default();
        assert!(config.library.is_none());
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let config = AppConfig::load(&temp_dir.path().join("nope.toml")).expect("Should load");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_config_file_format() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "library = \"/music/library\"\ntimeout_secs = 600\n").expect("write");

        let config = AppConfig::load(&path).expect("Should load");
        assert_eq!(config.library, Some(PathBuf::from("/music/library")));
        assert_eq!(config.timeout(), Some(Duration::from_secs(600)));
        assert!(config.spotdl_path.is_none());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config = AppConfig {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "library = [").expect("write");

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::TomlDe(_)));
    }

    #[test]
    fn test_save_creates_parent() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("nested/dir/config.toml");
        let config = AppConfig {
            library: Some(PathBuf::from("/lib")),
            ..Default::default()
        };

        config.save(&path).expect("Should save");
        assert_eq!(AppConfig::load(&path).expect("Should load"), config);
    }

    #[test]
    fn test_context_init_creates_directories() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let paths = AppPaths::portable(temp_dir.path().join("data"));

        let context = AppContext::init(paths.clone()).expect("Should init");
        assert!(paths.data_dir.is_dir());
        assert!(paths.default_library_dir().is_dir());
        assert_eq!(context.library_root(), paths.default_library_dir());
        assert_eq!(context.store().data_dir(), paths.data_dir.as_path());
    }

    #[test]
    fn test_set_library_persists() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let paths = AppPaths::portable(temp_dir.path().join("data"));
        let library = temp_dir.path().join("Music");

        let mut context = AppContext::init(paths.clone()).expect("Should init");
        context.set_library(library.clone()).expect("Should set");
        assert!(library.is_dir());

        let reloaded = AppContext::init(paths).expect("Should init again");
        assert_eq!(reloaded.library_root(), library);
    }

    #[test]
    fn test_set_library_keeps_old_root_when_save_fails() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let config_file = temp_dir.path().join("config.toml");
        let paths = AppPaths::new(temp_dir.path().join("data"), config_file.clone());
        let mut context = AppContext::init(paths.clone()).expect("Should init");

        // A directory in place of the config file makes the write fail.
        fs::create_dir(&config_file).expect("mkdir");
        let result = context.set_library(temp_dir.path().join("Music"));

        assert!(result.is_err());
        assert_eq!(context.library_root(), paths.default_library_dir());
        assert_eq!(context.config().library, None);
    }

    #[test]
    fn test_set_library_rejects_relative_path() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let mut context =
            AppContext::init(AppPaths::portable(temp_dir.path().to_path_buf())).expect("init");

        let err = context.set_library(PathBuf::from("relative/music")).unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_set_library_rejects_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").expect("write");
        let mut context =
            AppContext::init(AppPaths::portable(temp_dir.path().join("data"))).expect("init");

        let err = context.set_library(file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolved_paths_use_app_dir_name() {
        let paths = AppPaths::resolve();
        if env::var_os(DATA_DIR_ENV).is_none() {
            assert!(paths.data_dir.ends_with(APP_DIR_NAME));
        }
        if env::var_os(CONFIG_PATH_ENV).is_none() {
            assert!(paths.config_file.ends_with(CONFIG_FILE_NAME));
        }
    }
}
