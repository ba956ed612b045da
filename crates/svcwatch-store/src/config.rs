//! Engine configuration and storage-location resolution.
//!
//! [`StoreConfig`] is read from the `[store]` table of a TOML file. A missing
//! file or missing table yields the defaults, and the `SVCWATCH_DATABASE`
//! environment variable overrides the storage path when set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::StoreResult;

/// File name of the storage file inside the program's data directory.
pub const DATABASE_FILE_NAME: &str = "config.db";

/// Environment variable that overrides [`StoreConfig::database`].
pub const DATABASE_ENV_VAR: &str = "SVCWATCH_DATABASE";

/// Default bounded wait on the request queue, in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 2_000;

/// Settings for the storage engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory name under the shared application-data directory.
    ///
    /// Default: **`svcwatch`**.
    #[serde(default = "default_program_name")]
    pub program_name: String,

    /// Explicit storage file. Takes precedence over every other location.
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Replaces the platform shared application-data directory.
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    /// How long the worker waits for a request before releasing an idle
    /// connection.
    ///
    /// Default: **2 000 ms**.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_program_name() -> String {
    "svcwatch".to_string()
}

fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            program_name: default_program_name(),
            database: None,
            data_root: None,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    store: Option<StoreConfig>,
}

impl StoreConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `[store]` table out of a TOML document.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.store.unwrap_or_default())
    }

    /// Load from `path`, falling back to defaults when the file is absent,
    /// then apply the environment override.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `SVCWATCH_DATABASE` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(DATABASE_ENV_VAR)
            && !value.trim().is_empty()
        {
            self.database = Some(PathBuf::from(value));
        }
    }

    /// Set the program name.
    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    /// Set an explicit storage file.
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    /// Replace the shared application-data directory.
    pub fn with_data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_root = Some(path.into());
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }
}

/// Where the storage file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    /// Directory that must exist before the file is created.
    pub directory: PathBuf,
    /// The storage file itself.
    pub file: PathBuf,
}

impl StorageLocation {
    /// Resolve the storage file: an explicit override wins, otherwise
    /// `<data root>/<program name>/config.db`.
    pub fn resolve(
        program_name: &str,
        path_override: Option<&Path>,
        data_root: Option<&Path>,
    ) -> Self {
        match path_override.filter(|p| !p.as_os_str().is_empty()) {
            Some(file) => Self {
                directory: file
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
                file: file.to_path_buf(),
            },
            None => {
                let root = data_root
                    .map(Path::to_path_buf)
                    .unwrap_or_else(shared_data_dir);
                let directory = root.join(program_name);
                Self {
                    file: directory.join(DATABASE_FILE_NAME),
                    directory,
                }
            }
        }
    }
}

/// The platform's machine-wide application-data directory.
pub fn shared_data_dir() -> PathBuf {
    if cfg!(windows) {
        std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/Library/Application Support")
    } else {
        PathBuf::from("/var/lib")
    }
}
