//! Application configuration for ReadingPal.
//!
//! User config lives at `~/.readingpal/readingpal.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReadingPalError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "readingpal.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".readingpal";

/// Timeout of every pipeline job, in seconds. Reader requests must finish
/// strictly inside it.
pub const STAGE_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Config structs (matching readingpal.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; a leading `~/` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.readingpal/readingpal.db".into()
}

/// `[reader]` section: the text extraction API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Endpoint prefix; the resource URL is appended as the path.
    #[serde(default = "default_reader_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout; must be below [`STAGE_TIMEOUT_SECS`].
    #[serde(default = "default_reader_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            base_url: default_reader_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_reader_timeout(),
        }
    }
}

fn default_reader_base_url() -> String {
    "https://r.jina.ai".into()
}
fn default_api_key_env() -> String {
    "JINA_AI_API_KEY".into()
}
fn default_reader_timeout() -> u64 {
    8
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Delay between queue polls when idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pipelines executed at once by one worker process.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_pipelines: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_concurrent_pipelines: default_max_concurrent(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}
fn default_max_concurrent() -> u32 {
    4
}

impl AppConfig {
    /// Resolve `storage.database_path`, expanding `~/`.
    pub fn database_path(&self) -> Result<PathBuf> {
        expand_home(&self.storage.database_path)
    }

    /// Reject values the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        let timeout = self.reader.timeout_secs;
        if timeout == 0 || timeout >= STAGE_TIMEOUT_SECS {
            return Err(ReadingPalError::config(format!(
                "reader.timeout_secs must be between 1 and {}, got {timeout}",
                STAGE_TIMEOUT_SECS - 1
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.readingpal/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReadingPalError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.readingpal/readingpal.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReadingPalError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ReadingPalError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReadingPalError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReadingPalError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReadingPalError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the reader API key from the configured env var, if set and non-empty.
pub fn reader_api_key(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.reader.api_key_env) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => {
            tracing::warn!(
                env = %config.reader.api_key_env,
                "reader API key not set; extraction calls will fail"
            );
            None
        }
    }
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ReadingPalError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
