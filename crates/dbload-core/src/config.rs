use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// libcurl tuning for remote fetches (optional `[fetch]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Seconds allowed to establish the connection.
    pub connect_timeout_secs: u64,
    /// Abort when the transfer stays below this many bytes/sec ...
    pub low_speed_limit: u32,
    /// ... for this many seconds.
    pub low_speed_time_secs: u64,
    /// Hard cap on the whole transfer, in seconds.
    pub timeout_secs: u64,
    /// Maximum number of redirects to follow.
    pub max_redirections: u32,
    /// Receive buffer size in bytes (None = libcurl default).
    #[serde(default)]
    pub buffer_size: Option<usize>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            timeout_secs: 3600,
            max_redirections: 10,
            buffer_size: None,
        }
    }
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn low_speed_time(&self) -> Duration {
        Duration::from_secs(self.low_speed_time_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bearer tokens allowed to use the load API, keyed by actor id.
/// An empty table leaves the API open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

/// Global configuration loaded from `~/.config/dbload/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbloadConfig {
    /// Address the HTTP service listens on.
    pub bind: String,
    /// Public base URL used to build absolute `status_url`s (e.g. "http://localhost").
    /// When unset, status URLs are relative paths.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Where in-flight downloads are staged. Defaults to the XDG cache dir.
    #[serde(default)]
    pub staging_directory: Option<PathBuf>,
    /// Where installed databases live. Defaults to the XDG data dir.
    #[serde(default)]
    pub database_directory: Option<PathBuf>,
    /// Switch installed databases to WAL journal mode.
    #[serde(default)]
    pub enable_wal: bool,
    /// URL schemes accepted by the submission endpoint.
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,
    /// Refuse archives whose database would expand past this multiple of the archive size.
    #[serde(default = "default_max_archive_ratio")]
    pub max_archive_ratio: u64,
    /// Interval used by `dbload load` between status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional fetch tuning; if missing, built-in defaults are used.
    #[serde(default)]
    pub fetch: Option<FetchConfig>,
    /// Optional access tokens; if missing, the API is open.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_max_archive_ratio() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for DbloadConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".to_string(),
            base_url: None,
            staging_directory: None,
            database_directory: None,
            enable_wal: false,
            allowed_schemes: default_allowed_schemes(),
            max_archive_ratio: default_max_archive_ratio(),
            poll_interval_ms: default_poll_interval_ms(),
            fetch: None,
            auth: None,
        }
    }
}

impl DbloadConfig {
    /// Staging directory, falling back to `~/.cache/dbload/staging`.
    pub fn staging_dir(&self) -> Result<PathBuf> {
        match &self.staging_directory {
            Some(p) => Ok(p.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix("dbload")?;
                Ok(xdg_dirs.get_cache_home().join("staging"))
            }
        }
    }

    /// Database directory, falling back to `~/.local/share/dbload/databases`.
    pub fn database_dir(&self) -> Result<PathBuf> {
        match &self.database_directory {
            Some(p) => Ok(p.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix("dbload")?;
                Ok(xdg_dirs.get_data_home().join("databases"))
            }
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        self.fetch.clone().unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dbload")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DbloadConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DbloadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}

/// Load configuration from an explicit path (no defaults file is written).
pub fn load_from_path(path: &Path) -> Result<DbloadConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: DbloadConfig = toml::from_str(&data)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    Ok(cfg)
}
