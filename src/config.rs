//! Configuration loader and validator for the workplace sync engine.
use crate::model::ReconcileMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub remote: Remote,
    pub places: Places,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Realtime database settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Remote {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_saved_fetch_timeout_secs")]
    pub saved_fetch_timeout_secs: u64,
}

/// Places lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Places {
    pub api_key: String,
    #[serde(default = "default_photo_max_width")]
    pub photo_max_width: u32,
    #[serde(default = "default_photo_max_height")]
    pub photo_max_height: u32,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    #[serde(default)]
    pub reconcile: ReconcileMode,
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_saved_fetch_timeout_secs() -> u64 {
    10
}

fn default_photo_max_width() -> u32 {
    800
}

fn default_photo_max_height() -> u32 {
    600
}

impl App {
    /// `data_dir` with a leading `~/` expanded to `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

impl Remote {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn saved_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.saved_fetch_timeout_secs)
    }

    /// Token with blank values treated as absent.
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// `DATABASE_URL` if set, otherwise a SQLite file inside the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}/workplaces.db", self.app.resolved_data_dir())
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.remote.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("remote.base_url must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.remote.base_url).is_err() {
        return Err(ConfigError::Invalid("remote.base_url must be an absolute URL"));
    }
    if cfg.remote.fetch_timeout_secs == 0 {
        return Err(ConfigError::Invalid("remote.fetch_timeout_secs must be > 0"));
    }
    if cfg.remote.saved_fetch_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "remote.saved_fetch_timeout_secs must be > 0",
        ));
    }

    if cfg.places.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("places.api_key must be non-empty"));
    }
    if cfg.places.photo_max_width == 0 || cfg.places.photo_max_height == 0 {
        return Err(ConfigError::Invalid(
            "places.photo_max_width and places.photo_max_height must be > 0",
        ));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

remote:
  base_url: "https://YOUR-PROJECT-default-rtdb.firebaseio.com/"
  auth_token: ""
  fetch_timeout_secs: 20
  saved_fetch_timeout_secs: 10

places:
  api_key: "YOUR_PLACES_API_KEY"
  photo_max_width: 800
  photo_max_height: 600

sync:
  reconcile: additive
"#
}
