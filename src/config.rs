//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POLL_ROOMS_CONFIG_PATH";

const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Which poll store the server installs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// MongoDB, supervised and reconnected in the background.
    #[default]
    Mongo,
    /// Process-local store; data is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    storage_timeout: Duration,
    sweep_interval: Duration,
    trust_forwarded_for: bool,
    store: StoreBackend,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        store = ?app_config.store,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent fields take their default value.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Upper bound on a single poll store call.
    pub fn storage_timeout(&self) -> Duration {
        self.storage_timeout
    }

    /// Period of the background rate-limit and lock sweep.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Whether the first `X-Forwarded-For` entry is used as the client origin.
    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    /// Configured storage backend.
    pub fn store(&self) -> StoreBackend {
        self.store
    }

    /// Same configuration with a different storage backend.
    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = store;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    storage_timeout_ms: u64,
    sweep_interval_secs: u64,
    trust_forwarded_for: bool,
    store: StoreBackend,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            trust_forwarded_for: true,
            store: StoreBackend::default(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            storage_timeout: Duration::from_millis(value.storage_timeout_ms.max(1)),
            sweep_interval: Duration::from_secs(value.sweep_interval_secs.max(1)),
            trust_forwarded_for: value.trust_forwarded_for,
            store: value.store,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.storage_timeout(), Duration::from_secs(5));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert!(config.trust_forwarded_for());
        assert_eq!(config.store(), StoreBackend::Mongo);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config =
            AppConfig::from_json(r#"{"store":"memory","trust_forwarded_for":false}"#).unwrap();
        assert_eq!(config.store(), StoreBackend::Memory);
        assert!(!config.trust_forwarded_for());
        assert_eq!(config.storage_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_durations_are_clamped() {
        let config =
            AppConfig::from_json(r#"{"storage_timeout_ms":0,"sweep_interval_secs":0}"#).unwrap();
        assert_eq!(config.storage_timeout(), Duration::from_millis(1));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(AppConfig::from_json(r#"{"store":"couch"}"#).is_err());
    }
}
