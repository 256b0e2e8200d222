//! TOML-based application configuration.
//!
//! Stores:
//! - Relay endpoint and request limits
//! - Completion watcher polling parameters
//! - Background check interval
//! - Clip defaults and log filter
//!
//! Configuration is stored at `~/.config/noted/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::storage::data_dir;

/// Relay (backend) endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Article text beyond this many characters is cut before sending.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

/// Completion watcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipConfig {
    #[serde(default = "default_category")]
    pub default_category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/noted/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub clip: ClipConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_base_url() -> String {
    "https://noted-six.vercel.app".into()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_max_content_chars() -> usize {
    4000
}
fn default_max_attempts() -> u32 {
    60
}
fn default_interval_ms() -> u64 {
    2000
}
fn default_monitor_interval_secs() -> u64 {
    300
}
fn default_category() -> String {
    "General News".into()
}
fn default_log_filter() -> String {
    "warn".into()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            default_category: default_category(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        if let Some(parent_path) = parent_path {
            for part in parent_path.split('.') {
                current = current.get_mut(part).ok_or_else(unknown)?;
            }
        }
        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => {
                let n = value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?;
                serde_json::Value::Number(n.into())
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return (and write) the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Like [`Config::load`], against an explicit file.
    ///
    /// Defaults are written only when the file does not exist; any other
    /// read failure is returned so a user's config is never overwritten.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| load_failed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(load_failed(e.to_string())),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value has the wrong type.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value is invalid, or the
    /// config cannot be written.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Reject values the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.relay.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "relay.base_url".into(),
            message: e.to_string(),
        })?;
        if self.watcher.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "watcher.interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "monitor.interval_secs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.relay.base_url, "https://noted-six.vercel.app");
        assert_eq!(config.watcher.max_attempts, 60);
        assert_eq!(config.watcher.interval_ms, 2000);
        assert_eq!(config.relay.max_content_chars, 4000);
        assert_eq!(config.clip.default_category, "General News");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [relay]
            base_url = "http://localhost:8000"

            [watcher]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.relay.base_url, "http://localhost:8000");
        assert_eq!(config.relay.request_timeout_secs, 15);
        assert_eq!(config.watcher.max_attempts, 5);
        assert_eq!(config.watcher.interval_ms, 2000);
        assert_eq!(config.monitor.interval_secs, 300);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_get_by_dotted_key() {
        let config = Config::default();
        assert_eq!(config.get("watcher.max_attempts").as_deref(), Some("60"));
        assert_eq!(
            config.get("relay.base_url").as_deref(),
            Some("https://noted-six.vercel.app")
        );
        assert_eq!(config.get("relay.nope"), None);
        assert_eq!(config.get(""), None);
    }

    #[test]
    fn test_set_value_preserves_types() {
        let mut config = Config::default();
        config.set_value("watcher.max_attempts", "10").unwrap();
        config.set_value("relay.base_url", "http://127.0.0.1:8000").unwrap();
        assert_eq!(config.watcher.max_attempts, 10);
        assert_eq!(config.relay.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_value("watcher.nope", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set_value("watcher.max_attempts", "many"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set_value("relay.base_url", "not a url"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set_value("watcher.interval_ms", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        // Failed sets leave the config untouched.
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_load_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watcher]\nmax_attempts = 7\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.watcher.max_attempts, 7);
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be reads as an error other than NotFound.
        let path = dir.path().join("config.toml");
        std::fs::create_dir(&path).unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
        assert!(path.is_dir());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "watcher = [").unwrap();
        assert!(matches!(
            Config::load_from(&bad),
            Err(ConfigError::LoadFailed { .. })
        ));
        assert_eq!(std::fs::read_to_string(&bad).unwrap(), "watcher = [");
    }
}
