//! Configuration for the daypoint engine and its CLI.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the journal store and the sensor state file
    pub data_path: PathBuf,

    /// IANA timezone used for human-readable times
    pub timezone: String,

    /// Events of the same kind closer than this are rejected as duplicates
    #[serde(rename = "duplicate_event_window_secs", with = "duration_serde")]
    pub duplicate_event_window: Duration,

    /// Retention and recovery thresholds of the window
    #[serde(default)]
    pub window: WindowPolicy,

    /// Capacity of the UI notification channel
    pub notification_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sleep-daypoint");

        Self {
            data_path: data_dir,
            timezone: "UTC".to_string(),
            duplicate_event_window: Duration::from_secs(60),
            window: WindowPolicy::default(),
            notification_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.tz()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sleep-daypoint")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_path.join("journal.json")
    }

    pub fn sensor_path(&self) -> PathBuf {
        self.data_path.join("sensor.json")
    }

    /// Parsed timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn duplicate_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.duplicate_event_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60))
    }
}

/// Hour thresholds used when purging and recovering window slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPolicy {
    /// Slots whose record started this long ago are purged
    pub purge_after_hours: i64,
    /// Cold-start recovery looks this far back in storage
    pub recovery_window_hours: i64,
    /// Records younger than this may still be tonight's
    pub recent_window_hours: i64,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            purge_after_hours: 24,
            recovery_window_hours: 36,
            recent_window_hours: 18,
        }
    }
}

impl WindowPolicy {
    pub fn purge_after(&self) -> chrono::Duration {
        chrono::Duration::hours(self.purge_after_hours)
    }

    pub fn recovery_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recovery_window_hours)
    }

    pub fn recent_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recent_window_hours)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.duplicate_event_window, Duration::from_secs(60));
        assert_eq!(config.window.purge_after_hours, 24);
        assert_eq!(config.window.recovery_window_hours, 36);
        assert_eq!(config.window.recent_window_hours, 18);
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");

        let mut config = Config::default();
        config.timezone = "Europe/Berlin".to_string();
        config.duplicate_event_window = Duration::from_secs(90);
        config.save_to(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"duplicate_event_window_secs\": 90"));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.tz().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        config.save_to(&path).unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Config::default());
    }
}
