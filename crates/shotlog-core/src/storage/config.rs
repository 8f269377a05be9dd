//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Timer tick interval
//! - Challenge and drill defaults
//! - Delivery deduplication and outbox location
//! - Date display preferences for presentation layers
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::session::{DrillPlan, SessionMode};

/// Timer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

/// Challenge (count-down) defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_challenge_duration")]
    pub default_duration_secs: u32,
}

/// Drill stage policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillConfig {
    #[serde(default = "default_stage_count")]
    pub stage_count: u32,
    /// Makes that complete a stage. Unset means stages advance only on an
    /// explicit signal.
    #[serde(default)]
    pub makes_per_stage: Option<u32>,
}

/// Delivery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_true")]
    pub dedup: bool,
    #[serde(default = "default_outbox_file")]
    pub outbox_file: String,
}

/// Display preferences. Plain values for whatever renders sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_week_starts_on")]
    pub week_starts_on: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
    #[serde(default)]
    pub drill: DrillConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

// Default functions
fn default_tick_interval_secs() -> u64 {
    1
}
fn default_challenge_duration() -> u32 {
    60
}
fn default_stage_count() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_outbox_file() -> String {
    "outbox.json".into()
}
fn default_date_format() -> String {
    "%Y-%m-%d".into()
}
fn default_week_starts_on() -> String {
    "monday".into()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_challenge_duration(),
        }
    }
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            stage_count: default_stage_count(),
            makes_per_stage: None,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            dedup: true,
            outbox_file: default_outbox_file(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            week_starts_on: default_week_starts_on(),
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

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;

            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value
                        .parse::<u64>()
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                        .into(),
                ),
                // Optional fields serialize as null; accept a number or "none".
                serde_json::Value::Null => match value {
                    "none" | "" => serde_json::Value::Null,
                    _ => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                },
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("cannot set a whole section".into()));
                }
                serde_json::Value::String(_) => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
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

    /// Set a value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
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

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.timer.tick_interval_secs == 0 {
            return Err(invalid("timer.tick_interval_secs", "must be at least 1"));
        }
        if self.challenge.default_duration_secs == 0 {
            return Err(invalid("challenge.default_duration_secs", "must be at least 1"));
        }
        if self.drill.stage_count == 0 {
            return Err(invalid("drill.stage_count", "must be at least 1"));
        }
        if self.drill.makes_per_stage == Some(0) {
            return Err(invalid("drill.makes_per_stage", "must be at least 1"));
        }
        if self.delivery.outbox_file.trim().is_empty() {
            return Err(invalid("delivery.outbox_file", "must not be empty"));
        }
        if StrftimeItems::new(&self.display.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(invalid("display.date_format", "not a valid strftime format"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timer.tick_interval_secs)
    }

    pub fn challenge_mode(&self) -> SessionMode {
        SessionMode::ChallengeCountDown {
            duration_secs: self.challenge.default_duration_secs,
        }
    }

    pub fn drill_plan(&self) -> DrillPlan {
        DrillPlan {
            stage_count: self.drill.stage_count,
            makes_per_stage: self.drill.makes_per_stage,
        }
    }

    /// Outbox path, resolved against `dir` when relative.
    pub fn outbox_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.delivery.outbox_file)
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
