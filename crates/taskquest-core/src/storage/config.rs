//! TOML-based application configuration.
//!
//! Stores engine tunables:
//! - Fixed task reward
//! - Cohort soft cap
//! - Night Owl / Early Bird hour windows and the local UTC offset
//! - The local user id used by the CLI
//!
//! Configuration is stored at `~/.config/taskquest/config.toml`.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::league::cohort::DEFAULT_COHORT_CAPACITY;

/// Reward configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// XP awarded per completed task, and removed again on undo.
    #[serde(default = "default_task_reward")]
    pub task_reward: u64,
}

/// League configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueConfig {
    #[serde(default = "default_cohort_capacity")]
    pub cohort_capacity: u32,
}

/// Hour windows for time-of-day achievements, in local hours `[start, end)`.
/// A window whose start is after its end wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowsConfig {
    #[serde(default = "default_night_owl_start")]
    pub night_owl_start: u32,
    #[serde(default = "default_night_owl_end")]
    pub night_owl_end: u32,
    #[serde(default = "default_early_bird_start")]
    pub early_bird_start: u32,
    #[serde(default = "default_early_bird_end")]
    pub early_bird_end: u32,
    /// Offset of the user's local time from UTC, in hours.
    #[serde(default)]
    pub utc_offset_hours: i32,
}

/// Local profile configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/taskquest/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub league: LeagueConfig,
    #[serde(default)]
    pub time_windows: TimeWindowsConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

fn default_task_reward() -> u64 {
    50
}
fn default_cohort_capacity() -> u32 {
    DEFAULT_COHORT_CAPACITY
}
fn default_night_owl_start() -> u32 {
    22
}
fn default_night_owl_end() -> u32 {
    4
}
fn default_early_bird_start() -> u32 {
    5
}
fn default_early_bird_end() -> u32 {
    9
}
fn default_user_id() -> String {
    "local".into()
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            task_reward: default_task_reward(),
        }
    }
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self {
            cohort_capacity: default_cohort_capacity(),
        }
    }
}

impl Default for TimeWindowsConfig {
    fn default() -> Self {
        Self {
            night_owl_start: default_night_owl_start(),
            night_owl_end: default_night_owl_end(),
            early_bird_start: default_early_bird_start(),
            early_bird_end: default_early_bird_end(),
            utc_offset_hours: 0,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
        }
    }
}

/// Time-of-day buckets a completion falls into. Both can be false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HourClass {
    pub night_owl: bool,
    pub early_bird: bool,
}

fn in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

impl TimeWindowsConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.clamp(-23, 23) * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.offset()).hour()
    }

    pub fn classify_hour(&self, hour: u32) -> HourClass {
        HourClass {
            night_owl: in_window(hour, self.night_owl_start, self.night_owl_end),
            early_bird: in_window(hour, self.early_bird_start, self.early_bird_end),
        }
    }

    pub fn classify(&self, now: DateTime<Utc>) -> HourClass {
        self.classify_hour(self.local_hour(now))
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
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
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

    /// Set a value by dot-separated key in memory. Returns error if the key
    /// is unknown or the value has the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
