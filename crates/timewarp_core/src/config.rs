//! Timewarp configuration (timewarp.toml)
//!
//! Step sizes, the default rate, keep-in-time settings and shortcut
//! expressions. Every field has a default, so an empty file is valid.

use crate::error::{Result, TimewarpError};
use crate::rate::{is_valid_rate, DEFAULT_RATE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Top-level configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TimewarpConfig {
    /// Factor applied by "multiply"
    #[serde(default = "default_step")]
    pub multiply_rate: f64,
    /// Factor applied by "divide"
    #[serde(default = "default_step")]
    pub divide_rate: f64,
    /// Amount added by "speed up"
    #[serde(default = "default_step")]
    pub increment_rate: f64,
    /// Amount subtracted by "speed down"
    #[serde(default = "default_step")]
    pub decrement_rate: f64,
    /// Rate adopted at startup and on reset
    #[serde(default = "default_rate")]
    pub default_rate: f64,
    /// Periodically re-apply the current rate
    #[serde(default)]
    pub kept_in_time: bool,
    /// Keep-in-time period in real milliseconds
    #[serde(default = "default_kept_interval_ms")]
    pub kept_interval_ms: u64,
    #[serde(default)]
    pub shortcuts: ShortcutConfig,
}

fn default_step() -> f64 {
    2.0
}

fn default_rate() -> f64 {
    DEFAULT_RATE
}

fn default_kept_interval_ms() -> u64 {
    4000
}

impl Default for TimewarpConfig {
    fn default() -> Self {
        Self {
            multiply_rate: default_step(),
            divide_rate: default_step(),
            increment_rate: default_step(),
            decrement_rate: default_step(),
            default_rate: default_rate(),
            kept_in_time: false,
            kept_interval_ms: default_kept_interval_ms(),
            shortcuts: ShortcutConfig::default(),
        }
    }
}

/// Shortcut expressions per action, e.g. `"ctrl + Equal"`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ShortcutConfig {
    #[serde(default = "default_speed_up")]
    pub speed_up: Vec<String>,
    #[serde(default = "default_speed_down")]
    pub speed_down: Vec<String>,
    #[serde(default = "default_multiply")]
    pub multiply: Vec<String>,
    #[serde(default = "default_divide")]
    pub divide: Vec<String>,
    #[serde(default = "default_reset")]
    pub reset: Vec<String>,
    #[serde(default = "default_custom")]
    pub custom: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_speed_up() -> Vec<String> {
    strings(&[
        "ctrl + Equal",
        "meta + Equal",
        "ctrl + Period",
        "meta + Period",
    ])
}

fn default_speed_down() -> Vec<String> {
    strings(&[
        "ctrl + Minus",
        "meta + Minus",
        "ctrl + Comma",
        "meta + Comma",
    ])
}

fn default_multiply() -> Vec<String> {
    strings(&["alt + Equal", "alt + Period"])
}

fn default_divide() -> Vec<String> {
    strings(&["alt + Minus", "alt + Comma"])
}

fn default_reset() -> Vec<String> {
    strings(&["ctrl + Digit0", "meta + Digit0", "alt + Digit0"])
}

fn default_custom() -> Vec<String> {
    strings(&["ctrl + Digit9", "meta + Digit9"])
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            speed_up: default_speed_up(),
            speed_down: default_speed_down(),
            multiply: default_multiply(),
            divide: default_divide(),
            reset: default_reset(),
            custom: default_custom(),
        }
    }
}

/// Opaque key/value lookups with dotted keys (`"shortcuts.reset"`)
pub trait ConfigProvider {
    fn number(&self, key: &str) -> Option<f64>;
    fn flag(&self, key: &str) -> Option<bool>;
    fn strings(&self, key: &str) -> Option<Vec<String>>;
}

impl ConfigProvider for toml::Table {
    fn number(&self, key: &str) -> Option<f64> {
        match lookup(self, key)? {
            toml::Value::Float(v) => Some(*v),
            toml::Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn flag(&self, key: &str) -> Option<bool> {
        lookup(self, key)?.as_bool()
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        match lookup(self, key)? {
            // A single string holds `;`-separated expressions
            toml::Value::String(s) => Some(
                s.split(';')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            toml::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => None,
        }
    }
}

fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut value = table.get(parts.next()?)?;
    for part in parts {
        value = value.as_table()?.get(part)?;
    }
    Some(value)
}

impl TimewarpConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Build a config from opaque lookups, falling back to defaults per key
    pub fn from_provider(provider: &dyn ConfigProvider) -> Self {
        let defaults = Self::default();
        let shortcuts = ShortcutConfig {
            speed_up: provider
                .strings("shortcuts.speed_up")
                .unwrap_or(defaults.shortcuts.speed_up),
            speed_down: provider
                .strings("shortcuts.speed_down")
                .unwrap_or(defaults.shortcuts.speed_down),
            multiply: provider
                .strings("shortcuts.multiply")
                .unwrap_or(defaults.shortcuts.multiply),
            divide: provider
                .strings("shortcuts.divide")
                .unwrap_or(defaults.shortcuts.divide),
            reset: provider
                .strings("shortcuts.reset")
                .unwrap_or(defaults.shortcuts.reset),
            custom: provider
                .strings("shortcuts.custom")
                .unwrap_or(defaults.shortcuts.custom),
        };

        Self {
            multiply_rate: provider
                .number("multiply_rate")
                .unwrap_or(defaults.multiply_rate),
            divide_rate: provider
                .number("divide_rate")
                .unwrap_or(defaults.divide_rate),
            increment_rate: provider
                .number("increment_rate")
                .unwrap_or(defaults.increment_rate),
            decrement_rate: provider
                .number("decrement_rate")
                .unwrap_or(defaults.decrement_rate),
            default_rate: provider
                .number("default_rate")
                .filter(|rate| is_valid_rate(*rate))
                .unwrap_or(defaults.default_rate),
            kept_in_time: provider
                .flag("kept_in_time")
                .unwrap_or(defaults.kept_in_time),
            kept_interval_ms: provider
                .number("kept_interval_ms")
                .filter(|ms| ms.is_finite() && *ms >= 1.0)
                .map(|ms| ms as u64)
                .unwrap_or(defaults.kept_interval_ms),
            shortcuts,
        }
    }

    /// Check values that would break the rate holder or keep-in-time
    pub fn validate(&self) -> Result<()> {
        if !is_valid_rate(self.default_rate) {
            return Err(TimewarpError::InvalidRate(self.default_rate));
        }
        for (name, value) in [
            ("multiply_rate", self.multiply_rate),
            ("divide_rate", self.divide_rate),
            ("increment_rate", self.increment_rate),
            ("decrement_rate", self.decrement_rate),
        ] {
            if !value.is_finite() {
                return Err(TimewarpError::Config(format!(
                    "{} must be a finite number, got {}",
                    name, value
                )));
            }
        }
        if self.kept_interval_ms == 0 {
            return Err(TimewarpError::Config(
                "kept_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
