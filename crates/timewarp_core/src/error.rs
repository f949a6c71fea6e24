//! Timewarp error types

use thiserror::Error;

/// Errors raised by the rate holder, the installer, and config loading
#[derive(Error, Debug)]
pub enum TimewarpError {
    /// Rate was zero, negative, or not a finite number
    #[error("Invalid rate: {0} (must be finite and greater than zero)")]
    InvalidRate(f64),

    /// The environment does not expose a primitive that should be wrapped
    #[error("Environment primitive missing: {0}")]
    PrimitiveMissing(&'static str),

    /// The environment refused to replace a primitive
    #[error("Environment refused to install {primitive}: {reason}")]
    InstallRefused {
        primitive: &'static str,
        reason: String,
    },

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Reading a config file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for TimewarpError {
    fn from(err: toml::de::Error) -> Self {
        TimewarpError::Config(err.to_string())
    }
}

/// Result type for timewarp operations
pub type Result<T> = std::result::Result<T, TimewarpError>;
