//! Error types for the settings crate.

use std::io;
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file could not be loaded.
    #[error("Failed to load settings from {path}: {reason}")]
    LoadError { path: String, reason: String },

    /// The configuration file could not be saved.
    #[error("Failed to save settings: {0}")]
    SaveError(String),

    /// The data directory could not be found or created.
    #[error("Data directory error: {0}")]
    DataDirectory(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML encode error: {0}")]
    TomlEncodeError(#[from] toml::ser::Error),

    /// A configuration validation error occurred.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to configuration validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of valid range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// A configuration value is not allowed.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// A partial update did not match the configuration schema.
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

impl ConfigError {
    pub(crate) fn out_of_range(key: &str, value: impl std::fmt::Display) -> Self {
        ConfigError::ValueOutOfRange {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<SettingsError> for engravekit_core::Error {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Config(e) => engravekit_core::Error::Validation(e.to_string()),
            SettingsError::IoError(e) => engravekit_core::Error::Io(e),
            other => engravekit_core::Error::Other(other.to_string()),
        }
    }
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::LoadError {
            path: "/tmp/config.toml".to_string(),
            reason: "file not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load settings from /tmp/config.toml: file not found"
        );

        let err = SettingsError::DataDirectory("permission denied".to_string());
        assert_eq!(err.to_string(), "Data directory error: permission denied");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::out_of_range("laser_settings.power_percent", 140);
        assert_eq!(
            err.to_string(),
            "Value out of range for 'laser_settings.power_percent': 140"
        );

        let err = ConfigError::UnsupportedFormat("yaml".to_string());
        assert_eq!(err.to_string(), "Unsupported config format: yaml");
    }

    #[test]
    fn test_error_conversion() {
        let settings_err: SettingsError = ConfigError::InvalidUpdate("bad".to_string()).into();
        assert!(matches!(settings_err, SettingsError::Config(_)));

        let core: engravekit_core::Error = settings_err.into();
        assert_eq!(core.kind(), engravekit_core::ErrorKind::ValidationError);

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let settings_err: SettingsError = io_err.into();
        assert!(matches!(settings_err, SettingsError::IoError(_)));
    }
}
