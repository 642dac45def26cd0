//! Configuration for EngraveKit
//!
//! Configuration is organized into logical sections:
//! - Connection settings (transport, timeouts, recovery)
//! - Laser settings (power, feed, passes)
//! - Text settings (heights, shrink step, font, spacing)
//! - Intake settings (event monitoring)
//! - Job settings (retry policy, history)
//! - Server settings (HTTP bind address)
//!
//! The engraving area is deliberately not part of [`Config`]; it lives in
//! its own document, see [`crate::area`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use engravekit_core::BackoffPolicy;

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};

/// A settings file that can be validated, loaded and saved
pub trait SettingsDocument:
    Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Check every field; the first violation is reported
    fn validate(&self) -> ConfigResult<()>;

    /// Load from a `.json` or `.toml` file
    fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let doc: Self = match extension(path) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into())
            }
        };

        doc.validate()?;
        Ok(doc)
    }

    /// Validate then save atomically; format follows the file extension
    fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into())
            }
        };

        engravekit_core::persist::write_atomic(path, content.as_bytes())
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Device link transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Serial/USB connection
    Serial,
    /// Telnet-style TCP connection (FluidNC network mode)
    Tcp,
    /// In-process simulated controller
    Simulated,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub connection_type: ConnectionType,
    /// Serial device path
    pub serial_port: String,
    pub baud_rate: u32,
    /// Controller hostname or IP for TCP
    pub host: String,
    pub tcp_port: u16,
    /// Per-command response timeout
    pub command_timeout_ms: u64,
    /// Timeout for the homing cycle, which runs much longer than a command
    pub homing_timeout_ms: u64,
    /// Consecutive failed exchanges before the session reports Disconnected
    pub max_consecutive_failures: u32,
    /// Reconnect attempts after a failed exchange
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
    pub reconnect_backoff_max_ms: u64,
    /// Status poll period while idle
    pub status_poll_ms: u64,
    /// Reconnect from the poller while disconnected
    pub auto_reconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Serial,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            host: "fluidnc.local".to_string(),
            tcp_port: 23,
            command_timeout_ms: 5000,
            homing_timeout_ms: 60_000,
            max_consecutive_failures: 3,
            reconnect_attempts: 3,
            reconnect_backoff_ms: 500,
            reconnect_backoff_max_ms: 8000,
            status_poll_ms: 1000,
            auto_reconnect: true,
        }
    }
}

impl ConnectionSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.reconnect_backoff_ms, self.reconnect_backoff_max_ms)
    }

    /// Human readable endpoint
    pub fn endpoint(&self) -> String {
        match self.connection_type {
            ConnectionType::Serial => format!("{}@{}", self.serial_port, self.baud_rate),
            ConnectionType::Tcp => format!("{}:{}", self.host, self.tcp_port),
            ConnectionType::Simulated => "simulated".to_string(),
        }
    }
}

/// Laser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaserSettings {
    /// Power as a percentage of `spindle_max`
    pub power_percent: f64,
    pub speed_mm_per_min: f64,
    /// Times the full glyph path is repeated
    pub passes: u32,
    /// Firmware S value at 100% power
    pub spindle_max: u32,
    /// Z height to engrave at; zero disables Z moves
    pub z_height_mm: f64,
}

impl Default for LaserSettings {
    fn default() -> Self {
        Self {
            power_percent: 50.0,
            speed_mm_per_min: 1000.0,
            passes: 1,
            spindle_max: 1000,
            z_height_mm: 0.0,
        }
    }
}

/// Text settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSettings {
    pub initial_height_mm: f64,
    pub min_height_mm: f64,
    /// Height decrement applied when a name does not fit
    pub shrink_step_mm: f64,
    /// Font profile key
    pub font: String,
    /// Gap reserved to the right of and above every name
    pub spacing_mm: f64,
    /// Flip glyphs vertically for beds whose Y axis points at the operator
    pub mirror_y: bool,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            initial_height_mm: 5.0,
            min_height_mm: 2.0,
            shrink_step_mm: 1.0,
            font: "simplex".to_string(),
            spacing_mm: 1.5,
            mirror_y: true,
        }
    }
}

/// Event intake settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    /// Start event monitoring at launch
    pub monitor_on_start: bool,
    /// Bounded channel capacity between adapters and the queue
    pub channel_capacity: usize,
    pub poll_interval_ms: u64,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            monitor_on_start: true,
            channel_capacity: 256,
            poll_interval_ms: 2000,
        }
    }
}

/// Job queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Automatic requeues after transient hardware failures
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Finished requests kept in the queue file
    pub history_limit: usize,
    /// Write every compiled program to the programs directory
    pub archive_programs: bool,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 2000,
            retry_max_delay_ms: 60_000,
            history_limit: 500,
            archive_programs: true,
        }
    }
}

impl JobSettings {
    pub fn retry_backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.retry_base_delay_ms, self.retry_max_delay_ms)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub laser_settings: LaserSettings,
    pub text_settings: TextSettings,
    pub intake: IntakeSettings,
    pub jobs: JobSettings,
    pub server: ServerSettings,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a partial JSON document on top of this configuration.
    ///
    /// Objects merge key by key; any other value replaces the target. Keys
    /// that do not exist in the schema are refused.
    pub fn merged(&self, patch: &Value) -> SettingsResult<Config> {
        let mut base = serde_json::to_value(self)?;
        deep_merge(&mut base, patch, "")?;
        let merged: Config = serde_json::from_value(base)
            .map_err(|e| ConfigError::InvalidUpdate(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }
}

fn deep_merge(base: &mut Value, patch: &Value, prefix: &str) -> ConfigResult<()> {
    let Value::Object(patch_map) = patch else {
        return Err(ConfigError::InvalidUpdate(
            "update must be a JSON object".to_string(),
        ));
    };
    let Value::Object(base_map) = base else {
        return Err(ConfigError::InvalidUpdate(format!(
            "'{}' is not a section",
            prefix
        )));
    };

    for (key, value) in patch_map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let Some(target) = base_map.get_mut(key) else {
            return Err(ConfigError::InvalidUpdate(format!("unknown key '{}'", path)));
        };
        if target.is_object() && value.is_object() {
            deep_merge(target, value, &path)?;
        } else {
            *target = value.clone();
        }
    }
    Ok(())
}

fn ensure(cond: bool, key: &str, value: impl std::fmt::Display) -> ConfigResult<()> {
    if cond {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(key, value))
    }
}

impl SettingsDocument for Config {
    fn validate(&self) -> ConfigResult<()> {
        let c = &self.connection;
        ensure(c.command_timeout_ms > 0, "connection.command_timeout_ms", c.command_timeout_ms)?;
        ensure(c.homing_timeout_ms > 0, "connection.homing_timeout_ms", c.homing_timeout_ms)?;
        ensure(c.baud_rate > 0, "connection.baud_rate", c.baud_rate)?;
        ensure(
            c.max_consecutive_failures >= 1,
            "connection.max_consecutive_failures",
            c.max_consecutive_failures,
        )?;
        ensure(c.status_poll_ms > 0, "connection.status_poll_ms", c.status_poll_ms)?;
        ensure(
            c.reconnect_backoff_max_ms >= c.reconnect_backoff_ms,
            "connection.reconnect_backoff_max_ms",
            c.reconnect_backoff_max_ms,
        )?;

        let l = &self.laser_settings;
        ensure(
            l.power_percent.is_finite() && (0.0..=100.0).contains(&l.power_percent),
            "laser_settings.power_percent",
            l.power_percent,
        )?;
        ensure(
            l.speed_mm_per_min.is_finite() && l.speed_mm_per_min > 0.0,
            "laser_settings.speed_mm_per_min",
            l.speed_mm_per_min,
        )?;
        ensure(
            (1..=50).contains(&l.passes),
            "laser_settings.passes",
            l.passes,
        )?;
        ensure(l.spindle_max > 0, "laser_settings.spindle_max", l.spindle_max)?;
        ensure(
            l.z_height_mm.is_finite(),
            "laser_settings.z_height_mm",
            l.z_height_mm,
        )?;

        let t = &self.text_settings;
        ensure(
            t.min_height_mm.is_finite() && t.min_height_mm > 0.0,
            "text_settings.min_height_mm",
            t.min_height_mm,
        )?;
        ensure(
            t.initial_height_mm.is_finite() && t.initial_height_mm >= t.min_height_mm,
            "text_settings.initial_height_mm",
            t.initial_height_mm,
        )?;
        ensure(
            t.shrink_step_mm.is_finite() && t.shrink_step_mm > 0.0,
            "text_settings.shrink_step_mm",
            t.shrink_step_mm,
        )?;
        ensure(
            t.spacing_mm.is_finite() && t.spacing_mm >= 0.0,
            "text_settings.spacing_mm",
            t.spacing_mm,
        )?;
        if t.font.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                key: "text_settings.font".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        ensure(
            self.intake.channel_capacity >= 1,
            "intake.channel_capacity",
            self.intake.channel_capacity,
        )?;
        ensure(
            self.intake.poll_interval_ms > 0,
            "intake.poll_interval_ms",
            self.intake.poll_interval_ms,
        )?;

        let j = &self.jobs;
        ensure(j.retry_base_delay_ms > 0, "jobs.retry_base_delay_ms", j.retry_base_delay_ms)?;
        ensure(
            j.retry_max_delay_ms >= j.retry_base_delay_ms,
            "jobs.retry_max_delay_ms",
            j.retry_max_delay_ms,
        )?;

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidSetting {
                key: "server.bind_address".to_string(),
                reason: format!("'{}' is not a socket address", self.server.bind_address),
            });
        }

        Ok(())
    }
}
