//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; an empty file yields
//! [`Config::default`]. Command-line flags are applied on top by the binary.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{FreedError, Result};
use crate::freed::protocol::FREED_PACKET_SIZE;
use crate::genlock::timecode::whole_fps;
use crate::genlock::SpareInterpretation;
use crate::session::{SessionConfig, SessionOptions, DEFAULT_BUFFER_SIZE, MAX_RECV_TIMEOUT};
use crate::units::calibration::CalibrationTable;
use crate::units::{ScaleFactors, UnitConverter};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub receiver: ReceiverConfig,

    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub units: ScaleFactors,

    #[serde(default)]
    pub spare: SpareConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// UDP receiver configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReceiverConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

/// Packet validation and conversion
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DecodeConfig {
    #[serde(default)]
    pub ignore_checksum: bool,

    #[serde(default)]
    pub checksum_fatal: bool,

    #[serde(default = "default_convert_units")]
    pub convert_units: bool,
}

/// Spare word interpretation
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SpareConfig {
    #[serde(flatten)]
    pub interpretation: SpareInterpretation,

    /// Frame rate for timecode rendering; no timecode when absent
    #[serde(default)]
    pub timecode_fps: Option<f64>,
}

/// Lens calibration tables as `[raw, physical]` pairs
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    #[serde(default = "CalibrationTable::premista_zoom")]
    pub zoom: CalibrationTable,

    #[serde(default = "CalibrationTable::premista_focus")]
    pub focus: CalibrationTable,
}

/// Packet generator configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SimulatorConfig {
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_rate_hz")]
    pub rate_hz: u32,

    #[serde(default = "default_camera_id")]
    pub camera_id: u8,

    #[serde(default = "default_genlock")]
    pub genlock: bool,

    #[serde(default)]
    pub sweep: bool,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily-rotated log file; console only when absent
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 45000 }
fn default_recv_timeout_ms() -> u64 { 1000 }
fn default_buffer_size() -> usize { DEFAULT_BUFFER_SIZE }

fn default_convert_units() -> bool { true }

fn default_target() -> String { "127.0.0.1:45000".to_string() }
fn default_rate_hz() -> u32 { 25 }
fn default_camera_id() -> u8 { 1 }
fn default_genlock() -> bool { true }

fn default_log_level() -> String { "info".to_string() }
fn default_log_file_prefix() -> String { "freed-reader.log".to_string() }

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            recv_timeout_ms: default_recv_timeout_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            ignore_checksum: false,
            checksum_fatal: false,
            convert_units: default_convert_units(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            zoom: CalibrationTable::premista_zoom(),
            focus: CalibrationTable::premista_focus(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            rate_hz: default_rate_hz(),
            camera_id: default_camera_id(),
            genlock: default_genlock(),
            sweep: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_prefix: default_log_file_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails (including unordered calibration tables)
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use freed_reader::config::Config;
    ///
    /// let config = Config::load("freed-reader.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Called by [`Config::load`]; call again after applying overrides.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.receiver.host.is_empty() {
            return Err(FreedError::config("receiver host cannot be empty"));
        }

        if self.receiver.port == 0 {
            return Err(FreedError::config("receiver port must be between 1 and 65535"));
        }

        let max_timeout_ms = MAX_RECV_TIMEOUT.as_millis() as u64;
        if self.receiver.recv_timeout_ms == 0 || self.receiver.recv_timeout_ms > max_timeout_ms {
            return Err(FreedError::config(format!(
                "recv_timeout_ms must be between 1 and {}",
                max_timeout_ms
            )));
        }

        if self.receiver.buffer_size < FREED_PACKET_SIZE {
            return Err(FreedError::config(format!(
                "buffer_size must be at least {} bytes",
                FREED_PACKET_SIZE
            )));
        }

        for (name, value) in [
            ("rotation", self.units.rotation),
            ("position", self.units.position),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FreedError::config(format!(
                    "{} scale must be a positive number",
                    name
                )));
            }
        }

        if let Some(fps) = self.spare.timecode_fps {
            whole_fps(fps)?;
        }

        if self.simulator.target.is_empty() {
            return Err(FreedError::config("simulator target cannot be empty"));
        }

        if self.simulator.rate_hz == 0 || self.simulator.rate_hz > 1000 {
            return Err(FreedError::config("simulator rate_hz must be between 1 and 1000"));
        }

        if self.logging.level.is_empty() {
            return Err(FreedError::config("logging level cannot be empty"));
        }

        if self.logging.directory.is_some() && self.logging.file_prefix.is_empty() {
            return Err(FreedError::config(
                "logging file_prefix cannot be empty when a directory is set",
            ));
        }

        Ok(())
    }

    /// Session options from the `[decode]` and `[spare]` sections
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            ignore_checksum: self.decode.ignore_checksum,
            checksum_fatal: self.decode.checksum_fatal,
            timecode_fps: self.spare.timecode_fps,
            convert_units: self.decode.convert_units,
            ..SessionOptions::default()
        }
    }

    /// Complete session configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.receiver.host.clone(),
            port: self.receiver.port,
            recv_timeout: Duration::from_millis(self.receiver.recv_timeout_ms),
            buffer_size: self.receiver.buffer_size,
            options: self.session_options(),
            converter: UnitConverter::new(
                self.units,
                self.calibration.zoom.clone(),
                self.calibration.focus.clone(),
            ),
            spare: self.spare.interpretation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genlock::analyzer::GenlockMode;
    use crate::genlock::timecode::TimecodeMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load_str(toml_content: &str) -> Result<Config> {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        Config::load(temp_file.path())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.receiver.host, "0.0.0.0");
        assert_eq!(config.receiver.port, 45000);
        assert_eq!(config.receiver.recv_timeout_ms, 1000);
        assert_eq!(config.receiver.buffer_size, 65_507);
        assert!(config.decode.convert_units);
        assert_eq!(config.spare.timecode_fps, None);
        assert_eq!(config.calibration.zoom, CalibrationTable::premista_zoom());
        assert_eq!(config.simulator.rate_hz, 25);
    }

    #[test]
    fn test_empty_file_equals_default() {
        let config = load_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let toml_content = r#"
[receiver]
host = "127.0.0.1"
port = 6301
recv_timeout_ms = 250

[decode]
ignore_checksum = true
convert_units = false

[units]
rotation = 0.001

[spare]
genlock = "lock-flag"
timecode = "disabled"
timecode_fps = 25.0

[calibration]
zoom = [[0.0, 10.0], [1000.0, 20.0]]

[simulator]
target = "192.168.1.20:45000"
rate_hz = 50
genlock = false

[logging]
level = "debug"
directory = "./logs"
"#;

        let config = load_str(toml_content).unwrap();
        assert_eq!(config.receiver.host, "127.0.0.1");
        assert_eq!(config.receiver.port, 6301);
        assert!(config.decode.ignore_checksum);
        assert!(!config.decode.convert_units);
        assert_eq!(config.units.rotation, 0.001);
        assert_eq!(config.units.position, 1.0 / 64.0, "unset fields keep defaults");
        assert_eq!(config.spare.interpretation.genlock, GenlockMode::LockFlag);
        assert_eq!(config.spare.interpretation.timecode, TimecodeMode::Disabled);
        assert_eq!(config.spare.timecode_fps, Some(25.0));
        assert_eq!(config.calibration.zoom.interpolate(500.0), 15.0);
        assert_eq!(config.calibration.focus, CalibrationTable::premista_focus());
        assert_eq!(config.simulator.rate_hz, 50);
        assert!(!config.simulator.genlock);
        assert_eq!(config.logging.directory.as_deref(), Some("./logs"));

        let session = config.session_config();
        assert_eq!(session.recv_timeout, Duration::from_millis(250));
        assert!(session.options.ignore_checksum);
        assert!(!session.options.convert_units);
        assert_eq!(session.options.timecode_fps, Some(25.0));
        assert_eq!(session.spare.genlock, GenlockMode::LockFlag);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/freed-reader.toml");
        assert!(matches!(result, Err(FreedError::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = load_str("[receiver\nport = ");
        assert!(matches!(result, Err(FreedError::Toml(_))));
    }

    #[test]
    fn test_unordered_calibration_rejected() {
        let result = load_str("[calibration]\nfocus = [[10.0, 1.0], [5.0, 2.0]]\n");
        assert!(result.is_err(), "unordered table must fail to load");
    }

    #[test]
    fn test_empty_calibration_rejected() {
        let result = load_str("[calibration]\nzoom = []\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_host() {
        let mut config = Config::default();
        config.receiver.host = String::new();
        assert!(matches!(config.validate(), Err(FreedError::Config(_))));
    }

    #[test]
    fn test_zero_port() {
        let mut config = Config::default();
        config.receiver.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recv_timeout_range() {
        let mut config = Config::default();
        config.receiver.recv_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.receiver.recv_timeout_ms = 1001;
        assert!(config.validate().is_err());

        config.receiver.recv_timeout_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_smaller_than_packet() {
        let mut config = Config::default();
        config.receiver.buffer_size = 28;
        assert!(config.validate().is_err());

        config.receiver.buffer_size = 29;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_scales() {
        for value in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.units.rotation = value;
            assert!(config.validate().is_err(), "rotation scale {} should be rejected", value);

            let mut config = Config::default();
            config.units.position = value;
            assert!(config.validate().is_err(), "position scale {} should be rejected", value);
        }
    }

    #[test]
    fn test_invalid_timecode_fps() {
        let mut config = Config::default();
        config.spare.timecode_fps = Some(0.0);
        assert!(matches!(config.validate(), Err(FreedError::InvalidFps(_))));

        config.spare.timecode_fps = Some(29.97);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_simulator_rate_range() {
        let mut config = Config::default();
        config.simulator.rate_hz = 0;
        assert!(config.validate().is_err());

        config.simulator.rate_hz = 1001;
        assert!(config.validate().is_err());

        config.simulator.rate_hz = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_prefix_required_with_directory() {
        let mut config = Config::default();
        config.logging.directory = Some("./logs".to_string());
        config.logging.file_prefix = String::new();
        assert!(config.validate().is_err());

        config.logging.directory = None;
        assert!(config.validate().is_ok());
    }
}
