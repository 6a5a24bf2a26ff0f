//! # Printer Host Configuration
//!
//! Configuration is read from a single TOML file at startup.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud = 250000
//!
//! [printer]
//! window_size = 20
//! refill_threshold = 10
//! handshake_delay_ms = 5000
//! handshake_commands = ["M115"]
//!
//! [web]
//! bind = "0.0.0.0:3000"
//!
//! [uploads]
//! index = "data/uploads.json"
//! directory = "files"
//! ```
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use marlin_host::config::Config;
//! let toml_str = r#"
//! [connection]
//! port = "/dev/ttyACM0"
//! "#;
//! let config: Config = toml::from_str(toml_str).unwrap();
//! assert_eq!(config.connection.baud, 250000);
//! assert_eq!(config.printer.window_size, 20);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the serial connection, the engine and the outer surfaces.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Serial port the firmware is attached to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: "".to_string(),
            baud: default_baud(),
        }
    }
}

/// Flow control and handshake tuning for the engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_refill_threshold")]
    pub refill_threshold: usize,
    #[serde(default = "default_handshake_delay_ms")]
    pub handshake_delay_ms: u64,
    #[serde(default = "default_handshake_commands")]
    pub handshake_commands: Vec<String>,
    #[serde(default = "default_ack_token")]
    pub ack_token: String,
    #[serde(default)]
    pub jog_feedrate: Option<f64>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            refill_threshold: default_refill_threshold(),
            handshake_delay_ms: default_handshake_delay_ms(),
            handshake_commands: default_handshake_commands(),
            ack_token: default_ack_token(),
            jog_feedrate: None,
        }
    }
}

impl PrinterConfig {
    pub fn handshake_delay(&self) -> Duration {
        Duration::from_millis(self.handshake_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Location of the upload index and the stored G-code files.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_index")]
    pub index: PathBuf,
    #[serde(default = "default_upload_directory")]
    pub directory: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            index: default_upload_index(),
            directory: default_upload_directory(),
        }
    }
}

impl Config {
    /// Checks everything that must hold before the engine may be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.port.trim().is_empty() {
            return Err(ConfigError::Invalid("connection.port must not be empty".to_string()));
        }
        if self.connection.baud == 0 {
            return Err(ConfigError::Invalid("connection.baud must be > 0".to_string()));
        }
        let printer = &self.printer;
        if printer.window_size == 0 {
            return Err(ConfigError::Invalid("printer.window_size must be > 0".to_string()));
        }
        if printer.refill_threshold == 0 || printer.refill_threshold >= printer.window_size {
            return Err(ConfigError::Invalid(format!(
                "printer.refill_threshold must be between 1 and {} (window_size - 1)",
                printer.window_size - 1
            )));
        }
        if printer.ack_token.trim().is_empty() {
            return Err(ConfigError::Invalid("printer.ack_token must not be empty".to_string()));
        }
        if let Some(feedrate) = printer.jog_feedrate {
            if !(feedrate.is_finite() && feedrate > 0.0) {
                return Err(ConfigError::Invalid("printer.jog_feedrate must be > 0".to_string()));
            }
        }
        Ok(())
    }
}

fn default_baud() -> u32 { 250000 }
fn default_window_size() -> usize { 20 }
fn default_refill_threshold() -> usize { 10 }
fn default_handshake_delay_ms() -> u64 { 5000 }
fn default_handshake_commands() -> Vec<String> { vec!["M115".to_string()] }
fn default_ack_token() -> String { "ok".to_string() }
fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_upload_index() -> PathBuf { PathBuf::from("data/uploads.json") }
fn default_upload_directory() -> PathBuf { PathBuf::from("files") }

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
