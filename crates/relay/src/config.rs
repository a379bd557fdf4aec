//! Configuration management for the RemoSerial relay.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/remoserial/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{ListenerOptions, ReconnectOptions, ServeMode};
use crate::serial::BridgeOptions;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(u16),

    #[error("idle_limit must be between 1 and 1000, got {0}")]
    InvalidIdleLimit(u32),

    #[error("recv_buffer must be at least {min} bytes, got {got}")]
    InvalidRecvBuffer { got: usize, min: usize },

    #[error("{0} must be greater than 0")]
    ZeroTimeout(&'static str),

    #[error("baud_rate must be greater than 0")]
    InvalidBaudRate,

    #[error("bridge mode requires server.device to be set")]
    MissingBridgeDevice,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Smallest receive buffer that still holds a sealed handshake reply.
pub const MIN_RECV_BUFFER: usize = 1024;

/// Default TCP port for both roles.
pub const DEFAULT_PORT: u16 = 65001;

/// Interface whose carrier the Reconnect Loop checks unless configured otherwise.
pub const DEFAULT_LINK_INTERFACE: &str = "eth0";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,

    /// Connection Listener settings.
    pub server: ServerConfig,

    /// Reconnect Loop settings.
    pub client: ClientConfig,

    /// Serial device settings.
    pub serial: SerialConfig,

    /// Socket settings shared by both roles.
    pub transport: TransportConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// What an accepted connection is used for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Decode commands and dispatch them.
    #[default]
    Command,
    /// Pass every payload through to the serial device.
    Bridge,
}

/// Connection Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to bind.
    pub port: u16,

    /// Seconds to wait for a peer before the whole listener stops.
    pub accept_timeout_secs: u64,

    /// Per-read deadline on an accepted connection in milliseconds.
    pub read_timeout_ms: u64,

    /// Consecutive empty reads tolerated before the connection is closed.
    pub idle_limit: u32,

    /// Command or bridge mode.
    pub mode: ServerMode,

    /// Command mode: keep serving after the first response.
    pub keep_open: bool,

    /// Device used in bridge mode.
    pub device: Option<String>,

    /// Require the key exchange and sealed envelopes.
    pub protected: bool,
}

/// Reconnect Loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Host to dial.
    pub host: String,

    /// Port to dial.
    pub port: u16,

    /// Seconds allowed for the TCP connect.
    pub connect_timeout_secs: u64,

    /// Seconds to wait for each reply.
    pub read_timeout_secs: u64,

    /// Seconds to sleep after a failed attempt.
    pub retry_backoff_secs: u64,

    /// Network interface whose carrier gates the loop. An empty name
    /// disables the check.
    pub link_interface: Option<String>,

    /// Perform the key exchange and seal every message.
    pub protected: bool,
}

/// Serial device settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// Line speed.
    pub baud_rate: u32,

    /// Seconds to wait for the device's reply line.
    pub read_timeout_secs: u64,
}

/// Socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes read per socket read. One read is one message.
    pub recv_buffer: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            accept_timeout_secs: 60,
            read_timeout_ms: 500,
            idle_limit: 10,
            mode: ServerMode::Command,
            keep_open: false,
            device: None,
            protected: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
            retry_backoff_secs: 2,
            link_interface: Some(DEFAULT_LINK_INTERFACE.to_string()),
            protected: false,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout_secs: 10,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { recv_buffer: 1024 }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remoserial")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - REMOSERIAL_LOG_LEVEL: Override log level
    /// - REMOSERIAL_HOST: Override the host dialled by the Reconnect Loop
    /// - REMOSERIAL_PORT: Override the port of both roles
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("REMOSERIAL_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }

        if let Ok(host) = std::env::var("REMOSERIAL_HOST") {
            if !host.is_empty() {
                tracing::info!("Overriding client host from environment: {}", host);
                self.client.host = host;
            }
        }

        if let Ok(port) = std::env::var("REMOSERIAL_PORT") {
            if !port.is_empty() {
                match port.parse::<u16>() {
                    Ok(port) => {
                        tracing::info!("Overriding port from environment: {}", port);
                        self.server.port = port;
                        self.client.port = port;
                    }
                    Err(_) => {
                        tracing::warn!("Ignoring invalid REMOSERIAL_PORT value: {}", port);
                    }
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort(self.server.port));
        }
        if self.client.port == 0 {
            return Err(ConfigError::InvalidPort(self.client.port));
        }

        if self.server.idle_limit < 1 || self.server.idle_limit > 1000 {
            return Err(ConfigError::InvalidIdleLimit(self.server.idle_limit));
        }

        if self.transport.recv_buffer < MIN_RECV_BUFFER {
            return Err(ConfigError::InvalidRecvBuffer {
                got: self.transport.recv_buffer,
                min: MIN_RECV_BUFFER,
            });
        }

        let timeouts = [
            ("server.accept_timeout_secs", self.server.accept_timeout_secs),
            ("server.read_timeout_ms", self.server.read_timeout_ms),
            ("client.connect_timeout_secs", self.client.connect_timeout_secs),
            ("client.read_timeout_secs", self.client.read_timeout_secs),
            ("serial.read_timeout_secs", self.serial.read_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }

        if self.server.mode == ServerMode::Bridge
            && self.server.device.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::MissingBridgeDevice);
        }

        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(
                self.general.log_level.clone(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Options for a Connection Listener.
    pub fn listener_options(&self) -> ListenerOptions {
        ListenerOptions {
            bind_address: self.server.bind_address.clone(),
            port: self.server.port,
            accept_timeout: Duration::from_secs(self.server.accept_timeout_secs),
            read_timeout: Duration::from_millis(self.server.read_timeout_ms),
            idle_limit: self.server.idle_limit,
            recv_buffer: self.transport.recv_buffer,
            protected: self.server.protected,
        }
    }

    /// The serve mode selected by the `[server]` section.
    ///
    /// Returns None in bridge mode without a device; [`Config::validate`]
    /// rejects that combination.
    pub fn serve_mode(&self) -> Option<ServeMode> {
        match self.server.mode {
            ServerMode::Command => Some(ServeMode::Command {
                keep_open: self.server.keep_open,
            }),
            ServerMode::Bridge => self
                .server
                .device
                .clone()
                .filter(|device| !device.is_empty())
                .map(|device| ServeMode::Bridge { device }),
        }
    }

    /// Options for a Reconnect Loop.
    pub fn reconnect_options(&self) -> ReconnectOptions {
        ReconnectOptions {
            host: self.client.host.clone(),
            port: self.client.port,
            connect_timeout: Duration::from_secs(self.client.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.client.read_timeout_secs),
            retry_backoff: Duration::from_secs(self.client.retry_backoff_secs),
            recv_buffer: self.transport.recv_buffer,
            protected: self.client.protected,
            link_interface: self
                .client
                .link_interface
                .clone()
                .filter(|interface| !interface.is_empty()),
        }
    }

    /// Options for the Serial Bridge.
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_secs(self.serial.read_timeout_secs),
        }
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var("REMOSERIAL_LOG_LEVEL");
        std::env::remove_var("REMOSERIAL_HOST");
        std::env::remove_var("REMOSERIAL_PORT");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 65001);
        assert_eq!(config.server.accept_timeout_secs, 60);
        assert_eq!(config.server.idle_limit, 10);
        assert_eq!(config.server.mode, ServerMode::Command);
        assert!(!config.server.keep_open);
        assert!(!config.server.protected);
        assert_eq!(config.client.host, "0.0.0.0");
        assert_eq!(config.client.connect_timeout_secs, 30);
        assert_eq!(config.client.retry_backoff_secs, 2);
        assert_eq!(config.client.link_interface.as_deref(), Some("eth0"));
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.transport.recv_buffer, 1024);
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[server]
port = 7000
protected = true

[client]
link_interface = "eth0"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.port, 7000);
        assert!(config.server.protected);
        assert_eq!(config.client.link_interface.as_deref(), Some("eth0"));
        // Other values should be defaults
        assert_eq!(config.server.idle_limit, 10);
        assert_eq!(config.client.port, 65001);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[general]
log_level = "trace"

[server]
bind_address = "127.0.0.1"
port = 6000
accept_timeout_secs = 5
read_timeout_ms = 250
idle_limit = 3
mode = "bridge"
keep_open = true
device = "/dev/ttyACM0"
protected = true

[client]
host = "10.8.0.1"
port = 6001
connect_timeout_secs = 7
read_timeout_secs = 8
retry_backoff_secs = 9
link_interface = "wlan0"
protected = true

[serial]
baud_rate = 115200
read_timeout_secs = 2

[transport]
recv_buffer = 4096
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.general.log_level, "trace");
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.mode, ServerMode::Bridge);
        assert_eq!(config.server.device.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.client.host, "10.8.0.1");
        assert_eq!(config.client.retry_backoff_secs, 9);
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.transport.recv_buffer, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[server
port = 1
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[server]
port = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_from_toml_unknown_mode() {
        let toml = r#"
[server]
mode = "tunnel"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let toml = r#"
[server]
port = 7001
flavour = "vanilla"

[extra]
key = 1
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 7001);
    }

    #[test]
    fn test_to_toml() {
        let toml = Config::default().to_toml().unwrap();

        assert!(toml.contains("[general]"));
        assert!(toml.contains("[server]"));
        assert!(toml.contains("[client]"));
        assert!(toml.contains("[serial]"));
        assert!(toml.contains("[transport]"));
        assert!(toml.contains("mode = \"command\""));
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.general.log_level = "warn".to_string();
        original.server.mode = ServerMode::Bridge;
        original.server.device = Some("/dev/ttyUSB1".to_string());
        original.client.link_interface = Some("eth1".to_string());

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.server.keep_open = true;
        original.serial.baud_rate = 19200;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_save_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir
            .path()
            .join("nested")
            .join("dirs")
            .join("config.toml");

        Config::default().save(&config_path).unwrap();

        assert!(config_path.exists());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "this is not [valid toml").unwrap();

        let err = Config::load(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("remoserial/config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        clear_env();
        std::env::set_var("REMOSERIAL_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.general.log_level, "debug");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_host_and_port() {
        clear_env();
        std::env::set_var("REMOSERIAL_HOST", "192.168.1.50");
        std::env::set_var("REMOSERIAL_PORT", "7100");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.client.host, "192.168.1.50");
        assert_eq!(config.client.port, 7100);
        assert_eq!(config.server.port, 7100);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("REMOSERIAL_HOST", "");
        std::env::set_var("REMOSERIAL_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_ignored() {
        clear_env();
        std::env::set_var("REMOSERIAL_PORT", "seventy");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.port, 65001);
        assert_eq!(config.client.port, 65001);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_default_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort(0)));

        let mut config = Config::default();
        config.client.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort(0)));
    }

    #[test]
    fn test_validate_idle_limit_bounds() {
        let mut config = Config::default();
        config.server.idle_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdleLimit(0)));

        config.server.idle_limit = 1001;
        assert_eq!(config.validate(), Err(ConfigError::InvalidIdleLimit(1001)));

        config.server.idle_limit = 1;
        assert!(config.validate().is_ok());

        config.server.idle_limit = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_recv_buffer_too_small() {
        let mut config = Config::default();
        config.transport.recv_buffer = 512;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRecvBuffer {
                got: 512,
                min: MIN_RECV_BUFFER
            })
        );
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.server.read_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("server.read_timeout_ms"))
        );

        let mut config = Config::default();
        config.client.connect_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("client.connect_timeout_secs"))
        );
    }

    #[test]
    fn test_validate_zero_backoff_allowed() {
        let mut config = Config::default();
        config.client.retry_backoff_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_baud_rate() {
        let mut config = Config::default();
        config.serial.baud_rate = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBaudRate));
    }

    #[test]
    fn test_validate_bridge_requires_device() {
        let mut config = Config::default();
        config.server.mode = ServerMode::Bridge;
        assert_eq!(config.validate(), Err(ConfigError::MissingBridgeDevice));

        config.server.device = Some(String::new());
        assert_eq!(config.validate(), Err(ConfigError::MissingBridgeDevice));

        config.server.device = Some("/dev/ttyUSB0".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.general.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.general.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listener_options_conversion() {
        let mut config = Config::default();
        config.server.read_timeout_ms = 250;
        config.server.protected = true;

        let options = config.listener_options();
        assert_eq!(options.bind_address, "0.0.0.0");
        assert_eq!(options.port, 65001);
        assert_eq!(options.accept_timeout, Duration::from_secs(60));
        assert_eq!(options.read_timeout, Duration::from_millis(250));
        assert_eq!(options.idle_limit, 10);
        assert_eq!(options.recv_buffer, 1024);
        assert!(options.protected);
    }

    #[test]
    fn test_serve_mode_conversion() {
        let mut config = Config::default();
        assert_eq!(
            config.serve_mode(),
            Some(ServeMode::Command { keep_open: false })
        );

        config.server.mode = ServerMode::Bridge;
        assert_eq!(config.serve_mode(), None);

        config.server.device = Some("/dev/ttyUSB0".to_string());
        assert_eq!(
            config.serve_mode(),
            Some(ServeMode::Bridge {
                device: "/dev/ttyUSB0".to_string()
            })
        );
    }

    #[test]
    fn test_reconnect_options_conversion() {
        let mut config = Config::default();
        config.client.host = "10.0.0.2".to_string();
        config.client.link_interface = Some("eth0".to_string());

        let options = config.reconnect_options();
        assert_eq!(options.host, "10.0.0.2");
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.read_timeout, Duration::from_secs(30));
        assert_eq!(options.retry_backoff, Duration::from_secs(2));
        assert_eq!(options.link_interface.as_deref(), Some("eth0"));
        assert!(!options.protected);
    }

    #[test]
    fn test_default_reconnect_options_check_link() {
        let options = Config::default().reconnect_options();
        assert_eq!(options.link_interface.as_deref(), Some("eth0"));
    }

    #[test]
    fn test_empty_link_interface_disables_check() {
        let config = Config::from_toml(
            r#"
[client]
link_interface = ""
"#,
        )
        .unwrap();

        assert_eq!(config.reconnect_options().link_interface, None);
    }

    #[test]
    fn test_bridge_options_conversion() {
        let options = Config::default().bridge_options();
        assert_eq!(options.baud_rate, 9600);
        assert_eq!(options.read_timeout, Duration::from_secs(10));
    }
}
