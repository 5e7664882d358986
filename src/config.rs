use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanmarkConfig {
    #[serde(default)]
    pub registry: RegistryClientConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistryClientConfig {
    /// Base URL of the code registry API
    #[serde(default = "default_registry_base_url")]
    pub base_url: String,

    /// Request timeout in seconds for a single registry round-trip
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

impl RegistryClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    /// Capture device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_scanner_device_index")]
    pub device_index: u32,

    /// Frames per second requested from the capture device
    #[serde(default = "default_scanner_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Seed the dedup ledger from records already confirmed in the registry
    #[serde(default = "default_seed_confirmed")]
    pub seed_confirmed: bool,

    /// Bound on a single confirm round-trip; a timeout counts as a failure
    /// and the code is retried on its next detection
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
}

impl SessionConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Session event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ScanmarkConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("scanmark.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with SCANMARK_ prefix
            .add_source(Environment::with_prefix("SCANMARK").separator("_"))
            .build()?;

        let config: ScanmarkConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.base_url.is_empty() {
            return Err(ConfigError::Message(
                "Registry base_url must not be empty".to_string(),
            ));
        }

        if !self.registry.base_url.starts_with("http://")
            && !self.registry.base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(
                "Registry base_url must be an http(s) URL".to_string(),
            ));
        }

        if self.registry.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Registry timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.scanner.fps == 0 {
            return Err(ConfigError::Message(
                "Scanner fps must be greater than 0".to_string(),
            ));
        }

        if self.session.confirm_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Session confirm_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScanmarkConfig {
    fn default() -> Self {
        Self {
            registry: RegistryClientConfig::default(),
            scanner: ScannerConfig::default(),
            session: SessionConfig::default(),
            server: ServerConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_base_url(),
            timeout_secs: default_registry_timeout_secs(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device_index: default_scanner_device_index(),
            fps: default_scanner_fps(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed_confirmed: default_seed_confirmed(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

// Default value functions
fn default_registry_base_url() -> String {
    "http://127.0.0.1:8321".to_string()
}
fn default_registry_timeout_secs() -> u64 {
    30
}

fn default_scanner_device_index() -> u32 {
    0
}
fn default_scanner_fps() -> u32 {
    10
}

fn default_seed_confirmed() -> bool {
    true
}
fn default_confirm_timeout_secs() -> u64 {
    10
}

fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8321
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScanmarkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.timeout(), Duration::from_secs(30));
        assert_eq!(config.session.confirm_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = ScanmarkConfig::default();
        config.registry.base_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.registry.base_url = default_registry_base_url();
        config.scanner.fps = 0;
        assert!(config.validate().is_err());

        config.scanner.fps = 10;
        config.session.confirm_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.session.confirm_timeout_secs = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ScanmarkConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.server.port, default_server_port());
        assert!(config.session.seed_confirmed);
    }
}
