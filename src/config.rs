use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the geovelocity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Event store configuration
    pub storage: StorageConfig,
    /// Geolocation database configuration
    pub geoip: GeoIpConfig,
    /// Detection rule configuration
    pub detection: DetectionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_address: String,
    /// Upper bound on the storage work of a single request, in milliseconds
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Event store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Event store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend holds login events
    pub backend: StorageBackend,
    /// Database file (sqlite backend)
    pub sqlite_path: Option<PathBuf>,
    /// Snapshot file loaded on start and written on shutdown (memory backend)
    pub snapshot_path: Option<PathBuf>,
}

/// Geolocation database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to the GeoLite2-City.mmdb database
    pub city_database: PathBuf,
    /// Path to a GeoIP2-Anonymous-IP.mmdb database, if licensed
    pub anonymous_database: Option<PathBuf>,
}

/// Detection rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Maximum plausible travel speed in km/h
    pub max_speed_kmh: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                bind_address: "0.0.0.0:3000".to_string(),
                request_timeout_ms: 5000,
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                sqlite_path: Some(PathBuf::from("events.db")),
                snapshot_path: None,
            },
            geoip: GeoIpConfig {
                city_database: PathBuf::from("GeoLite2-City.mmdb"),
                anonymous_database: None,
            },
            detection: DetectionConfig {
                max_speed_kmh: 900.0,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from `path` when it exists, fall back to defaults otherwise, then
    /// apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Config::from_file(path)?
        } else {
            log::warn!("Config file {} not found, using defaults", path.display());
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `GEOLITE_PATH`, `DB_PATH`, `MAX_SPEED` and
    /// `BIND_ADDRESS`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("GEOLITE_PATH") {
            self.geoip.city_database = PathBuf::from(path);
        }
        if let Some(path) = lookup("DB_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(path));
        }
        if let Some(speed) = lookup("MAX_SPEED") {
            self.detection.max_speed_kmh = speed
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MAX_SPEED is not a number: {}", speed)))?;
        }
        if let Some(address) = lookup("BIND_ADDRESS") {
            self.server.bind_address = address;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_speed = self.detection.max_speed_kmh;
        if !max_speed.is_finite() || max_speed <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_speed_kmh must be a positive number, got {}",
                max_speed
            )));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.sqlite_path.is_none() {
            return Err(ConfigError::Invalid(
                "sqlite backend requires sqlite_path".to_string(),
            ));
        }
        Ok(())
    }
}
