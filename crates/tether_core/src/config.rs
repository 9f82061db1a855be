//! Runtime configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `TETHER_CONNECTION_NAME`, `TETHER_BRIDGE_LIBRARY`
//! 2. Config file passed to [`RuntimeConfig::load`]
//! 3. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! connection_name = "Tether"
//! host_version = "3.6.0"
//! connect_interval_ms = 50
//! connected_interval_ms = 8
//! bridge_library = "lib/libtether_bridge.so"
//! max_uv_layers = 4
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_interop::MAX_UV_LAYERS;

/// Configuration for a [`crate::Runtime`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Shared memory connection name
    pub connection_name: String,
    /// Host application version sent with the handshake
    pub host_version: String,
    /// Tick interval while waiting for a connection
    pub connect_interval_ms: u64,
    /// Tick interval while connected
    pub connected_interval_ms: u64,
    /// Bridge library to load, recording transport when unset
    pub bridge_library: Option<PathBuf>,
    /// UV layers to marshal per mesh
    pub max_uv_layers: usize,
    /// Inbound messages handled per tick
    pub max_messages_per_tick: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connection_name: "Tether".to_string(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
            connect_interval_ms: 50,
            connected_interval_ms: 8,
            bridge_library: None,
            max_uv_layers: MAX_UV_LAYERS,
            max_messages_per_tick: 32,
        }
    }
}

impl RuntimeConfig {
    /// Parse from TOML, filling missing keys with defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        log::info!("Loaded runtime config from {}", path.display());
        Ok(config)
    }

    /// Override fields from `TETHER_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("TETHER_CONNECTION_NAME") {
            if !name.is_empty() {
                log::info!("Connection name from env: {}", name);
                self.connection_name = name;
            }
        }

        if let Ok(library) = std::env::var("TETHER_BRIDGE_LIBRARY") {
            if !library.is_empty() {
                self.bridge_library = Some(PathBuf::from(library));
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "connection_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_uv_layers > MAX_UV_LAYERS {
            return Err(ConfigError::Invalid {
                field: "max_uv_layers",
                reason: format!("at most {} layers are supported", MAX_UV_LAYERS),
            });
        }
        if self.connected_interval_ms == 0 || self.connect_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "interval",
                reason: "tick intervals must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn connect_interval(&self) -> Duration {
        Duration::from_millis(self.connect_interval_ms)
    }

    pub fn connected_interval(&self) -> Duration {
        Duration::from_millis(self.connected_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.connection_name, "Tether");
        assert_eq!(config.connect_interval(), Duration::from_millis(50));
        assert_eq!(config.connected_interval(), Duration::from_millis(8));
        assert_eq!(config.max_uv_layers, 4);
    }

    #[test]
    fn test_partial_toml() {
        let config = RuntimeConfig::from_toml_str("connection_name = \"Studio\"\nmax_uv_layers = 2").unwrap();
        assert_eq!(config.connection_name, "Studio");
        assert_eq!(config.max_uv_layers, 2);
        assert_eq!(config.connected_interval_ms, 8);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("max_uv_layers = 9"),
            Err(ConfigError::Invalid { field: "max_uv_layers", .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str("connect_interval_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
