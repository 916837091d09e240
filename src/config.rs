//! Configuration loading and management.
//!
//! Structured TOML configuration for the scribed agent: listen ports, store
//! location, snapshot accounting and optional TLS material for the transport
//! layer.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Agent configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Listen ports.
    #[serde(default)]
    pub server: ServerConfig,
    /// Store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Merge-core tuning.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Optional TLS material handed to the transport.
    pub tls: Option<TlsConfig>,
}

/// Listen ports.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port the RPC transport binds.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// Port the Prometheus endpoint binds.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path; `:memory:` for tests.
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Merge-core tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Changes accumulated per document before a snapshot is taken.
    #[serde(default = "default_snapshot_threshold")]
    pub snapshot_threshold: u64,
}

/// TLS certificate material.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_file: String,
    /// PEM private key.
    pub key_file: String,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_port: default_rpc_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            snapshot_threshold: default_snapshot_threshold(),
        }
    }
}

fn default_rpc_port() -> u16 {
    11101
}

fn default_metrics_port() -> u16 {
    11102
}

fn default_database_path() -> String {
    "scribed.db".to_string()
}

fn default_snapshot_threshold() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.rpc_port, 11101);
        assert_eq!(config.server.metrics_port, 11102);
        assert_eq!(config.backend.snapshot_threshold, 10);
        assert_eq!(config.database.path, "scribed.db");
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            snapshot_threshold = 3

            [database]
            path = ":memory:"

            [tls]
            cert_file = "agent.crt"
            key_file = "agent.key"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.snapshot_threshold, 3);
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.tls.unwrap().cert_file, "agent.crt");
        assert_eq!(config.server.rpc_port, 11101);
    }
}
