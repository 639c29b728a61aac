/// Configuration management
use crate::error::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Access-core limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Largest number of user ids accepted in one bulk request
    pub bulk_max_targets: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AccessResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("ACCESS_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("ACCESS_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AccessError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("ACCESS_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("ACCESS_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("access.sqlite"));
        let max_connections = env::var("ACCESS_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let bulk_max_targets = env::var("ACCESS_BULK_MAX_TARGETS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("ACCESS_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                database,
                max_connections,
            },
            access: AccessConfig { bulk_max_targets },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AccessResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AccessError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.storage.max_connections == 0 {
            return Err(AccessError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.access.bulk_max_targets == 0 {
            return Err(AccessError::Validation(
                "Bulk target limit must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
