/// Configuration management for the PLC ledger
use crate::error::{PlcError, PlcResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub db_location: PathBuf,
    pub max_connections: u32,
    pub enable_wal: bool,
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Run the periodic integrity audit
    pub enabled: bool,
    pub interval_secs: u64,
    /// DIDs verified per page
    pub batch_size: usize,
    pub health_interval_secs: u64,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> PlcResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> PlcResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_directory = PathBuf::from(
            lookup("PLC_DATA_DIRECTORY").unwrap_or_else(|| "./data".to_string()),
        );
        let db_location = lookup("PLC_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_directory.join("plc.sqlite"));
        let max_connections = parse_var(&lookup, "PLC_DB_MAX_CONNECTIONS", 10)?;
        let enable_wal = parse_var(&lookup, "PLC_DB_WAL", true)?;

        let audit_enabled = parse_var(&lookup, "PLC_AUDIT_ENABLED", true)?;
        let audit_interval = parse_var(&lookup, "PLC_AUDIT_INTERVAL_SECS", 3600)?;
        let audit_batch_size = parse_var(&lookup, "PLC_AUDIT_BATCH_SIZE", 500)?;
        let health_interval = parse_var(&lookup, "PLC_HEALTH_INTERVAL_SECS", 300)?;

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "plc_ledger=info".to_string());
        let log_format = match lookup("PLC_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(PlcError::Config(format!(
                    "PLC_LOG_FORMAT must be text or json, got {}",
                    other
                )))
            }
        };

        Ok(ServerConfig {
            storage: StorageConfig {
                data_directory,
                db_location,
                max_connections,
                enable_wal,
            },
            audit: AuditConfig {
                enabled: audit_enabled,
                interval_secs: audit_interval,
                batch_size: audit_batch_size,
                health_interval_secs: health_interval,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> PlcResult<()> {
        if self.storage.max_connections == 0 {
            return Err(PlcError::Config(
                "PLC_DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        if self.audit.interval_secs == 0 || self.audit.health_interval_secs == 0 {
            return Err(PlcError::Config(
                "Job intervals must be at least one second".to_string(),
            ));
        }

        if self.audit.batch_size == 0 {
            return Err(PlcError::Config(
                "PLC_AUDIT_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> PlcResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| PlcError::Config(format!("Invalid value for {}: {}", key, value))),
        None => Ok(default),
    }
}
