// Configuration module for assetdb
// Process knobs come from environment variables with sensible defaults;
// connection parameters come from a YAML file or the environment.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Default number of chunks for batch inserts (ASSETDB_BATCH_COUNT)
    pub batch_count: usize,

    /// Busy timeout applied to every connection, in seconds (ASSETDB_BUSY_TIMEOUT_SECS)
    pub busy_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_count: 10,
            busy_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("ASSETDB_BATCH_COUNT") {
            match val.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.batch_count = parsed,
                _ => tracing::warn!(
                    "invalid ASSETDB_BATCH_COUNT value: {}, using default: {}",
                    val,
                    config.batch_count
                ),
            }
        }

        if let Ok(val) = env::var("ASSETDB_BUSY_TIMEOUT_SECS") {
            if let Ok(parsed) = val.parse() {
                config.busy_timeout_secs = parsed;
            } else {
                tracing::warn!(
                    "invalid ASSETDB_BUSY_TIMEOUT_SECS value: {}, using default: {}",
                    val,
                    config.busy_timeout_secs
                );
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

/// Parameters handed to the store's connect primitive.
///
/// The embedded store only reads `dbname` (a file path or `:memory:`); the
/// network fields are carried so one parameter file serves every deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: String,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl ConnectParams {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            dbname: path.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            dbname: ":memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml_ng::from_str(raw)
            .map_err(|err| DbError::Connection(format!("parse connection parameters: {err}")))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DbError::Connection(format!("read connection parameters {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// ASSETDB_HOST, ASSETDB_PORT, ASSETDB_DBNAME, ASSETDB_USER, ASSETDB_PASSWORD.
    pub fn from_env() -> Self {
        let port = env::var("ASSETDB_PORT").ok().and_then(|val| match val.parse() {
            Ok(port) => Some(port),
            Err(_) => {
                tracing::warn!("invalid ASSETDB_PORT value: {}, ignoring", val);
                None
            }
        });
        Self {
            host: env::var("ASSETDB_HOST").ok(),
            port,
            dbname: env::var("ASSETDB_DBNAME").unwrap_or_default(),
            user: env::var("ASSETDB_USER").ok(),
            password: env::var("ASSETDB_PASSWORD").ok(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.dbname == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.batch_count, 10);
        assert_eq!(config.busy_timeout_secs, 30);
    }

    #[test]
    fn connect_params_from_yaml() {
        let params = ConnectParams::from_yaml_str(
            "host: localhost\nport: 5432\ndbname: telemetry.sqlite\nuser: analyst\npassword: hunter2\n",
        )
        .unwrap();
        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.port, Some(5432));
        assert_eq!(params.dbname, "telemetry.sqlite");
        assert_eq!(params.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn password_is_never_serialized() {
        let params = ConnectParams {
            password: Some("secret".into()),
            ..ConnectParams::in_memory()
        };
        let rendered = serde_json::to_string(&params).unwrap();
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn malformed_yaml_is_a_connection_error() {
        let err = ConnectParams::from_yaml_str("port: [not a port").unwrap_err();
        assert!(matches!(err, DbError::Connection(_)));
    }
}
