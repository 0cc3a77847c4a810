//! Process configuration, read once at startup.

use std::env;

use devbook_observability::LogFormat;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Immutable application configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub secret_key: Vec<u8>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("API_PORT") {
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "API_PORT is not a valid port; using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let host = get("API_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let database_url = get("DATABASE_URL").or_else(|| {
            let user = get("DB_USER")?;
            let name = get("DB_NAME")?;
            let key = get("DB_KEY").unwrap_or_default();
            let db_host = get("DB_HOST").unwrap_or_else(|| "localhost".to_string());
            Some(format!("postgres://{user}:{key}@{db_host}/{name}"))
        });

        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "DB_MAX_CONNECTIONS",
                        reason: format!("'{raw}' is not a positive integer"),
                    });
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let secret_key = get("SECRET_KEY").map(String::into_bytes).unwrap_or_default();

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|e| ConfigError::Invalid {
                key: "LOG_FORMAT",
                reason: e.to_string(),
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            secret_key,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_secret(&self) -> bool {
        !self.secret_key.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            secret_key: Vec::new(),
            log_format: LogFormat::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("max_connections", &self.max_connections)
            .field("secret_key", &if self.has_secret() { "<set>" } else { "<empty>" })
            .field("log_format", &self.log_format)
            .finish()
    }
}
