use std::env;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    /// Language used to render producer messages when the caller does not pick one.
    pub default_lang: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS (the app shell or a local dev server).
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `sqlite://path/to/file.db`, `sqlite::memory:` or `memory`.
    pub url: String,
    pub max_connections: u32,
    /// Key under which the whole notification collection is stored.
    pub key: String,
}

impl StorageConfig {
    pub fn is_memory(&self) -> bool {
        self.url.eq_ignore_ascii_case("memory")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Total tries for one snapshot write (first attempt included).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap for exponential backoff, in milliseconds.
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            storage: StorageConfig {
                url: env::var("STORAGE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env_or("STORAGE_MAX_CONNECTIONS", 5u32),
                key: env::var("STORAGE_KEY").unwrap_or_else(|_| "notifications".to_string()),
            },
            persistence: PersistenceConfig {
                max_attempts: env_or("PERSIST_MAX_ATTEMPTS", 5u32),
                initial_backoff_ms: env_or("PERSIST_INITIAL_BACKOFF_MS", 100u64),
                max_backoff_ms: env_or("PERSIST_MAX_BACKOFF_MS", 5000u64),
            },
            logging: LoggingConfig {
                json: env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            default_lang: env::var("DEFAULT_LANG")
                .map(|v| crate::i18n::normalize_language(&v))
                .unwrap_or_else(|_| crate::i18n::DEFAULT_LANG.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("STORAGE_KEY".to_string()));
        }
        if self.persistence.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("PERSIST_MAX_ATTEMPTS".to_string()));
        }
        if !crate::i18n::is_supported_language(&self.default_lang) {
            return Err(ConfigError::InvalidValue("DEFAULT_LANG".to_string()));
        }
        Ok(())
    }
}

/// Read and parse an env var, falling back to `default` when unset or unparsable.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            storage: StorageConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
                key: "notifications".to_string(),
            },
            persistence: PersistenceConfig {
                max_attempts: 5,
                initial_backoff_ms: 100,
                max_backoff_ms: 5000,
            },
            logging: LoggingConfig { json: false },
            default_lang: crate::i18n::DEFAULT_LANG.to_string(),
        }
    }
}
