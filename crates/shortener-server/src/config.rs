// ABOUTME: Configuration loading and validation for the shortener server.
// ABOUTME: Reads SHORTENER_* environment variables and picks the storage backend from them.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use shortener_core::DeletionConfig;
use shortener_store::BackendConfig;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SHORTENER_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ShortenerConfig {
    pub bind: SocketAddr,
    /// Prefix for generated short URLs, without a trailing slash.
    pub base_url: String,
    pub backend: BackendConfig,
    pub deletion: DeletionConfig,
}

impl ShortenerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - SHORTENER_BIND: socket address to bind (default: 127.0.0.1:8080)
    /// - SHORTENER_BASE_URL: prefix for short URLs (default: http://{bind})
    /// - SHORTENER_DATABASE_PATH: SQLite database file; selects the SQLite backend
    /// - SHORTENER_FILE_STORAGE_PATH: JSONL log file; selects the memory backend with a log
    /// - SHORTENER_DELETE_CONCURRENCY: max ownership checks in flight (default: 16)
    /// - SHORTENER_DELETE_TIMEOUT_MS: per-check deadline in milliseconds (default: 5000)
    ///
    /// With neither storage path set, records live in memory only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_str = var("SHORTENER_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let base_url = var("SHORTENER_BASE_URL")
            .unwrap_or_else(|| format!("http://{}", bind))
            .trim_end_matches('/')
            .to_string();

        let backend = if let Some(path) = var("SHORTENER_DATABASE_PATH") {
            BackendConfig::Sqlite {
                path: PathBuf::from(path),
            }
        } else if let Some(path) = var("SHORTENER_FILE_STORAGE_PATH") {
            BackendConfig::File {
                path: PathBuf::from(path),
            }
        } else {
            BackendConfig::Memory
        };

        let defaults = DeletionConfig::default();
        let max_concurrency = match var("SHORTENER_DELETE_CONCURRENCY") {
            Some(value) => parse_positive("SHORTENER_DELETE_CONCURRENCY", value)? as usize,
            None => defaults.max_concurrency,
        };
        let check_timeout = match var("SHORTENER_DELETE_TIMEOUT_MS") {
            Some(value) => {
                Duration::from_millis(parse_positive("SHORTENER_DELETE_TIMEOUT_MS", value)?)
            }
            None => defaults.check_timeout,
        };

        Ok(Self {
            bind,
            base_url,
            backend,
            deletion: DeletionConfig {
                max_concurrency,
                check_timeout,
            },
        })
    }
}

fn parse_positive(var: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber { var, value }),
    }
}
