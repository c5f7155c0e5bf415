//! Configuration module for the retail backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Default upper bound for a single changelog page.
pub const DEFAULT_SYNC_PAGE_LIMIT: i64 = 500;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to the product search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Maximum number of changes returned by one sync pull
    pub sync_page_limit: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("RETAIL_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("RETAIL_DB_PATH")
            .unwrap_or_else(|_| "./data/retail.sqlite".to_string())
            .into();

        let index_path = env::var("RETAIL_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr_raw =
            env::var("RETAIL_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_addr_raw.parse().map_err(|e| {
            AppError::Validation(format!(
                "Invalid RETAIL_BIND_ADDR '{}': {}",
                bind_addr_raw, e
            ))
        })?;

        let log_level = env::var("RETAIL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("RETAIL_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid RETAIL_LOG_FORMAT '{}': expected 'pretty' or 'json'",
                    raw
                ))
            })?,
            Err(_) => LogFormat::Pretty,
        };

        let sync_page_limit = match env::var("RETAIL_SYNC_PAGE_LIMIT") {
            Ok(raw) => match raw.parse::<i64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(AppError::Validation(format!(
                        "Invalid RETAIL_SYNC_PAGE_LIMIT '{}': expected a positive integer",
                        raw
                    )))
                }
            },
            Err(_) => DEFAULT_SYNC_PAGE_LIMIT,
        };

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            log_format,
            sync_page_limit,
        })
    }
}
