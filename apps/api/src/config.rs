use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::models::plant::DEFAULT_ALL_TITLE;

const DEFAULT_PAGE_SIZE: u32 = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STORAGE_KEY: &str = "@plantmanager:plants";

/// Application configuration loaded from environment variables.
/// Fails at startup if the catalog URL is missing or a value does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_api_url: String,
    pub catalog_page_size: u32,
    pub catalog_timeout: Duration,
    /// Title of the synthetic `all` environment tag.
    pub catalog_all_title: String,
    pub storage: StorageBackend,
    /// The single key holding the serialized id -> plant mapping.
    pub storage_key: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let catalog_page_size = std::env::var("CATALOG_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse::<u32>()
            .context("CATALOG_PAGE_SIZE must be a positive integer")?;
        if catalog_page_size == 0 {
            bail!("CATALOG_PAGE_SIZE must be at least 1");
        }

        let timeout_secs = std::env::var("CATALOG_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .context("CATALOG_TIMEOUT_SECS must be a number of seconds")?;

        Ok(Config {
            catalog_api_url: require_env("CATALOG_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            catalog_page_size,
            catalog_timeout: Duration::from_secs(timeout_secs),
            catalog_all_title: std::env::var("CATALOG_ALL_TITLE")
                .unwrap_or_else(|_| DEFAULT_ALL_TITLE.to_string()),
            storage: StorageBackend::from_env()?,
            storage_key: std::env::var("STORAGE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Where adopted plants are persisted. Selected with `STORAGE_BACKEND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Nothing survives a restart.
    Memory,
    File(PathBuf),
    Redis(String),
}

impl StorageBackend {
    fn from_env() -> Result<Self> {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "file".to_string());
        match backend.as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File(
                std::env::var("STORAGE_DIR")
                    .unwrap_or_else(|_| "./data".to_string())
                    .into(),
            )),
            "redis" => Ok(StorageBackend::Redis(require_env("REDIS_URL")?)),
            other => bail!("STORAGE_BACKEND must be one of memory, file, redis (got '{other}')"),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
