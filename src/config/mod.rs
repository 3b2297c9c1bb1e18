//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default cron expression for the purge job (daily at 5 AM)
pub const DEFAULT_SCHEDULE: &str = "0 0 5 * * *";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path or `sqlite://` URL
    pub database_url: String,

    /// Maximum connections in the SQLite pool
    pub database_max_connections: u32,

    /// TMDB API key, used to resolve TVDB ids for series
    pub tmdb_api_key: Option<String>,

    /// TMDB API root
    pub tmdb_base_url: String,

    /// Cron expression (with seconds) for the purge job
    pub schedule: String,

    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/media-purge.db".to_string());

        Ok(Self {
            database_url,

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,

            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.is_empty()),

            tmdb_base_url: env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),

            schedule: env::var("REMOVE_OLD_MEDIA_SCHEDULE")
                .unwrap_or_else(|_| DEFAULT_SCHEDULE.to_string()),

            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid HTTP_TIMEOUT_SECS")?,
            ),
        })
    }

    /// Connection string suitable for `SqlitePoolOptions::connect`
    pub fn sqlite_url(&self) -> String {
        if self.database_url.starts_with("sqlite:") {
            self.database_url.clone()
        } else {
            format!("sqlite://{}?mode=rwc", self.database_url)
        }
    }
}
