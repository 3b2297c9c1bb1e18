//! Database connection and operations

pub mod media;
pub mod schema;
pub mod settings;
pub mod sqlite_helpers;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub use media::{CreateMedia, MediaCatalog, MediaRecord, MediaRepository, MediaType};
pub use settings::{SettingsProvider, SettingsRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("Failed to open database at {}", url))?;

        Ok(Self { pool })
    }

    /// Get a media catalog repository
    pub fn media(&self) -> MediaRepository {
        MediaRepository::new(self.pool.clone())
    }

    /// Get a settings repository
    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    /// Create any missing tables, returning the names of those created
    pub async fn ensure_schema(&self) -> Result<Vec<String>> {
        schema::ensure_schema(&self.pool).await
    }
}
