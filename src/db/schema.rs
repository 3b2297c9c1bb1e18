//! Schema bootstrap for the SQLite catalog
//!
//! Creates missing tables only. Column renames or type changes are not
//! handled and require a fresh database.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};

const TABLES: &[(&str, &str)] = &[
    (
        "media",
        r#"CREATE TABLE media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            media_type TEXT NOT NULL CHECK (media_type IN ('movie', 'tv')),
            tmdb_id INTEGER NOT NULL,
            tvdb_id INTEGER,
            last_season_change TEXT NOT NULL,
            service_id INTEGER,
            service_url_4k TEXT,
            external_service_slug TEXT,
            external_service_slug_4k TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )"#,
    ),
    (
        "app_settings",
        r#"CREATE TABLE app_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            description TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )"#,
    ),
];

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create every table that is not present yet. Returns the names created.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<Vec<String>> {
    let mut created = Vec::new();

    for (table_name, create_sql) in TABLES {
        if table_exists(pool, table_name).await? {
            debug!(table = %table_name, "Table already exists");
            continue;
        }

        sqlx::query(create_sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create table {}", table_name))?;
        created.push(table_name.to_string());
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_media_last_season_change ON media (julianday(last_season_change))",
    )
        .execute(pool)
        .await
        .context("Failed to create media staleness index")?;

    if !created.is_empty() {
        info!(tables = ?created, "Created database tables");
    }

    Ok(created)
}
