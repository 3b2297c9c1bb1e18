//! Application settings database operations
//!
//! Values are JSON documents keyed by name. The purge job reads the
//! configured Radarr/Sonarr instances and the retention span from here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use url::Url;

use crate::db::sqlite_helpers::{from_json, to_json};

/// Settings key holding the Radarr instance list
pub const RADARR_KEY: &str = "radarr";
/// Settings key holding the Sonarr instance list
pub const SONARR_KEY: &str = "sonarr";
/// Settings key holding the retention span in days
pub const REMOVAL_SPAN_KEY: &str = "remove_old_media.span_days";
/// Retention span used when none is stored
pub const DEFAULT_REMOVAL_SPAN_DAYS: i64 = 90;

/// A configured Radarr or Sonarr server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServarrSettings {
    pub id: i32,
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub api_key: String,
    #[serde(default)]
    pub use_ssl: bool,
    /// Path prefix when the server lives under a sub-path (e.g. `/radarr`)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Full server root replacing scheme/hostname/port/base_url
    #[serde(default)]
    pub url_override: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_4k: bool,
}

impl ServarrSettings {
    /// Root of the v3 API for this server
    pub fn api_url(&self) -> Result<Url> {
        let root = match self.url_override.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "{}://{}:{}{}",
                if self.use_ssl { "https" } else { "http" },
                self.hostname,
                self.port,
                self.base_url
                    .as_deref()
                    .unwrap_or_default()
                    .trim_end_matches('/'),
            ),
        };

        Url::parse(&format!("{}/api/v3", root))
            .with_context(|| format!("Invalid URL for server '{}': {}", self.name, root))
    }
}

/// Settings the purge sweep reads on every record
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// How long an entry may go unchanged before it is purged
    async fn removal_span(&self) -> Result<Duration>;

    async fn radarr_instances(&self) -> Result<Vec<ServarrSettings>>;

    async fn sonarr_instances(&self) -> Result<Vec<ServarrSettings>>;
}

/// A setting record in the database
#[derive(Debug, Clone)]
pub struct SettingRecord {
    pub key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SettingRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use crate::db::sqlite_helpers::str_to_datetime;
        use sqlx::Row;

        let value_str: String = row.try_get("value")?;
        let updated_str: String = row.try_get("updated_at")?;

        Ok(Self {
            key: row.try_get("key")?,
            value: from_json(&value_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
            description: row.try_get("description")?,
            updated_at: str_to_datetime(&updated_str).map_err(|e| sqlx::Error::Decode(e.into()))?,
        })
    }
}

/// Settings repository for database operations
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a setting by key
    pub async fn get(&self, key: &str) -> Result<Option<SettingRecord>> {
        let record =
            sqlx::query_as::<_, SettingRecord>("SELECT * FROM app_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Get a setting value as a specific type
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(r) => Ok(Some(
                serde_json::from_value(r.value)
                    .with_context(|| format!("Setting '{}' has an unexpected shape", key))?,
            )),
            None => Ok(None),
        }
    }

    /// Get a setting value with a default
    pub async fn get_or_default<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T> {
        match self.get_value(key).await? {
            Some(v) => Ok(v),
            None => Ok(default),
        }
    }

    /// Set a setting value
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json_value = to_json(value)?;

        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT (key) DO UPDATE SET
                value = ?2,
                updated_at = datetime('now')
            "#,
        )
        .bind(key)
        .bind(&json_value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store setting '{}'", key))?;

        Ok(())
    }
}

#[async_trait]
impl SettingsProvider for SettingsRepository {
    async fn removal_span(&self) -> Result<Duration> {
        let days: i64 = self
            .get_or_default(REMOVAL_SPAN_KEY, DEFAULT_REMOVAL_SPAN_DAYS)
            .await?;
        if days < 0 {
            anyhow::bail!("Setting '{}' must not be negative (got {})", REMOVAL_SPAN_KEY, days);
        }
        Duration::try_days(days)
            .with_context(|| format!("Setting '{}' is out of range (got {})", REMOVAL_SPAN_KEY, days))
    }

    async fn radarr_instances(&self) -> Result<Vec<ServarrSettings>> {
        self.get_or_default(RADARR_KEY, Vec::new()).await
    }

    async fn sonarr_instances(&self) -> Result<Vec<ServarrSettings>> {
        self.get_or_default(SONARR_KEY, Vec::new()).await
    }
}
