//! Media catalog repository
//!
//! The sweep only ever reads and deletes rows here; [MediaRepository::create]
//! exists for whatever fills the catalog (and for tests).

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::{datetime_to_str, str_to_datetime};

/// Kind of media a catalog entry tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(MediaType::Movie),
            "tv" => Some(MediaType::Tv),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media record from database
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub id: i64,
    pub media_type: MediaType,
    pub tmdb_id: i32,
    pub tvdb_id: Option<i32>,
    /// Staleness signal
    pub last_season_change: DateTime<Utc>,
    /// Instance the item was sent to; negative or NULL means "use the default"
    pub service_id: Option<i32>,
    /// Set when the item lives on a 4K instance
    pub service_url_4k: Option<String>,
    pub external_service_slug: Option<String>,
    pub external_service_slug_4k: Option<String>,
}

impl MediaRecord {
    /// Whether this entry is tracked by a 4K server
    pub fn is_4k(&self) -> bool {
        self.service_url_4k.is_some()
    }

    /// The external slug for this entry's variant
    pub fn variant_slug(&self) -> Option<&str> {
        if self.is_4k() {
            self.external_service_slug_4k.as_deref()
        } else {
            self.external_service_slug.as_deref()
        }
    }
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MediaRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let media_type_str: String = row.try_get("media_type")?;
        let changed_str: String = row.try_get("last_season_change")?;

        Ok(Self {
            id: row.try_get("id")?,
            media_type: MediaType::parse(&media_type_str).ok_or_else(|| {
                sqlx::Error::Decode(format!("unknown media type '{}'", media_type_str).into())
            })?,
            tmdb_id: row.try_get("tmdb_id")?,
            tvdb_id: row.try_get("tvdb_id")?,
            last_season_change: str_to_datetime(&changed_str)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            service_id: row.try_get("service_id")?,
            service_url_4k: row.try_get("service_url_4k")?,
            external_service_slug: row.try_get("external_service_slug")?,
            external_service_slug_4k: row.try_get("external_service_slug_4k")?,
        })
    }
}

/// Input for creating a media entry
#[derive(Debug, Clone)]
pub struct CreateMedia {
    pub media_type: MediaType,
    pub tmdb_id: i32,
    pub tvdb_id: Option<i32>,
    pub last_season_change: DateTime<Utc>,
    pub service_id: Option<i32>,
    pub service_url_4k: Option<String>,
    pub external_service_slug: Option<String>,
    pub external_service_slug_4k: Option<String>,
}

/// Catalog operations the purge sweep depends on
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Entries whose `last_season_change` is older than `cutoff`, in storage order
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<MediaRecord>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<MediaRecord>>;

    async fn delete(&self, record: &MediaRecord) -> Result<()>;
}

pub struct MediaRepository {
    pool: SqlitePool,
}

impl MediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a media entry
    pub async fn create(&self, input: CreateMedia) -> Result<MediaRecord> {
        let record = sqlx::query_as::<_, MediaRecord>(
            r#"
            INSERT INTO media (
                media_type, tmdb_id, tvdb_id, last_season_change, service_id,
                service_url_4k, external_service_slug, external_service_slug_4k
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(input.media_type.as_str())
        .bind(input.tmdb_id)
        .bind(input.tvdb_id)
        .bind(datetime_to_str(input.last_season_change))
        .bind(input.service_id)
        .bind(&input.service_url_4k)
        .bind(&input.external_service_slug)
        .bind(&input.external_service_slug_4k)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert media")?;

        Ok(record)
    }

    /// Count all catalog entries
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl MediaCatalog for MediaRepository {
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<MediaRecord>> {
        // Rows may carry any offset or SQLite's own datetime format
        let records = sqlx::query_as::<_, MediaRecord>(
            "SELECT * FROM media WHERE julianday(last_season_change) < julianday(?1) ORDER BY id",
        )
        .bind(datetime_to_str(cutoff))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query stale media")?;

        Ok(records)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MediaRecord>> {
        let record = sqlx::query_as::<_, MediaRecord>("SELECT * FROM media WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch media {}", id))?;

        Ok(record)
    }

    async fn delete(&self, record: &MediaRecord) -> Result<()> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?1")
            .bind(record.id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete media {}", record.id))?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Media {} was already gone", record.id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_database;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn movie(days_ago: i64) -> CreateMedia {
        CreateMedia {
            media_type: MediaType::Movie,
            tmdb_id: 603,
            tvdb_id: None,
            last_season_change: Utc::now() - Duration::days(days_ago),
            service_id: Some(0),
            service_url_4k: None,
            external_service_slug: Some("603".to_string()),
            external_service_slug_4k: None,
        }
    }

    #[test]
    fn test_media_type_strings() {
        assert_eq!(MediaType::parse("movie"), Some(MediaType::Movie));
        assert_eq!(MediaType::parse("tv"), Some(MediaType::Tv));
        assert_eq!(MediaType::parse("music"), None);
        assert_eq!(MediaType::Tv.to_string(), "tv");
    }

    #[test]
    fn test_variant_slug_follows_4k_url() {
        let mut record = MediaRecord {
            id: 1,
            media_type: MediaType::Movie,
            tmdb_id: 603,
            tvdb_id: None,
            last_season_change: Utc::now(),
            service_id: None,
            service_url_4k: None,
            external_service_slug: Some("603".to_string()),
            external_service_slug_4k: Some("604".to_string()),
        };
        assert!(!record.is_4k());
        assert_eq!(record.variant_slug(), Some("603"));

        record.service_url_4k = Some("http://radarr4k.local/movie/604".to_string());
        assert!(record.is_4k());
        assert_eq!(record.variant_slug(), Some("604"));
    }

    #[tokio::test]
    async fn test_find_stale_returns_only_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_database(&dir).await.media();

        let old = repo.create(movie(120)).await.unwrap();
        repo.create(movie(5)).await.unwrap();
        let older = repo.create(movie(400)).await.unwrap();

        let stale = repo.find_stale(Utc::now() - Duration::days(90)).await.unwrap();
        let ids: Vec<i64> = stale.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![old.id, older.id]);
        assert_eq!(stale[0].external_service_slug.as_deref(), Some("603"));
    }

    #[tokio::test]
    async fn test_find_stale_compares_times_not_text() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_database(&dir).await.media();

        let insert = |changed: String| {
            let pool = repo.pool.clone();
            async move {
                sqlx::query("INSERT INTO media (media_type, tmdb_id, last_season_change) VALUES ('movie', 603, ?1)")
                    .bind(changed)
                    .execute(&pool)
                    .await
                    .unwrap()
                    .last_insert_rowid()
            }
        };

        let now = Utc::now();
        let future_sqlite = (now + Duration::hours(1)).format("%Y-%m-%d %H:%M:%S").to_string();
        let past_sqlite = (now - Duration::days(200)).format("%Y-%m-%d %H:%M:%S").to_string();
        let future_offset = (now + Duration::hours(1))
            .with_timezone(&chrono::FixedOffset::east_opt(2 * 3600).unwrap())
            .to_rfc3339();
        let past_offset = (now - Duration::days(200))
            .with_timezone(&chrono::FixedOffset::west_opt(5 * 3600).unwrap())
            .to_rfc3339();

        insert(future_sqlite).await;
        let old_sqlite = insert(past_sqlite).await;
        insert(future_offset).await;
        let old_offset = insert(past_offset).await;

        let stale = repo.find_stale(now).await.unwrap();
        let ids: Vec<i64> = stale.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![old_sqlite, old_offset]);
        assert!(stale.iter().all(|r| r.last_season_change < now));
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = temp_database(&dir).await.media();

        let created = repo.create(movie(100)).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);

        repo.delete(&fetched).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 0);

        // A second delete reports the row is gone
        assert!(repo.delete(&fetched).await.is_err());
    }
}
