//! Sonarr v3 client

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::servarr::{ServarrApi, ServarrRemover};

/// Series as returned by `GET /api/v3/series`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarrSeries {
    pub id: i64,
    pub title: String,
    pub tvdb_id: i32,
    pub path: Option<String>,
}

/// Sonarr API client
pub struct SonarrClient {
    api: ServarrApi,
}

impl SonarrClient {
    pub fn new(api: ServarrApi) -> Self {
        Self { api }
    }

    /// Find the series Sonarr tracks for a TVDB id
    pub async fn get_series_by_tvdb_id(&self, tvdb_id: i32) -> Result<SonarrSeries> {
        let series: Vec<SonarrSeries> = self
            .api
            .get_json("series", &[("tvdbId", tvdb_id.to_string())], "series lookup")
            .await?;

        series
            .into_iter()
            .find(|s| s.tvdb_id == tvdb_id)
            .with_context(|| format!("Series with TVDB id {} not found in Sonarr", tvdb_id))
    }
}

#[async_trait]
impl ServarrRemover for SonarrClient {
    async fn remove_item(&self, tvdb_id: i32) -> Result<()> {
        let series = self.get_series_by_tvdb_id(tvdb_id).await?;

        self.api
            .delete(
                &format!("series/{}", series.id),
                &[
                    ("deleteFiles", "true".to_string()),
                    ("addImportListExclusion", "false".to_string()),
                ],
                "remove series",
            )
            .await
            .with_context(|| format!("Failed to remove series '{}' from Sonarr", series.title))?;

        info!(
            service = %self.api.service(),
            sonarr_id = series.id,
            tvdb_id = tvdb_id,
            title = %series.title,
            "Removed series"
        );
        Ok(())
    }
}
