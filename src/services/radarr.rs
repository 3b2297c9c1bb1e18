//! Radarr v3 client
//!
//! Only the calls the purge job needs: look a movie up by TMDB id and
//! delete it together with its files.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::servarr::{ServarrApi, ServarrRemover};

/// Movie as returned by `GET /api/v3/movie`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarrMovie {
    pub id: i64,
    pub title: String,
    pub tmdb_id: i32,
    #[serde(default)]
    pub has_file: bool,
    pub path: Option<String>,
}

/// Radarr API client
pub struct RadarrClient {
    api: ServarrApi,
}

impl RadarrClient {
    pub fn new(api: ServarrApi) -> Self {
        Self { api }
    }

    /// Find the movie Radarr tracks for a TMDB id
    pub async fn get_movie_by_tmdb_id(&self, tmdb_id: i32) -> Result<RadarrMovie> {
        let movies: Vec<RadarrMovie> = self
            .api
            .get_json("movie", &[("tmdbId", tmdb_id.to_string())], "movie lookup")
            .await?;

        movies
            .into_iter()
            .find(|m| m.tmdb_id == tmdb_id)
            .with_context(|| format!("Movie with TMDB id {} not found in Radarr", tmdb_id))
    }
}

#[async_trait]
impl ServarrRemover for RadarrClient {
    async fn remove_item(&self, tmdb_id: i32) -> Result<()> {
        let movie = self.get_movie_by_tmdb_id(tmdb_id).await?;

        self.api
            .delete(
                &format!("movie/{}", movie.id),
                &[
                    ("deleteFiles", "true".to_string()),
                    ("addImportExclusion", "false".to_string()),
                ],
                "remove movie",
            )
            .await
            .with_context(|| format!("Failed to remove movie '{}' from Radarr", movie.title))?;

        info!(
            service = %self.api.service(),
            radarr_id = movie.id,
            tmdb_id = tmdb_id,
            title = %movie.title,
            "Removed movie"
        );
        Ok(())
    }
}
