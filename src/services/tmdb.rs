//! TMDB (The Movie Database) API client for series metadata
//!
//! Used to resolve the TVDB id Sonarr keys its series by.
//! Base URL: https://api.themoviedb.org/3
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds.
//! This client uses rate limiting and retry logic to handle this gracefully.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::{RateLimitedClient, RetryConfig, StatusError, is_transient, retry_async};

/// Lookup of alternate identifiers for a series
#[async_trait]
pub trait SeriesMetadata: Send + Sync {
    /// TVDB id for the series with the given TMDB id, if TMDB knows one
    async fn alternate_id(&self, tmdb_id: i32) -> Result<Option<i32>>;
}

/// TV show details from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbTvShow {
    pub id: i32,
    pub name: String,
    pub original_name: Option<String>,
    pub first_air_date: Option<String>,
    pub status: Option<String>,
    /// Present when requested with `append_to_response=external_ids`
    pub external_ids: Option<TmdbExternalIds>,
}

/// External ids attached to a TMDB entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TmdbExternalIds {
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<i32>,
    pub tvrage_id: Option<i32>,
}

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

impl TmdbClient {
    /// Create a new TMDB client with the given API key
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::for_tmdb(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_config: RetryConfig {
                max_retries: 3,
                initial_interval: Duration::from_millis(500),
                max_interval: Duration::from_secs(10),
                multiplier: 2.0,
            },
        })
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Get TV show details (with external ids) by TMDB ID
    pub async fn get_tv_show(&self, tmdb_id: i32) -> Result<TmdbTvShow> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        debug!("Fetching TV show from TMDB (ID: {})", tmdb_id);

        let url = format!("{}/tv/{}", self.base_url, tmdb_id);
        let url = url.as_str();
        let api_key = self.api_key.as_str();
        let client = &self.client;

        retry_async(
            move || async move {
                let response = client
                    .get_with_query(
                        url,
                        &[("api_key", api_key), ("append_to_response", "external_ids")],
                    )
                    .await?;

                if !response.status().is_success() {
                    return Err(status_error(tmdb_id, response.status().as_u16()));
                }

                let show: TmdbTvShow = response
                    .json()
                    .await
                    .context("Failed to parse TMDB TV show")?;

                Ok(show)
            },
            &self.retry_config,
            "tmdb_get_tv_show",
            is_transient,
        )
        .await
    }
}

fn status_error(tmdb_id: i32, status: u16) -> anyhow::Error {
    let operation = if status == 401 {
        format!("tv show {} (API key rejected)", tmdb_id)
    } else {
        format!("tv show {}", tmdb_id)
    };

    StatusError {
        service: "tmdb".to_string(),
        operation,
        status,
    }
    .into()
}

#[async_trait]
impl SeriesMetadata for TmdbClient {
    async fn alternate_id(&self, tmdb_id: i32) -> Result<Option<i32>> {
        let show = self.get_tv_show(tmdb_id).await?;
        Ok(show.tvdb_id())
    }
}

impl TmdbTvShow {
    /// TVDB id, when TMDB has one on file
    pub fn tvdb_id(&self) -> Option<i32> {
        self.external_ids
            .as_ref()
            .and_then(|ids| ids.tvdb_id)
            .filter(|id| *id > 0)
    }
}

/// Metadata source used when no TMDB key is configured; every lookup fails
pub struct UnconfiguredMetadata;

#[async_trait]
impl SeriesMetadata for UnconfiguredMetadata {
    async fn alternate_id(&self, tmdb_id: i32) -> Result<Option<i32>> {
        anyhow::bail!("TMDB API key not configured, cannot look up series {}", tmdb_id)
    }
}
