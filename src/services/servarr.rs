//! Shared plumbing for the Radarr/Sonarr v3 APIs
//!
//! Both servers authenticate with an `X-Api-Key` header and expose the same
//! lookup-then-delete shape, so the HTTP details live here and the
//! per-service clients only describe their endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::radarr::RadarrClient;
use super::rate_limiter::{RateLimitedClient, RetryConfig, StatusError, is_transient, retry_async};
use super::sonarr::SonarrClient;

pub use crate::db::settings::ServarrSettings;

/// A downstream server that can delete an item (and its files) by external id
#[async_trait]
pub trait ServarrRemover: Send + Sync {
    /// Remove the item identified by `external_id` (TMDB id for Radarr,
    /// TVDB id for Sonarr) together with its files
    async fn remove_item(&self, external_id: i32) -> Result<()>;
}

/// Builds clients bound to a configured server
pub trait ServarrClientFactory: Send + Sync {
    fn radarr(&self, settings: &ServarrSettings) -> Result<Box<dyn ServarrRemover>>;

    fn sonarr(&self, settings: &ServarrSettings) -> Result<Box<dyn ServarrRemover>>;
}

/// Factory producing real HTTP clients
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
    retry_config: RetryConfig,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retry_config: RetryConfig {
                max_retries: 3,
                initial_interval: Duration::from_millis(500),
                max_interval: Duration::from_secs(10),
                multiplier: 2.0,
            },
        }
    }
}

impl ServarrClientFactory for HttpClientFactory {
    fn radarr(&self, settings: &ServarrSettings) -> Result<Box<dyn ServarrRemover>> {
        let api = ServarrApi::new("radarr", settings, self.timeout, self.retry_config.clone())?;
        Ok(Box::new(RadarrClient::new(api)))
    }

    fn sonarr(&self, settings: &ServarrSettings) -> Result<Box<dyn ServarrRemover>> {
        let api = ServarrApi::new("sonarr", settings, self.timeout, self.retry_config.clone())?;
        Ok(Box::new(SonarrClient::new(api)))
    }
}

/// Authenticated, rate-limited access to one server's v3 API
pub struct ServarrApi {
    service: &'static str,
    api_url: String,
    api_key: String,
    client: RateLimitedClient,
    retry_config: RetryConfig,
}

impl ServarrApi {
    pub fn new(
        service: &'static str,
        settings: &ServarrSettings,
        timeout: Duration,
        retry_config: RetryConfig,
    ) -> Result<Self> {
        if settings.api_key.is_empty() {
            anyhow::bail!("{} server '{}' has no API key", service, settings.name);
        }

        let api_url = settings.api_url()?;
        let client = RateLimitedClient::for_servarr(service, timeout)?;

        Ok(Self {
            service,
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
            retry_config,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        query: &[(&str, String)],
        operation: &str,
    ) -> Result<T> {
        let url = self.endpoint(path);
        let url = url.as_str();
        let operation_name = format!("{}_{}", self.service, operation.replace(' ', "_"));

        retry_async(
            move || async move {
                let response = self
                    .client
                    .get_with_headers_and_query(url, &[("X-Api-Key", self.api_key.as_str())], query)
                    .await?;

                if !response.status().is_success() {
                    return Err(self.status_error(response.status().as_u16(), operation));
                }

                response
                    .json::<T>()
                    .await
                    .with_context(|| format!("Failed to parse {} response for {}", self.service, operation))
            },
            &self.retry_config,
            &operation_name,
            is_transient,
        )
        .await
    }

    /// DELETE a resource
    pub async fn delete(&self, path: &str, query: &[(&str, String)], operation: &str) -> Result<()> {
        let url = self.endpoint(path);
        let url = url.as_str();
        let operation_name = format!("{}_{}", self.service, operation.replace(' ', "_"));

        retry_async(
            move || async move {
                let response = self
                    .client
                    .delete_with_headers_and_query(url, &[("X-Api-Key", self.api_key.as_str())], query)
                    .await?;

                if !response.status().is_success() {
                    return Err(self.status_error(response.status().as_u16(), operation));
                }

                debug!(service = %self.service, url = %url, "Delete accepted");
                Ok(())
            },
            &self.retry_config,
            &operation_name,
            is_transient,
        )
        .await
    }

    fn status_error(&self, status: u16, operation: &str) -> anyhow::Error {
        StatusError {
            service: self.service.to_string(),
            operation: operation.to_string(),
            status,
        }
        .into()
    }
}
