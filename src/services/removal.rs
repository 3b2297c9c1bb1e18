//! Remote removal of catalog entries from Radarr/Sonarr
//!
//! Each media type gets a [RemovalCapability]: which servers it can live on,
//! how its external id is derived, and which client deletes it.
//! [RemoteRemover] dispatches a record to the right one.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use crate::db::{MediaRecord, MediaType, SettingsProvider};
use crate::services::resolver;
use crate::services::servarr::{ServarrClientFactory, ServarrSettings};
use crate::services::tmdb::SeriesMetadata;

/// Faults raised while removing an entry from its server
#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("failed to load {service} settings: {source:#}")]
    Settings {
        service: &'static str,
        source: anyhow::Error,
    },

    #[error("failed to build {service} client for server '{server}': {source:#}")]
    ClientConstruction {
        service: &'static str,
        server: String,
        source: anyhow::Error,
    },

    #[error("media {media_id} has no usable external service slug (got {slug:?})")]
    InvalidSlug { media_id: i64, slug: Option<String> },

    #[error("series {media_id} (tmdb {tmdb_id}) has no TVDB id")]
    MissingIdentifier { media_id: i64, tmdb_id: i32 },

    #[error("metadata lookup for tmdb {tmdb_id} failed: {source:#}")]
    Metadata { tmdb_id: i32, source: anyhow::Error },

    #[error("{service} failed to remove item {external_id}: {source:#}")]
    Remote {
        service: &'static str,
        external_id: i32,
        source: anyhow::Error,
    },
}

/// What happened to a record on the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The server deleted the item
    Removed,
    /// No server is configured for the record; nothing was attempted
    Skipped,
}

/// Pick the identifier Sonarr should be asked about: the metadata-sourced id
/// when there is one, otherwise the stored id.
pub fn preferred_identifier(
    metadata_id: Option<i32>,
    stored_id: Option<i32>,
) -> Option<i32> {
    metadata_id.or(stored_id)
}

/// Per-media-type removal behaviour
#[async_trait]
pub trait RemovalCapability: Send + Sync {
    fn service(&self) -> &'static str;

    /// The server owning `record`, or `None` when none is configured
    async fn resolve_instance(
        &self,
        record: &MediaRecord,
    ) -> Result<Option<ServarrSettings>, RemovalError>;

    /// The id the server knows the record by
    async fn extract_identifier(&self, record: &MediaRecord) -> Result<i32, RemovalError>;

    /// Ask `server` to delete the item
    async fn invoke_removal(
        &self,
        server: &ServarrSettings,
        external_id: i32,
    ) -> Result<(), RemovalError>;
}

/// Movies live on Radarr and are keyed by their external slug
pub struct MovieRemoval {
    settings: Arc<dyn SettingsProvider>,
    clients: Arc<dyn ServarrClientFactory>,
}

impl MovieRemoval {
    pub fn new(settings: Arc<dyn SettingsProvider>, clients: Arc<dyn ServarrClientFactory>) -> Self {
        Self { settings, clients }
    }
}

#[async_trait]
impl RemovalCapability for MovieRemoval {
    fn service(&self) -> &'static str {
        "radarr"
    }

    async fn resolve_instance(
        &self,
        record: &MediaRecord,
    ) -> Result<Option<ServarrSettings>, RemovalError> {
        let servers = self
            .settings
            .radarr_instances()
            .await
            .map_err(|source| RemovalError::Settings {
                service: self.service(),
                source,
            })?;

        Ok(resolver::resolve(record, &servers).cloned())
    }

    async fn extract_identifier(&self, record: &MediaRecord) -> Result<i32, RemovalError> {
        let slug = record.variant_slug();
        slug.and_then(|s| s.trim().parse::<i32>().ok())
            .ok_or_else(|| RemovalError::InvalidSlug {
                media_id: record.id,
                slug: slug.map(str::to_string),
            })
    }

    async fn invoke_removal(
        &self,
        server: &ServarrSettings,
        external_id: i32,
    ) -> Result<(), RemovalError> {
        let client = self
            .clients
            .radarr(server)
            .map_err(|source| RemovalError::ClientConstruction {
                service: self.service(),
                server: server.name.clone(),
                source,
            })?;

        client
            .remove_item(external_id)
            .await
            .map_err(|source| RemovalError::Remote {
                service: self.service(),
                external_id,
                source,
            })
    }
}

/// Series live on Sonarr and are keyed by TVDB id
pub struct SeriesRemoval {
    settings: Arc<dyn SettingsProvider>,
    clients: Arc<dyn ServarrClientFactory>,
    metadata: Arc<dyn SeriesMetadata>,
}

impl SeriesRemoval {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        clients: Arc<dyn ServarrClientFactory>,
        metadata: Arc<dyn SeriesMetadata>,
    ) -> Self {
        Self {
            settings,
            clients,
            metadata,
        }
    }
}

#[async_trait]
impl RemovalCapability for SeriesRemoval {
    fn service(&self) -> &'static str {
        "sonarr"
    }

    async fn resolve_instance(
        &self,
        record: &MediaRecord,
    ) -> Result<Option<ServarrSettings>, RemovalError> {
        let servers = self
            .settings
            .sonarr_instances()
            .await
            .map_err(|source| RemovalError::Settings {
                service: self.service(),
                source,
            })?;

        Ok(resolver::resolve(record, &servers).cloned())
    }

    async fn extract_identifier(&self, record: &MediaRecord) -> Result<i32, RemovalError> {
        let metadata_id = self
            .metadata
            .alternate_id(record.tmdb_id)
            .await
            .map_err(|source| RemovalError::Metadata {
                tmdb_id: record.tmdb_id,
                source,
            })?;

        debug!(
            media_id = record.id,
            metadata_tvdb_id = ?metadata_id,
            stored_tvdb_id = ?record.tvdb_id,
            "Resolved series identifiers"
        );

        preferred_identifier(metadata_id, record.tvdb_id).ok_or(RemovalError::MissingIdentifier {
            media_id: record.id,
            tmdb_id: record.tmdb_id,
        })
    }

    async fn invoke_removal(
        &self,
        server: &ServarrSettings,
        external_id: i32,
    ) -> Result<(), RemovalError> {
        let client = self
            .clients
            .sonarr(server)
            .map_err(|source| RemovalError::ClientConstruction {
                service: self.service(),
                server: server.name.clone(),
                source,
            })?;

        client
            .remove_item(external_id)
            .await
            .map_err(|source| RemovalError::Remote {
                service: self.service(),
                external_id,
                source,
            })
    }
}

/// Removes catalog entries from whichever server holds them
pub struct RemoteRemover {
    movies: Box<dyn RemovalCapability>,
    series: Box<dyn RemovalCapability>,
}

impl RemoteRemover {
    pub fn new(movies: Box<dyn RemovalCapability>, series: Box<dyn RemovalCapability>) -> Self {
        Self { movies, series }
    }

    /// Wire up the Radarr and Sonarr capabilities over shared collaborators
    pub fn with_defaults(
        settings: Arc<dyn SettingsProvider>,
        clients: Arc<dyn ServarrClientFactory>,
        metadata: Arc<dyn SeriesMetadata>,
    ) -> Self {
        Self::new(
            Box::new(MovieRemoval::new(settings.clone(), clients.clone())),
            Box::new(SeriesRemoval::new(settings, clients, metadata)),
        )
    }

    fn capability(&self, media_type: MediaType) -> &dyn RemovalCapability {
        match media_type {
            MediaType::Movie => self.movies.as_ref(),
            MediaType::Tv => self.series.as_ref(),
        }
    }

    /// Delete `record` from its server. Returns [RemovalOutcome::Skipped]
    /// without touching anything when no server is configured for it.
    pub async fn remove_remote(&self, record: &MediaRecord) -> Result<RemovalOutcome, RemovalError> {
        let capability = self.capability(record.media_type);

        let result = async {
            let Some(server) = capability.resolve_instance(record).await? else {
                return Ok(RemovalOutcome::Skipped);
            };

            let external_id = capability.extract_identifier(record).await?;

            debug!(
                media_id = record.id,
                media_type = %record.media_type,
                server = %server.name,
                external_id = external_id,
                "Removing media from {}",
                capability.service()
            );

            capability.invoke_removal(&server, external_id).await?;
            Ok(RemovalOutcome::Removed)
        }
        .await;

        if let Err(e) = &result {
            error!(
                media_id = record.id,
                media_type = %record.media_type,
                error = %e,
                "Failed to remove media from {}",
                capability.service()
            );
        }

        result
    }
}
