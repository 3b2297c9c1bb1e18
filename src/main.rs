//! Media purge - scheduled removal of stale media from Radarr/Sonarr.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_purge::cli::CliOptions;
use media_purge::config::Config;
use media_purge::db::Database;
use media_purge::jobs::{self, RemoveOldMedia};
use media_purge::services::{
    HttpClientFactory, RemoteRemover, SeriesMetadata, TmdbClient, UnconfiguredMetadata,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = CliOptions::from_args();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_purge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting media purge");

    if !config.database_url.starts_with("sqlite:")
        && let Some(parent) = Path::new(&config.database_url).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let db = Database::connect(&config.sqlite_url(), config.database_max_connections).await?;
    db.ensure_schema().await?;
    tracing::info!("Database ready");

    let metadata: Arc<dyn SeriesMetadata> = match &config.tmdb_api_key {
        Some(key) => Arc::new(TmdbClient::new(
            key.clone(),
            &config.tmdb_base_url,
            config.http_timeout,
        )?),
        None => {
            tracing::warn!("TMDB_API_KEY not set, series cannot be removed");
            Arc::new(UnconfiguredMetadata)
        }
    };

    let settings = Arc::new(db.settings());
    let remover = RemoteRemover::with_defaults(
        settings.clone(),
        Arc::new(HttpClientFactory::new(config.http_timeout)),
        metadata,
    );
    let job = Arc::new(RemoveOldMedia::new(Arc::new(db.media()), settings, remover));

    if cli.run_once {
        let summary = job.run().await?;
        tracing::info!(
            examined = summary.examined,
            removed = summary.removed,
            skipped = summary.skipped,
            "Single sweep complete"
        );
        return Ok(());
    }

    let schedule = cli.schedule_override.unwrap_or(config.schedule);
    let mut scheduler = jobs::start_scheduler(job.clone(), &schedule).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    job.cancel();
    scheduler.shutdown().await?;

    Ok(())
}
