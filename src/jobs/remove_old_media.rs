//! Remove old media job
//!
//! Finds catalog entries that have not changed within the configured span,
//! deletes them (with their files) from Radarr/Sonarr and then drops them
//! from the catalog. Records are handled one at a time and the first fault
//! stops the sweep; whatever is left gets picked up on the next run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::db::{MediaCatalog, MediaRecord, SettingsProvider};
use crate::services::{RemoteRemover, RemovalOutcome};

/// Snapshot of the job state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub running: bool,
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Records taken through remote removal
    pub examined: usize,
    /// Records removed remotely and from the catalog
    pub removed: usize,
    /// Records left alone because no server is configured for them
    pub skipped: usize,
}

pub struct RemoveOldMedia {
    catalog: Arc<dyn MediaCatalog>,
    settings: Arc<dyn SettingsProvider>,
    remover: RemoteRemover,
    running: AtomicBool,
    sweep_lock: Mutex<()>,
}

impl RemoveOldMedia {
    pub fn new(
        catalog: Arc<dyn MediaCatalog>,
        settings: Arc<dyn SettingsProvider>,
        remover: RemoteRemover,
    ) -> Self {
        Self {
            catalog,
            settings,
            remover,
            running: AtomicBool::new(false),
            sweep_lock: Mutex::new(()),
        }
    }

    /// Run one sweep.
    ///
    /// A call made while another sweep is in flight returns an empty summary
    /// without doing anything.
    pub async fn run(&self) -> Result<SweepSummary> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            warn!("Remove old media sweep already in progress, ignoring run request");
            return Ok(SweepSummary::default());
        };

        self.running.store(true, Ordering::SeqCst);
        info!("Starting remove old media sweep");

        let result = self.sweep().await;
        self.running.store(false, Ordering::SeqCst);

        match &result {
            Ok(summary) => info!(
                examined = summary.examined,
                removed = summary.removed,
                skipped = summary.skipped,
                "Remove old media sweep finished"
            ),
            Err(e) => error!(error = %format!("{:#}", e), "Remove old media sweep aborted"),
        }

        result
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            running: self.running.load(Ordering::SeqCst),
        }
    }

    /// Ask the sweep to stop before its next record. The record being
    /// processed, if any, still finishes.
    pub fn cancel(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Remove old media sweep cancellation requested");
        }
    }

    async fn sweep(&self) -> Result<SweepSummary> {
        let span = self
            .settings
            .removal_span()
            .await
            .context("Failed to read removal span")?;
        let cutoff = Utc::now()
            .checked_sub_signed(span)
            .with_context(|| {
                format!(
                    "Removal span of {} days reaches past the earliest date",
                    span.num_days()
                )
            })?;

        let stale = self.catalog.find_stale(cutoff).await?;
        info!(
            count = stale.len(),
            cutoff = %cutoff.to_rfc3339(),
            "Found media not changed within {} days",
            span.num_days()
        );

        let mut summary = SweepSummary::default();
        let total = stale.len();

        for record in stale {
            if !self.running.load(Ordering::SeqCst) {
                warn!(
                    remaining = total - summary.examined,
                    "Remove old media sweep cancelled"
                );
                break;
            }

            summary.examined += 1;

            let outcome = self.remover.remove_remote(&record).await.with_context(|| {
                format!(
                    "Failed to remove {} {} from its server",
                    record.media_type, record.id
                )
            })?;

            match outcome {
                RemovalOutcome::Skipped => summary.skipped += 1,
                RemovalOutcome::Removed => {
                    self.delete_from_catalog(&record).await?;
                    summary.removed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn delete_from_catalog(&self, record: &MediaRecord) -> Result<()> {
        let result = async {
            let current = self
                .catalog
                .get_by_id(record.id)
                .await?
                .with_context(|| format!("Media {} no longer exists in the catalog", record.id))?;

            self.catalog.delete(&current).await
        }
        .await;

        match &result {
            Ok(()) => info!(
                media_id = record.id,
                media_type = %record.media_type,
                tmdb_id = record.tmdb_id,
                "Removed media from catalog"
            ),
            Err(e) => error!(
                media_id = record.id,
                media_type = %record.media_type,
                error = %format!("{:#}", e),
                "Failed to remove media from catalog"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::test_support::temp_database;
    use crate::db::settings::REMOVAL_SPAN_KEY;
    use crate::db::{CreateMedia, MediaRepository, MediaType};
    use crate::services::ServarrSettings;
    use crate::services::removal::fakes::*;

    fn removal_settings() -> Arc<FakeSettings> {
        Arc::new(FakeSettings {
            radarr: vec![server(0, true, false)],
            sonarr: vec![server(10, true, false)],
            span_days: 90,
        })
    }

    fn job(
        catalog: Arc<dyn MediaCatalog>,
        settings: Arc<dyn SettingsProvider>,
        clients: Arc<FakeClients>,
        metadata: FakeMetadata,
    ) -> RemoveOldMedia {
        let remover = RemoteRemover::with_defaults(settings.clone(), clients, Arc::new(metadata));
        RemoveOldMedia::new(catalog, settings, remover)
    }

    fn stale_movie(slug: &str) -> CreateMedia {
        CreateMedia {
            media_type: MediaType::Movie,
            tmdb_id: slug.parse().unwrap(),
            tvdb_id: None,
            last_season_change: Utc::now() - Duration::days(200),
            service_id: None,
            service_url_4k: None,
            external_service_slug: Some(slug.to_string()),
            external_service_slug_4k: None,
        }
    }

    fn stale_series(tmdb_id: i32, tvdb_id: Option<i32>) -> CreateMedia {
        CreateMedia {
            media_type: MediaType::Tv,
            tmdb_id,
            tvdb_id,
            last_season_change: Utc::now() - Duration::days(200),
            service_id: None,
            service_url_4k: None,
            external_service_slug: None,
            external_service_slug_4k: None,
        }
    }

    /// Catalog whose stale query parks until the test releases it
    struct GatedCatalog {
        records: Vec<MediaRecord>,
        entered: Arc<Notify>,
        release: Arc<Notify>,
        deleted: std::sync::Mutex<Vec<i64>>,
    }

    impl GatedCatalog {
        fn new(records: Vec<MediaRecord>) -> Self {
            Self {
                records,
                entered: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
                deleted: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaCatalog for GatedCatalog {
        async fn find_stale(&self, _cutoff: DateTime<Utc>) -> Result<Vec<MediaRecord>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(self.records.clone())
        }

        async fn get_by_id(&self, id: i64) -> Result<Option<MediaRecord>> {
            Ok(self.records.iter().find(|r| r.id == id).cloned())
        }

        async fn delete(&self, record: &MediaRecord) -> Result<()> {
            self.deleted.lock().unwrap().push(record.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_media_only() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        let repo = db.media();

        repo.create(stale_movie("553")).await.unwrap();
        repo.create(stale_series(1399, Some(121361))).await.unwrap();
        let mut fresh = stale_movie("554");
        fresh.last_season_change = Utc::now() - Duration::days(10);
        let fresh = repo.create(fresh).await.unwrap();

        let clients = Arc::new(FakeClients::default());
        let job = job(
            Arc::new(db.media()),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        );

        let summary = job.run().await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                examined: 2,
                removed: 2,
                skipped: 0
            }
        );
        assert_eq!(
            clients.calls(),
            vec![("radarr", 0, 553), ("sonarr", 10, 121361)]
        );
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_by_id(fresh.id).await.unwrap().is_some());
        assert!(!job.status().running);
    }

    #[tokio::test]
    async fn test_out_of_range_span_fails_and_clears_running() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        db.media().create(stale_movie("553")).await.unwrap();

        let settings = Arc::new(db.settings());
        settings.set(REMOVAL_SPAN_KEY, &200_000_000i64).await.unwrap();

        let clients = Arc::new(FakeClients::default());
        let job = job(
            Arc::new(db.media()),
            settings.clone(),
            clients.clone(),
            FakeMetadata::default(),
        );

        assert!(job.run().await.is_err());
        assert!(!job.status().running);

        settings.set(REMOVAL_SPAN_KEY, &i64::MAX).await.unwrap();
        assert!(job.run().await.is_err());
        assert!(!job.status().running);

        assert!(clients.calls().is_empty());
        assert_eq!(db.media().count().await.unwrap(), 1);
    }

    /// Moves the default Radarr server from 0 to 5 after the first lookup
    struct SwitchingSettings {
        radarr_calls: AtomicUsize,
    }

    #[async_trait]
    impl SettingsProvider for SwitchingSettings {
        async fn removal_span(&self) -> Result<Duration> {
            Ok(Duration::days(90))
        }

        async fn radarr_instances(&self) -> Result<Vec<ServarrSettings>> {
            let first = self.radarr_calls.fetch_add(1, Ordering::SeqCst) == 0;
            Ok(vec![server(0, first, false), server(5, !first, false)])
        }

        async fn sonarr_instances(&self) -> Result<Vec<ServarrSettings>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_settings_reread_for_each_record() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        let repo = db.media();
        repo.create(stale_movie("553")).await.unwrap();
        repo.create(stale_movie("554")).await.unwrap();

        let settings = Arc::new(SwitchingSettings {
            radarr_calls: AtomicUsize::new(0),
        });
        let clients = Arc::new(FakeClients::default());
        let job = job(
            Arc::new(db.media()),
            settings.clone(),
            clients.clone(),
            FakeMetadata::default(),
        );

        let summary = job.run().await.unwrap();
        assert_eq!(summary.removed, 2);
        assert_eq!(clients.calls(), vec![("radarr", 0, 553), ("radarr", 5, 554)]);
        assert_eq!(settings.radarr_calls.load(Ordering::SeqCst), 2);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fault_aborts_remaining_records() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        let repo = db.media();

        let a = repo.create(stale_movie("553")).await.unwrap();
        let b = repo.create(stale_movie("554")).await.unwrap();
        let c = repo.create(stale_movie("555")).await.unwrap();

        let clients = Arc::new(FakeClients {
            failing_ids: vec![554],
            ..Default::default()
        });
        let job = job(
            Arc::new(db.media()),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        );

        let err = job.run().await.unwrap_err();
        assert_matches!(
            err.downcast_ref::<crate::services::RemovalError>(),
            Some(crate::services::RemovalError::Remote { external_id: 554, .. })
        );

        assert_eq!(clients.calls(), vec![("radarr", 0, 553), ("radarr", 0, 554)]);
        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
        assert!(repo.get_by_id(b.id).await.unwrap().is_some());
        assert!(repo.get_by_id(c.id).await.unwrap().is_some());
        assert!(!job.status().running);
    }

    #[tokio::test]
    async fn test_missing_identifier_keeps_catalog_entry() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        let repo = db.media();

        let orphan = repo.create(stale_series(1399, None)).await.unwrap();

        let clients = Arc::new(FakeClients::default());
        let job = job(
            Arc::new(db.media()),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        );

        assert!(job.run().await.is_err());
        assert!(clients.calls().is_empty());
        assert!(repo.get_by_id(orphan.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unresolved_server_skips_and_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        let repo = db.media();

        let mut uhd = stale_movie("553");
        uhd.service_url_4k = Some("http://radarr4k/movie/553".to_string());
        uhd.external_service_slug_4k = Some("553".to_string());
        let uhd = repo.create(uhd).await.unwrap();
        let standard = repo.create(stale_movie("554")).await.unwrap();

        let clients = Arc::new(FakeClients::default());
        let job = job(
            Arc::new(db.media()),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        );

        let summary = job.run().await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                examined: 2,
                removed: 1,
                skipped: 1
            }
        );
        assert_eq!(clients.calls(), vec![("radarr", 0, 554)]);
        assert!(repo.get_by_id(uhd.id).await.unwrap().is_some());
        assert!(repo.get_by_id(standard.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_metadata_id_used_during_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_database(&dir).await;
        let repo: MediaRepository = db.media();
        repo.create(stale_series(1399, Some(121361))).await.unwrap();

        let clients = Arc::new(FakeClients::default());
        let metadata = FakeMetadata {
            tvdb_ids: HashMap::from([(1399, 79488)]),
            ..Default::default()
        };
        let job = job(Arc::new(db.media()), removal_settings(), clients.clone(), metadata);

        job.run().await.unwrap();
        assert_eq!(clients.calls(), vec![("sonarr", 10, 79488)]);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_reports_running_during_sweep() {
        let catalog = Arc::new(GatedCatalog::new(vec![movie(1, "553")]));
        let job = Arc::new(job(
            catalog.clone(),
            removal_settings(),
            Arc::new(FakeClients::default()),
            FakeMetadata::default(),
        ));
        assert!(!job.status().running);

        let handle = tokio::spawn({
            let job = job.clone();
            async move { job.run().await }
        });

        catalog.entered.notified().await;
        assert!(job.status().running);

        catalog.release.notify_one();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.removed, 1);
        assert!(!job.status().running);
        assert_eq!(*catalog.deleted.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_ignored() {
        let catalog = Arc::new(GatedCatalog::new(vec![movie(1, "553")]));
        let clients = Arc::new(FakeClients::default());
        let job = Arc::new(job(
            catalog.clone(),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        ));

        let handle = tokio::spawn({
            let job = job.clone();
            async move { job.run().await }
        });
        catalog.entered.notified().await;

        let second = job.run().await.unwrap();
        assert_eq!(second, SweepSummary::default());
        assert!(job.status().running);

        catalog.release.notify_one();
        handle.await.unwrap().unwrap();
        assert_eq!(clients.calls(), vec![("radarr", 0, 553)]);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_record() {
        let catalog = Arc::new(GatedCatalog::new(vec![movie(1, "553"), movie(2, "554")]));
        let clients = Arc::new(FakeClients::default());
        let job = Arc::new(job(
            catalog.clone(),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        ));

        let handle = tokio::spawn({
            let job = job.clone();
            async move { job.run().await }
        });
        catalog.entered.notified().await;

        job.cancel();
        assert!(!job.status().running);

        catalog.release.notify_one();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, SweepSummary::default());
        assert!(clients.calls().is_empty());
        assert!(catalog.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vanished_record_is_a_fault() {
        struct VanishingCatalog;

        #[async_trait]
        impl MediaCatalog for VanishingCatalog {
            async fn find_stale(&self, _cutoff: DateTime<Utc>) -> Result<Vec<MediaRecord>> {
                Ok(vec![movie(1, "553"), movie(2, "554")])
            }

            async fn get_by_id(&self, _id: i64) -> Result<Option<MediaRecord>> {
                Ok(None)
            }

            async fn delete(&self, _record: &MediaRecord) -> Result<()> {
                panic!("nothing to delete");
            }
        }

        let clients = Arc::new(FakeClients::default());
        let job = job(
            Arc::new(VanishingCatalog),
            removal_settings(),
            clients.clone(),
            FakeMetadata::default(),
        );

        let err = job.run().await.unwrap_err();
        assert!(err.to_string().contains("no longer exists"));
        assert_eq!(clients.calls(), vec![("radarr", 0, 553)]);
    }
}
