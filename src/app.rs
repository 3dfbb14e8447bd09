//! Wiring of the services the CLI and the HTTP server share.

use std::sync::Arc;

use crate::audit::{AuditSink, SqliteAuditSink};
use crate::blob::{BlobStore, FsBlobStore};
use crate::config::Config;
use crate::error::PcResult;
use crate::generation::{create_generator, TextGenerator};
use crate::ingest::DocumentService;
use crate::models::{NewVersion, RewriteVersion};
use crate::moderation::{SensitiveWordFilter, SqliteWordFilter};
use crate::rewrite::RewriteOrchestrator;
use crate::store::SqliteStore;
use crate::versions::VersionManager;

pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub documents: DocumentService,
    pub rewriter: RewriteOrchestrator,
    pub versions: VersionManager<SqliteStore>,
    pub words: Arc<SqliteWordFilter>,
    pub audit: Arc<SqliteAuditSink>,
}

impl App {
    /// Connect to the database and build every service from `config`.
    /// The schema must already exist (`paracheck init`).
    pub async fn open(config: &Config) -> PcResult<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::from(create_generator(&config.generation)?);
        Self::with_generator(config, generator).await
    }

    /// Like [`open`](Self::open) with a caller-supplied text generator.
    pub async fn with_generator(
        config: &Config,
        generator: Arc<dyn TextGenerator>,
    ) -> PcResult<Self> {
        let store = Arc::new(SqliteStore::open(config).await?);
        let pool = store.pool().clone();

        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.root.clone()));
        let words = Arc::new(SqliteWordFilter::new(pool.clone()));
        let audit = Arc::new(SqliteAuditSink::new(pool));
        let filter: Arc<dyn SensitiveWordFilter> = words.clone();
        let sink: Arc<dyn AuditSink> = audit.clone();

        let documents = DocumentService::new(
            store.clone(),
            blobs,
            filter.clone(),
            sink.clone(),
            config.similarity.clone(),
        );
        let rewriter =
            RewriteOrchestrator::new(generator, filter, sink.clone()).with_store(store.clone());
        let versions = VersionManager::new(store.clone(), sink);

        Ok(Self {
            config: Arc::new(config.clone()),
            store,
            documents,
            rewriter,
            versions,
            words,
            audit,
        })
    }

    /// Save a version, retrying lost version-number races as configured.
    pub async fn save_version(&self, new: &NewVersion) -> PcResult<RewriteVersion> {
        self.versions
            .save_version_with_retry(new, self.config.versions.max_save_attempts)
            .await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
