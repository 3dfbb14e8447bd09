//! Append-only rewrite history.
//!
//! Version numbers are assigned optimistically: read the current maximum,
//! insert `max + 1`, and let the `(document_id, version_no)` uniqueness
//! constraint reject a writer that lost the race. The loser gets
//! [`PcError::VersionConflict`] and may retry through [`retry_on_conflict`].
//!
//! Records are never updated. The only way a version disappears is the
//! cascading delete of its document.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::error::{PcError, PcResult};
use crate::models::{NewVersion, OperationLogEntry, OperationType, RewriteVersion};

/// Storage contract the version manager relies on.
///
/// `insert_version` must fail with [`PcError::VersionConflict`] when the
/// number is already taken for that document, and must not take locks.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    async fn document_exists(&self, document_id: i64) -> PcResult<bool>;

    /// Highest version number for the document, 0 when there is none.
    async fn max_version_no(&self, document_id: i64) -> PcResult<i64>;

    async fn insert_version(&self, new: &NewVersion, version_no: i64) -> PcResult<RewriteVersion>;

    /// Newest first.
    async fn list_versions(&self, document_id: i64) -> PcResult<Vec<RewriteVersion>>;

    async fn get_version(&self, version_id: i64) -> PcResult<Option<RewriteVersion>>;
}

pub struct VersionManager<R> {
    repo: Arc<R>,
    audit: Arc<dyn AuditSink>,
}

impl<R: VersionRepository> VersionManager<R> {
    pub fn new(repo: Arc<R>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repo, audit }
    }

    /// Save a new snapshot as version `max + 1`. A single attempt.
    pub async fn save_version(&self, new: &NewVersion) -> PcResult<RewriteVersion> {
        if new.content.trim().is_empty() {
            return Err(PcError::Validation(
                "version content must not be blank".to_string(),
            ));
        }
        if !self.repo.document_exists(new.document_id).await? {
            return Err(PcError::not_found("document", new.document_id));
        }

        let next = self.repo.max_version_no(new.document_id).await? + 1;
        let version = self.repo.insert_version(new, next).await?;

        tracing::info!(
            document_id = version.document_id,
            version_no = version.version_no,
            "saved rewrite version"
        );
        self.audit
            .append(
                OperationLogEntry::new(
                    new.created_by,
                    OperationType::SaveVersion,
                    format!(
                        "version {} style={}",
                        version.version_no,
                        version.style.as_deref().unwrap_or("-")
                    ),
                )
                .document(Some(version.document_id)),
            )
            .await;
        Ok(version)
    }

    /// [`save_version`](Self::save_version) retried on version conflicts.
    pub async fn save_version_with_retry(
        &self,
        new: &NewVersion,
        max_attempts: u32,
    ) -> PcResult<RewriteVersion> {
        retry_on_conflict(max_attempts, || self.save_version(new)).await
    }

    pub async fn list_versions(&self, document_id: i64) -> PcResult<Vec<RewriteVersion>> {
        self.repo.list_versions(document_id).await
    }

    pub async fn get_version(&self, version_id: i64) -> PcResult<RewriteVersion> {
        self.repo
            .get_version(version_id)
            .await?
            .ok_or_else(|| PcError::not_found("version", version_id))
    }
}

/// Run `op` until it returns something other than a version conflict, at
/// most `max_attempts` times. The last conflict is returned if every
/// attempt loses.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> PcResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PcResult<T>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(PcError::VersionConflict {
                document_id,
                version_no,
            }) if attempt < attempts => {
                tracing::debug!(
                    document_id,
                    version_no,
                    attempt,
                    "version number taken, retrying"
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}
