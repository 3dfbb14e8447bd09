//! Document lifecycle: upload and check, report, edit, re-check, list,
//! export and delete.
//!
//! Uploads go through extraction, scoring and storage in that order; the
//! database write is a single transaction, so a failure at any step leaves
//! no document behind. Scoring is CPU-bound and runs on the blocking pool.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

use crate::audit::AuditSink;
use crate::blob::BlobStore;
use crate::config::SimilarityConfig;
use crate::error::{PcError, PcResult};
use crate::export::{build_docx, export_filename, ExportMode};
use crate::extract::{extension, extract_paragraphs};
use crate::models::{
    Document, DocumentStatus, NewDocument, NewParagraph, OperationLogEntry, OperationType,
    Paragraph, ParagraphEdit,
};
use crate::moderation::SensitiveWordFilter;
use crate::similarity::{score_paragraphs, score_paragraphs_parallel, SimilarityReport};
use crate::store::{DocumentFilter, ParagraphScore, SqliteStore};

/// One paragraph as returned from an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredParagraph {
    pub index: i64,
    pub text: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub document_id: i64,
    pub title: String,
    pub overall_similarity: f64,
    pub paragraphs: Vec<ScoredParagraph>,
    pub storage_locator: String,
}

/// A document with its paragraphs and the ones at or above the high-risk threshold.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    pub document: Document,
    pub paragraphs: Vec<Paragraph>,
    pub high_risk_threshold: f64,
    pub high_risk: Vec<Paragraph>,
}

/// A rebuilt `.docx` ready to hand out.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mode: ExportMode,
}

pub struct DocumentService {
    store: Arc<SqliteStore>,
    blobs: Arc<dyn BlobStore>,
    filter: Arc<dyn SensitiveWordFilter>,
    audit: Arc<dyn AuditSink>,
    similarity: SimilarityConfig,
}

impl DocumentService {
    pub fn new(
        store: Arc<SqliteStore>,
        blobs: Arc<dyn BlobStore>,
        filter: Arc<dyn SensitiveWordFilter>,
        audit: Arc<dyn AuditSink>,
        similarity: SimilarityConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            filter,
            audit,
            similarity,
        }
    }

    /// Parse, score and persist an upload.
    pub async fn upload(&self, owner_id: i64, filename: &str, bytes: &[u8]) -> PcResult<UploadResult> {
        let texts = extract_paragraphs(bytes, filename)?;
        let report = self.score(texts.clone()).await?;

        let locator = self.blobs.store(bytes, extension(filename).as_deref()).await?;

        let new_doc = NewDocument {
            owner_id,
            title: filename.to_string(),
            storage_locator: locator.clone(),
            content_hash: format!("{:x}", Sha256::digest(bytes)),
            status: DocumentStatus::Checked,
            overall_similarity: report.overall,
        };
        let new_paragraphs = to_new_paragraphs(&texts, &report);

        let (document, paragraphs) = match self.store.insert_document(&new_doc, &new_paragraphs).await
        {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(cleanup) = self.blobs.remove(&locator).await {
                    tracing::warn!(locator = %locator, error = %cleanup, "failed to remove orphaned upload");
                }
                return Err(e);
            }
        };

        let hits = self.count_sensitive_hits(&texts).await;
        let mut detail = format!(
            "upload and check: {}, overall similarity {:.1}%",
            document.title, document.overall_similarity
        );
        if hits > 0 {
            detail.push_str(&format!(", sensitive hits {}", hits));
        }
        self.audit
            .append(
                OperationLogEntry::new(owner_id, OperationType::UploadAndCheck, detail)
                    .document(Some(document.id)),
            )
            .await;

        tracing::info!(
            document_id = document.id,
            paragraphs = paragraphs.len(),
            overall = document.overall_similarity,
            "document checked"
        );

        Ok(UploadResult {
            document_id: document.id,
            title: document.title,
            overall_similarity: document.overall_similarity,
            paragraphs: paragraphs
                .into_iter()
                .map(|p| ScoredParagraph {
                    index: p.index,
                    text: p.text,
                    similarity: p.similarity.unwrap_or(0.0),
                })
                .collect(),
            storage_locator: document.storage_locator,
        })
    }

    pub async fn report(&self, document_id: i64) -> PcResult<DocumentReport> {
        let document = self.store.require_document(document_id).await?;
        let paragraphs = self.store.list_paragraphs(document_id).await?;
        let threshold = self.similarity.high_risk_threshold;
        let high_risk = paragraphs
            .iter()
            .filter(|p| p.similarity.is_some_and(|s| s >= threshold))
            .cloned()
            .collect();
        Ok(DocumentReport {
            document,
            paragraphs,
            high_risk_threshold: threshold,
            high_risk,
        })
    }

    /// Apply text edits in one transaction. Unknown indices are skipped.
    /// Scores are not recomputed; see [`recheck`](Self::recheck).
    pub async fn update_paragraphs(
        &self,
        user_id: i64,
        document_id: i64,
        edits: &[ParagraphEdit],
    ) -> PcResult<u64> {
        if let Some(edit) = edits.iter().find(|e| e.text.trim().is_empty()) {
            return Err(PcError::Validation(format!(
                "paragraph {} text must not be blank",
                edit.index
            )));
        }
        self.store.require_document(document_id).await?;
        let changed = self.store.update_paragraph_texts(document_id, edits).await?;

        self.audit
            .append(
                OperationLogEntry::new(
                    user_id,
                    OperationType::UpdateParagraphs,
                    format!("updated {} of {} paragraphs", changed, edits.len()),
                )
                .document(Some(document_id)),
            )
            .await;
        Ok(changed)
    }

    /// Score the current paragraph texts again and store the result.
    pub async fn recheck(&self, user_id: i64, document_id: i64) -> PcResult<DocumentReport> {
        self.store.require_document(document_id).await?;
        let paragraphs = self.store.list_paragraphs(document_id).await?;
        let texts: Vec<String> = paragraphs.iter().map(|p| p.text.clone()).collect();
        let report = self.score(texts).await?;

        let scores: Vec<ParagraphScore> = paragraphs
            .iter()
            .enumerate()
            .map(|(pos, p)| ParagraphScore {
                index: p.index,
                similarity: report.scores[pos],
                similar_source: report.sources[pos]
                    .map(|partner| format!("paragraph:{}", paragraphs[partner].index)),
            })
            .collect();
        self.store
            .apply_scores(document_id, &scores, report.overall, DocumentStatus::Checked)
            .await?;

        self.audit
            .append(
                OperationLogEntry::new(
                    user_id,
                    OperationType::Recheck,
                    format!("recheck: overall similarity {:.1}%", report.overall),
                )
                .document(Some(document_id)),
            )
            .await;
        self.report(document_id).await
    }

    pub async fn list(&self, filter: &DocumentFilter) -> PcResult<Vec<Document>> {
        self.store.list_documents(filter).await
    }

    /// Delete a document with its paragraphs and versions. The stored
    /// upload is removed best-effort.
    pub async fn delete(&self, user_id: i64, document_id: i64) -> PcResult<()> {
        let doc = self.store.delete_document(document_id).await?;
        if let Err(e) = self.blobs.remove(&doc.storage_locator).await {
            tracing::warn!(document_id, error = %e, "failed to remove stored upload");
        }
        self.audit
            .append(
                OperationLogEntry::new(
                    user_id,
                    OperationType::Delete,
                    format!("delete: {}", doc.title),
                )
                .document(Some(document_id)),
            )
            .await;
        Ok(())
    }

    /// Rebuild a `.docx` from the current paragraph texts.
    pub async fn export(&self, user_id: i64, document_id: i64) -> PcResult<ExportedDocument> {
        let doc = self.store.require_document(document_id).await?;
        let texts: Vec<String> = self
            .store
            .list_paragraphs(document_id)
            .await?
            .into_iter()
            .map(|p| p.text)
            .collect();

        let original = if extension(&doc.storage_locator).as_deref() == Some("docx") {
            match self.blobs.load(&doc.storage_locator).await {
                Ok(Some(bytes)) => Some(bytes),
                Ok(None) => {
                    tracing::warn!(document_id, "original upload missing, exporting a fresh document");
                    None
                }
                Err(e) => {
                    tracing::warn!(document_id, error = %e, "original upload unreadable, exporting a fresh document");
                    None
                }
            }
        } else {
            None
        };

        let (bytes, mode) = build_docx(original.as_deref(), &texts)?;
        self.audit
            .append(
                OperationLogEntry::new(
                    user_id,
                    OperationType::Download,
                    format!("download: {} ({})", doc.title, mode.as_str()),
                )
                .document(Some(document_id)),
            )
            .await;

        Ok(ExportedDocument {
            filename: export_filename(&doc.title),
            bytes,
            mode,
        })
    }

    async fn score(&self, texts: Vec<String>) -> PcResult<SimilarityReport> {
        let parallel = self.similarity.parallel;
        let n = texts.len();
        let started = Instant::now();
        let report = tokio::task::spawn_blocking(move || {
            if parallel {
                score_paragraphs_parallel(&texts)
            } else {
                score_paragraphs(&texts)
            }
        })
        .await
        .map_err(|e| PcError::Internal(format!("similarity scoring failed: {}", e)))?;
        tracing::debug!(
            paragraphs = n,
            parallel,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scored paragraphs"
        );
        Ok(report)
    }

    async fn count_sensitive_hits(&self, texts: &[String]) -> usize {
        let mut hits = 0;
        for text in texts {
            match self.filter.find_sensitive_words(text).await {
                Ok(found) => hits += found.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "sensitive-word scan failed");
                    return hits;
                }
            }
        }
        hits
    }
}

fn to_new_paragraphs(texts: &[String], report: &SimilarityReport) -> Vec<NewParagraph> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| NewParagraph {
            index: i as i64,
            text: text.clone(),
            similarity: Some(report.scores[i]),
            similar_source: report.sources[i].map(|partner| format!("paragraph:{}", partner)),
        })
        .collect()
}
