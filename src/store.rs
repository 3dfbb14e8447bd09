//! SQLite persistence for documents, paragraphs and rewrite versions.
//!
//! Multi-row writes (ingestion, batch edits, re-scoring) each run in a single
//! transaction, so readers never observe a document without its paragraphs
//! or a half-applied edit.

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::error::{is_unique_violation, PcError, PcResult};
use crate::models::{
    Document, DocumentStatus, NewDocument, NewParagraph, NewVersion, Paragraph, ParagraphEdit,
    RewriteVersion,
};
use crate::versions::VersionRepository;

/// Filters for [`SqliteStore::list_documents`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFilter {
    pub owner_id: Option<i64>,
    /// Substring match on the title.
    pub title: Option<String>,
    pub status: Option<DocumentStatus>,
    /// 1-based page number.
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Larger page sizes are clamped to this.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Scores to write back for one paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphScore {
    pub index: i64,
    pub similarity: f64,
    pub similar_source: Option<String>,
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using the configured database path. The schema must exist.
    pub async fn open(config: &Config) -> PcResult<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a document and all of its paragraphs in one transaction.
    ///
    /// Any failure rolls the whole unit back, including the document row.
    pub async fn insert_document(
        &self,
        doc: &NewDocument,
        paragraphs: &[NewParagraph],
    ) -> PcResult<(Document, Vec<Paragraph>)> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (owner_id, title, storage_locator, content_hash, status,
                                   overall_similarity, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.owner_id)
        .bind(&doc.title)
        .bind(&doc.storage_locator)
        .bind(&doc.content_hash)
        .bind(doc.status.as_str())
        .bind(doc.overall_similarity)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let document_id = result.last_insert_rowid();

        let mut stored = Vec::with_capacity(paragraphs.len());
        for p in paragraphs {
            let result = sqlx::query(
                r#"
                INSERT INTO paragraphs (document_id, paragraph_index, text, similarity,
                                        similar_source, similar_spans, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
                "#,
            )
            .bind(document_id)
            .bind(p.index)
            .bind(&p.text)
            .bind(p.similarity)
            .bind(&p.similar_source)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            stored.push(Paragraph {
                id: result.last_insert_rowid(),
                document_id,
                index: p.index,
                text: p.text.clone(),
                similarity: p.similarity,
                similar_source: p.similar_source.clone(),
                similar_spans: None,
                created_at: now,
                updated_at: now,
            });
        }

        tx.commit().await?;

        let document = Document {
            id: document_id,
            owner_id: doc.owner_id,
            title: doc.title.clone(),
            storage_locator: doc.storage_locator.clone(),
            content_hash: doc.content_hash.clone(),
            status: doc.status,
            overall_similarity: doc.overall_similarity,
            created_at: now,
            updated_at: now,
        };
        Ok((document, stored))
    }

    pub async fn get_document(&self, id: i64) -> PcResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, storage_locator, content_hash, status, \
             overall_similarity, created_at, updated_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Like [`get_document`](Self::get_document) but unknown ids are an error.
    pub async fn require_document(&self, id: i64) -> PcResult<Document> {
        self.get_document(id)
            .await?
            .ok_or_else(|| PcError::not_found("document", id))
    }

    /// Paragraphs of a document in index order.
    pub async fn list_paragraphs(&self, document_id: i64) -> PcResult<Vec<Paragraph>> {
        let rows = sqlx::query(
            "SELECT id, document_id, paragraph_index, text, similarity, similar_source, \
             similar_spans, created_at, updated_at FROM paragraphs \
             WHERE document_id = ? ORDER BY paragraph_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(paragraph_from_row).collect())
    }

    /// Replace the text of the addressed paragraphs. Indices that do not
    /// exist are skipped. Returns the number of rows changed.
    pub async fn update_paragraph_texts(
        &self,
        document_id: i64,
        edits: &[ParagraphEdit],
    ) -> PcResult<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;

        for edit in edits {
            let result = sqlx::query(
                "UPDATE paragraphs SET text = ?, updated_at = ? \
                 WHERE document_id = ? AND paragraph_index = ?",
            )
            .bind(&edit.text)
            .bind(now)
            .bind(document_id)
            .bind(edit.index)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }

        sqlx::query("UPDATE documents SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(changed)
    }

    /// Write fresh similarity scores and the document mean in one transaction.
    pub async fn apply_scores(
        &self,
        document_id: i64,
        scores: &[ParagraphScore],
        overall: f64,
        status: DocumentStatus,
    ) -> PcResult<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for s in scores {
            sqlx::query(
                "UPDATE paragraphs SET similarity = ?, similar_source = ?, updated_at = ? \
                 WHERE document_id = ? AND paragraph_index = ?",
            )
            .bind(s.similarity)
            .bind(&s.similar_source)
            .bind(now)
            .bind(document_id)
            .bind(s.index)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE documents SET overall_similarity = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(overall)
        .bind(status.as_str())
        .bind(now)
        .bind(document_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn update_status(&self, document_id: i64, status: DocumentStatus) -> PcResult<()> {
        let result = sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PcError::not_found("document", document_id));
        }
        Ok(())
    }

    /// Newest first, paginated.
    pub async fn list_documents(&self, filter: &DocumentFilter) -> PcResult<Vec<Document>> {
        let page = filter.page.filter(|p| *p > 0).unwrap_or(1);
        let size = filter
            .size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        let offset = (page - 1).checked_mul(size).ok_or_else(|| {
            PcError::Validation(format!("page {} is out of range", page))
        })?;

        let mut sql = String::from(
            "SELECT id, owner_id, title, storage_locator, content_hash, status, \
             overall_similarity, created_at, updated_at FROM documents WHERE 1=1",
        );
        if filter.owner_id.is_some() {
            sql.push_str(" AND owner_id = ?");
        }
        if filter.title.as_deref().is_some_and(|t| !t.is_empty()) {
            sql.push_str(" AND title LIKE ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(owner) = filter.owner_id {
            query = query.bind(owner);
        }
        if let Some(title) = filter.title.as_deref().filter(|t| !t.is_empty()) {
            query = query.bind(format!("%{}%", title));
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        query = query.bind(size).bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(document_from_row).collect()
    }

    /// Delete a document; paragraphs and versions go with it.
    pub async fn delete_document(&self, id: i64) -> PcResult<Document> {
        let doc = self.require_document(id).await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(doc)
    }
}

#[async_trait]
impl VersionRepository for SqliteStore {
    async fn document_exists(&self, document_id: i64) -> PcResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn max_version_no(&self, document_id: i64) -> PcResult<i64> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version_no) FROM rewrite_versions WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.unwrap_or(0))
    }

    async fn insert_version(&self, new: &NewVersion, version_no: i64) -> PcResult<RewriteVersion> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO rewrite_versions (document_id, version_no, style, content, remark,
                                          created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.document_id)
        .bind(version_no)
        .bind(&new.style)
        .bind(&new.content)
        .bind(&new.remark)
        .bind(new.created_by)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PcError::VersionConflict {
                    document_id: new.document_id,
                    version_no,
                }
            } else {
                PcError::Database(e)
            }
        })?;

        Ok(RewriteVersion {
            id: result.last_insert_rowid(),
            document_id: new.document_id,
            version_no,
            style: new.style.clone(),
            content: new.content.clone(),
            remark: new.remark.clone(),
            created_by: new.created_by,
            created_at: now,
        })
    }

    async fn list_versions(&self, document_id: i64) -> PcResult<Vec<RewriteVersion>> {
        let rows = sqlx::query(
            "SELECT id, document_id, version_no, style, content, remark, created_by, created_at \
             FROM rewrite_versions WHERE document_id = ? ORDER BY version_no DESC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(version_from_row).collect())
    }

    async fn get_version(&self, version_id: i64) -> PcResult<Option<RewriteVersion>> {
        let row = sqlx::query(
            "SELECT id, document_id, version_no, style, content, remark, created_by, created_at \
             FROM rewrite_versions WHERE id = ?",
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(version_from_row))
    }
}

fn document_from_row(row: &SqliteRow) -> PcResult<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        storage_locator: row.get("storage_locator"),
        content_hash: row.get("content_hash"),
        status: status.parse()?,
        overall_similarity: row.get("overall_similarity"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn paragraph_from_row(row: &SqliteRow) -> Paragraph {
    Paragraph {
        id: row.get("id"),
        document_id: row.get("document_id"),
        index: row.get("paragraph_index"),
        text: row.get("text"),
        similarity: row.get("similarity"),
        similar_source: row.get("similar_source"),
        similar_spans: row.get("similar_spans"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn version_from_row(row: &SqliteRow) -> RewriteVersion {
    RewriteVersion {
        id: row.get("id"),
        document_id: row.get("document_id"),
        version_no: row.get("version_no"),
        style: row.get("style"),
        content: row.get("content"),
        remark: row.get("remark"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}
