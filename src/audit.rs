//! Append-only operation log.
//!
//! Appends are fire-and-forget: a failing sink is logged and the calling
//! operation carries on.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Mutex;

use crate::error::PcResult;
use crate::models::OperationLogEntry;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: OperationLogEntry);
}

/// Writes entries to `operation_logs`.
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Entries for one document, oldest first.
    pub async fn list_for_document(&self, document_id: i64) -> PcResult<Vec<OperationLogEntry>> {
        let rows = sqlx::query(
            "SELECT user_id, user_role, operation_type, document_id, paragraph_id, detail, \
             created_at FROM operation_logs WHERE document_id = ? ORDER BY id ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| OperationLogEntry {
                user_id: row.get("user_id"),
                role: row.get("user_role"),
                operation_type: row.get("operation_type"),
                document_id: row.get("document_id"),
                paragraph_id: row.get("paragraph_id"),
                detail: row.get("detail"),
                timestamp: row.get("created_at"),
            })
            .collect())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, entry: OperationLogEntry) {
        let result = sqlx::query(
            "INSERT INTO operation_logs (user_id, user_role, operation_type, document_id, \
             paragraph_id, detail, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.user_id)
        .bind(&entry.role)
        .bind(&entry.operation_type)
        .bind(entry.document_id)
        .bind(entry.paragraph_id)
        .bind(&entry.detail)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                operation = %entry.operation_type,
                error = %e,
                "failed to write audit entry"
            );
        }
    }
}

/// Keeps entries in memory. Handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<OperationLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<OperationLogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: OperationLogEntry) {
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
