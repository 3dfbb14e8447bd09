use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::PcResult;

pub async fn run_migrations(config: &Config) -> PcResult<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> PcResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            storage_locator TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            status TEXT NOT NULL,
            overall_similarity REAL NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS paragraphs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            paragraph_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            similarity REAL,
            similar_source TEXT,
            similar_spans TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(document_id, paragraph_index),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Version numbers are only ever made unique here; writers do not lock.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rewrite_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            version_no INTEGER NOT NULL,
            style TEXT,
            content TEXT NOT NULL,
            remark TEXT,
            created_by INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, version_no),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensitive_words (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            word TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL DEFAULT 'DEFAULT',
            level TEXT NOT NULL DEFAULT 'LOW',
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operation_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            user_role TEXT,
            operation_type TEXT NOT NULL,
            document_id INTEGER,
            paragraph_id INTEGER,
            detail TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_operation_logs_document ON operation_logs(document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
