//! Error taxonomy shared by every paracheck operation.
//!
//! The library only ever surfaces these structured kinds. Turning them into
//! user-facing text or HTTP status codes is left to the CLI and the server.

use thiserror::Error;

/// Result alias used across the library.
pub type PcResult<T> = std::result::Result<T, PcError>;

#[derive(Debug, Error)]
pub enum PcError {
    /// Bad, missing or blank input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The upload parsed but produced nothing usable.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Unknown document, paragraph or version id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The text-generation backend failed. Never retried locally.
    #[error("external service failed: {0}")]
    ExternalService(String),

    /// Neither the original file nor the fallback produced a document.
    #[error("export failed: {0}")]
    Export(String),

    /// Another writer took the version number first. Callers retry.
    #[error("version {version_no} already exists for document {document_id}")]
    VersionConflict { document_id: i64, version_no: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("blob storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A background task died before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PcError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        PcError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PcError::Validation(_) => "bad_request",
            PcError::Parse(_) => "parse_error",
            PcError::NotFound { .. } => "not_found",
            PcError::ExternalService(_) => "external_service",
            PcError::Export(_) => "export_error",
            PcError::VersionConflict { .. } => "version_conflict",
            PcError::Database(_) | PcError::Storage(_) | PcError::Internal(_) => "internal",
        }
    }
}

/// Returns true when a sqlx error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
