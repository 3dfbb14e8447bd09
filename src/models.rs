//! Core data types for documents, paragraphs, rewrite versions and the
//! records handed to the moderation and audit collaborators.
//!
//! Rows are read into these value types and never mutated in place; every
//! change goes back through the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PcError;

/// Lifecycle state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    Checking,
    Checked,
    Rewriting,
    Completed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Checking => "CHECKING",
            DocumentStatus::Checked => "CHECKED",
            DocumentStatus::Rewriting => "REWRITING",
            DocumentStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = PcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UPLOADED" => Ok(DocumentStatus::Uploaded),
            "CHECKING" => Ok(DocumentStatus::Checking),
            "CHECKED" => Ok(DocumentStatus::Checked),
            "REWRITING" => Ok(DocumentStatus::Rewriting),
            "COMPLETED" => Ok(DocumentStatus::Completed),
            other => Err(PcError::Validation(format!(
                "unknown document status: {}",
                other
            ))),
        }
    }
}

/// Rewrite directive understood by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewriteStyle {
    Academic,
    Fluency,
    Expand,
    LogicEnhance,
}

impl RewriteStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteStyle::Academic => "ACADEMIC",
            RewriteStyle::Fluency => "FLUENCY",
            RewriteStyle::Expand => "EXPAND",
            RewriteStyle::LogicEnhance => "LOGIC_ENHANCE",
        }
    }

    /// Lenient lookup: unknown names yield `None` rather than an error.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ACADEMIC" => Some(RewriteStyle::Academic),
            "FLUENCY" => Some(RewriteStyle::Fluency),
            "EXPAND" => Some(RewriteStyle::Expand),
            "LOGIC_ENHANCE" => Some(RewriteStyle::LogicEnhance),
            _ => None,
        }
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub storage_locator: String,
    pub content_hash: String,
    pub status: DocumentStatus,
    pub overall_similarity: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One paragraph of a stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paragraph {
    pub id: i64,
    pub document_id: i64,
    pub index: i64,
    pub text: String,
    pub similarity: Option<f64>,
    pub similar_source: Option<String>,
    pub similar_spans: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A paragraph ready to be inserted alongside its document.
#[derive(Debug, Clone, PartialEq)]
pub struct NewParagraph {
    pub index: i64,
    pub text: String,
    pub similarity: Option<f64>,
    pub similar_source: Option<String>,
}

/// Everything needed to insert a document row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub owner_id: i64,
    pub title: String,
    pub storage_locator: String,
    pub content_hash: String,
    pub status: DocumentStatus,
    pub overall_similarity: f64,
}

/// An immutable rewrite snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteVersion {
    pub id: i64,
    pub document_id: i64,
    pub version_no: i64,
    pub style: Option<String>,
    pub content: String,
    pub remark: Option<String>,
    pub created_by: i64,
    pub created_at: i64,
}

/// Input for a version save.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewVersion {
    pub document_id: i64,
    #[serde(default)]
    pub style: Option<String>,
    pub content: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub created_by: i64,
}

/// A text edit addressed by paragraph index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphEdit {
    pub index: i64,
    pub text: String,
}

/// A moderation word as stored by the moderation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitiveWord {
    pub id: i64,
    pub word: String,
    pub category: String,
    pub level: String,
    pub enabled: bool,
}

/// Kinds of operations written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    UploadAndCheck,
    Rewrite,
    SaveVersion,
    UpdateParagraphs,
    Recheck,
    Download,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::UploadAndCheck => "UPLOAD_AND_CHECK",
            OperationType::Rewrite => "REWRITE",
            OperationType::SaveVersion => "SAVE_VERSION",
            OperationType::UpdateParagraphs => "UPDATE_PARAGRAPHS",
            OperationType::Recheck => "RECHECK",
            OperationType::Download => "DOWNLOAD",
            OperationType::Delete => "DELETE",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationLogEntry {
    pub user_id: i64,
    pub role: Option<String>,
    pub operation_type: String,
    pub document_id: Option<i64>,
    pub paragraph_id: Option<i64>,
    pub detail: String,
    pub timestamp: i64,
}

impl OperationLogEntry {
    pub fn new(user_id: i64, operation: OperationType, detail: impl Into<String>) -> Self {
        Self {
            user_id,
            role: None,
            operation_type: operation.as_str().to_string(),
            document_id: None,
            paragraph_id: None,
            detail: detail.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn document(mut self, document_id: Option<i64>) -> Self {
        self.document_id = document_id;
        self
    }

    pub fn paragraph(mut self, paragraph_id: Option<i64>) -> Self {
        self.paragraph_id = paragraph_id;
        self
    }
}

/// Format a Unix timestamp as ISO 8601 for display.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
