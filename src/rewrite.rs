//! Style-conditioned rewriting of paragraph text.
//!
//! One call to the configured [`TextGenerator`] per request. The rewritten
//! text is scanned for sensitive words afterwards; hits only end up in the
//! `REWRITE` audit entry and never block the result.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::error::{PcError, PcResult};
use crate::generation::TextGenerator;
use crate::models::{DocumentStatus, OperationLogEntry, OperationType, RewriteStyle};
use crate::moderation::SensitiveWordFilter;
use crate::store::SqliteStore;

const BASE_PROMPT: &str = "You are an academic writing assistant. Rewrite the text the user \
provides so that it reads as original work with a lower duplication rate while keeping its \
meaning unchanged. Answer in formal, fluent prose in the same language as the input. Return \
only the rewritten text, without explanations.";

/// System prompt for a style. Unknown or absent styles get the base prompt.
pub fn build_system_prompt(style: Option<&str>) -> String {
    let extra = match style.and_then(RewriteStyle::parse) {
        Some(RewriteStyle::Academic) => {
            "Style: academic paper register, precise wording and varied sentence structure."
        }
        Some(RewriteStyle::Fluency) => {
            "Style: focus on smooth, readable sentences; simplify convoluted phrasing where possible."
        }
        Some(RewriteStyle::Expand) => {
            "Style: moderately expand the text with richer detail and argument, keeping the original meaning."
        }
        Some(RewriteStyle::LogicEnhance) => {
            "Style: strengthen the logical flow and structure; word order may change and small amounts of information may be added or removed."
        }
        None => return BASE_PROMPT.to_string(),
    };
    format!("{} {}", BASE_PROMPT, extra)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub paragraph_id: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResult {
    pub rewritten_text: String,
    pub style: Option<String>,
    pub tokens_used: u32,
}

pub struct RewriteOrchestrator {
    generator: Arc<dyn TextGenerator>,
    filter: Arc<dyn SensitiveWordFilter>,
    audit: Arc<dyn AuditSink>,
    store: Option<Arc<SqliteStore>>,
}

impl RewriteOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        filter: Arc<dyn SensitiveWordFilter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            generator,
            filter,
            audit,
            store: None,
        }
    }

    /// Track document status: a checked document moves to `REWRITING`
    /// after its first successful rewrite.
    pub fn with_store(mut self, store: Arc<SqliteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn rewrite(&self, user_id: i64, request: &RewriteRequest) -> PcResult<RewriteResult> {
        if request.text.trim().is_empty() {
            return Err(PcError::Validation(
                "text to rewrite must not be blank".to_string(),
            ));
        }
        let style = request.style.as_deref();
        let system_prompt = build_system_prompt(style);

        tracing::info!(
            user_id,
            document_id = ?request.document_id,
            paragraph_id = ?request.paragraph_id,
            style = style.unwrap_or("-"),
            model = self.generator.model_name(),
            "rewriting text"
        );
        let generation = self.generator.generate(&system_prompt, &request.text).await?;

        let hits = match self.filter.find_sensitive_words(&generation.text).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "sensitive-word scan failed, continuing without it");
                Default::default()
            }
        };

        let mut detail = String::from("rewrite");
        if let Some(id) = request.document_id {
            detail.push_str(&format!(" document={}", id));
        }
        if let Some(id) = request.paragraph_id {
            detail.push_str(&format!(" paragraph={}", id));
        }
        if let Some(s) = style {
            detail.push_str(&format!(" style={}", s));
        }
        if !hits.is_empty() {
            let words: Vec<&str> = hits.iter().map(String::as_str).collect();
            detail.push_str(&format!(" sensitive={}", words.join("/")));
        }
        self.audit
            .append(
                OperationLogEntry::new(user_id, OperationType::Rewrite, detail)
                    .document(request.document_id)
                    .paragraph(request.paragraph_id),
            )
            .await;

        if let (Some(store), Some(id)) = (&self.store, request.document_id) {
            self.mark_rewriting(store, id).await;
        }

        Ok(RewriteResult {
            rewritten_text: generation.text,
            style: request.style.clone(),
            tokens_used: generation.tokens_used,
        })
    }

    async fn mark_rewriting(&self, store: &SqliteStore, document_id: i64) {
        match store.get_document(document_id).await {
            Ok(Some(doc)) if doc.status == DocumentStatus::Checked => {
                if let Err(e) = store
                    .update_status(document_id, DocumentStatus::Rewriting)
                    .await
                {
                    tracing::warn!(document_id, error = %e, "failed to update document status");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(document_id, error = %e, "failed to load document status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::generation::{DisabledGenerator, Generation};
    use crate::moderation::StaticWordFilter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the text upper-cased and remembers the prompt it was given.
    #[derive(Default)]
    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, system_prompt: &str, user_text: &str) -> PcResult<Generation> {
            self.prompts.lock().unwrap().push(system_prompt.to_string());
            Ok(Generation {
                text: user_text.to_uppercase(),
                tokens_used: 7,
            })
        }
    }

    fn request(text: &str, style: Option<&str>) -> RewriteRequest {
        RewriteRequest {
            document_id: Some(3),
            paragraph_id: Some(11),
            text: text.to_string(),
            style: style.map(str::to_string),
        }
    }

    #[test]
    fn prompts_per_style() {
        let base = build_system_prompt(None);
        assert_eq!(base, BASE_PROMPT);
        assert_eq!(build_system_prompt(Some("poetic")), base);

        let academic = build_system_prompt(Some("academic"));
        assert!(academic.starts_with(BASE_PROMPT));
        assert!(academic.contains("academic paper"));
        for style in ["ACADEMIC", "FLUENCY", "EXPAND", "LOGIC_ENHANCE"] {
            assert_ne!(build_system_prompt(Some(style)), base, "{}", style);
        }
    }

    #[tokio::test]
    async fn rewrite_returns_generation_and_audits_hits() {
        let generator = Arc::new(EchoGenerator::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = RewriteOrchestrator::new(
            generator.clone(),
            Arc::new(StaticWordFilter::new(["forbidden"])),
            audit.clone(),
        );

        let result = orchestrator
            .rewrite(5, &request("this is forbidden text", Some("fluency")))
            .await
            .unwrap();
        assert_eq!(result.rewritten_text, "THIS IS FORBIDDEN TEXT");
        assert_eq!(result.style.as_deref(), Some("fluency"));
        assert_eq!(result.tokens_used, 7);
        assert!(generator.prompts.lock().unwrap()[0].contains("readable"));

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation_type, "REWRITE");
        assert_eq!(entries[0].user_id, 5);
        assert_eq!(entries[0].document_id, Some(3));
        assert_eq!(entries[0].paragraph_id, Some(11));
        assert!(entries[0].detail.contains("sensitive=forbidden"));
    }

    #[tokio::test]
    async fn clean_text_has_no_hits_in_detail() {
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = RewriteOrchestrator::new(
            Arc::new(EchoGenerator::default()),
            Arc::new(StaticWordFilter::new(["forbidden"])),
            audit.clone(),
        );
        orchestrator
            .rewrite(1, &request("harmless", None))
            .await
            .unwrap();
        assert!(!audit.entries()[0].detail.contains("sensitive"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_generation() {
        let generator = Arc::new(EchoGenerator::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = RewriteOrchestrator::new(
            generator.clone(),
            Arc::new(StaticWordFilter::default()),
            audit.clone(),
        );
        let err = orchestrator
            .rewrite(1, &request(" \n\t", None))
            .await
            .unwrap_err();
        assert!(matches!(err, PcError::Validation(_)));
        assert!(generator.prompts.lock().unwrap().is_empty());
        assert!(audit.entries().is_empty());
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = RewriteOrchestrator::new(
            Arc::new(DisabledGenerator),
            Arc::new(StaticWordFilter::default()),
            audit.clone(),
        );
        let err = orchestrator
            .rewrite(1, &request("some text", Some("EXPAND")))
            .await
            .unwrap_err();
        assert!(matches!(err, PcError::ExternalService(_)));
        assert!(audit.entries().is_empty());
    }
}
