//! Text-generation backends used by the rewrite orchestrator.
//!
//! Defines the [`TextGenerator`] trait and its implementations:
//! - **[`DisabledGenerator`]**: always fails; used when generation is not configured.
//! - **[`OpenAiGenerator`]**: calls an OpenAI-compatible `chat/completions` endpoint.
//!
//! Use [`create_generator`] to pick one from the configuration.
//!
//! # Failure Semantics
//!
//! A generation call is made exactly once. There is no retry, backoff or
//! cancellation here; every failure (network, non-2xx, malformed body)
//! surfaces as [`PcError::ExternalService`] and the caller decides what to
//! do. A request timeout applies only when `generation.timeout_secs` is set.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{PcError, PcResult};

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Total tokens billed for the call, 0 when the backend does not say.
    pub tokens_used: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    async fn generate(&self, system_prompt: &str, user_text: &str) -> PcResult<Generation>;
}

// ============ Disabled Generator ============

/// Used when `generation.provider = "disabled"`. Every call fails.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _system_prompt: &str, _user_text: &str) -> PcResult<Generation> {
        Err(PcError::ExternalService(
            "text generation is disabled".to_string(),
        ))
    }
}

// ============ OpenAI Generator ============

/// Chat-completions client for OpenAI and compatible servers.
///
/// The API key is read from the environment variable named by
/// `generation.api_key_env` when the generator is built.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: Option<f64>,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> PcResult<Self> {
        let model = config.model.clone().ok_or_else(|| {
            PcError::Validation("generation.model required for openai provider".to_string())
        })?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PcError::ExternalService(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::with_key(config, model, api_key)
    }

    /// Build with an explicit key instead of reading the environment.
    pub fn with_key(config: &GenerationConfig, model: String, api_key: String) -> PcResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| PcError::ExternalService(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.url.trim_end_matches('/')),
            model,
            api_key,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, system_prompt: &str, user_text: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_text },
            ],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        body
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system_prompt: &str, user_text: &str) -> PcResult<Generation> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(system_prompt, user_text))
            .send()
            .await
            .map_err(|e| PcError::ExternalService(format!("generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(PcError::ExternalService(format!(
                "generation API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PcError::ExternalService(format!("invalid generation response: {}", e)))?;
        parse_chat_response(&json)
    }
}

/// Pull the first choice's message content and the token usage out of a
/// chat-completions response.
fn parse_chat_response(json: &serde_json::Value) -> PcResult<Generation> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            PcError::ExternalService(
                "invalid generation response: missing choices[0].message.content".to_string(),
            )
        })?;
    let tokens_used = json
        .pointer("/usage/total_tokens")
        .and_then(|t| t.as_u64())
        .unwrap_or(0);

    Ok(Generation {
        text: text.trim().to_string(),
        tokens_used: u32::try_from(tokens_used).unwrap_or(u32::MAX),
    })
}

/// Create the configured [`TextGenerator`].
///
/// | Config Value | Generator |
/// |-------------|-----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"openai"` | [`OpenAiGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> PcResult<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        other => Err(PcError::Validation(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_and_usage() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Rewritten.\n" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let g = parse_chat_response(&json).unwrap();
        assert_eq!(g.text, "Rewritten.");
        assert_eq!(g.tokens_used, 15);
    }

    #[test]
    fn missing_usage_counts_zero() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "ok" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap().tokens_used, 0);
    }

    #[test]
    fn missing_choices_is_external_failure() {
        let json = serde_json::json!({ "error": { "message": "boom" } });
        assert!(matches!(
            parse_chat_response(&json),
            Err(PcError::ExternalService(_))
        ));
    }

    #[test]
    fn request_body_includes_temperature_only_when_set() {
        let mut config = GenerationConfig::default();
        let g = OpenAiGenerator::with_key(&config, "m".into(), "k".into()).unwrap();
        let body = g.request_body("sys", "user");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert!(body.get("temperature").is_none());

        config.temperature = Some(0.5);
        config.url = "http://localhost:8080/v1/".to_string();
        let g = OpenAiGenerator::with_key(&config, "m".into(), "k".into()).unwrap();
        assert_eq!(g.request_body("s", "u")["temperature"], 0.5);
        assert_eq!(g.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn disabled_generator_fails() {
        let err = DisabledGenerator.generate("s", "u").await.unwrap_err();
        assert!(matches!(err, PcError::ExternalService(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_external_failure() {
        let config = GenerationConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: Some(2),
            ..Default::default()
        };
        let g = OpenAiGenerator::with_key(&config, "m".into(), "k".into()).unwrap();
        let err = g.generate("s", "u").await.unwrap_err();
        assert!(matches!(err, PcError::ExternalService(_)));
    }
}
