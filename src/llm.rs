//! Language-model provider abstraction.
//!
//! The completion call is an opaque text-in/text-out boundary: the engine
//! hands over a system instruction (with retrieved passages already folded
//! in) and the user message, and gets back the assistant's answer. Failures
//! surface as [`Error::Provider`] — an unavailable assistant is reported,
//! never silently turned into an empty answer.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce an assistant answer for one stateless call.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Build the configured chat model.
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiChat::new(config)?)),
        "mock" => Ok(Box::new(MockChat)),
        "disabled" => Err(Error::Provider("llm provider is disabled".into())),
        other => Err(Error::Provider(format!("unknown llm provider: {other}"))),
    }
}

// ============ OpenAI provider ============

/// Chat model backed by the OpenAI `POST /v1/chat/completions` endpoint.
pub struct OpenAiChat {
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::Provider("llm.model required for openai".into()))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(Error::Provider(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;

        Ok(Self {
            model,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Provider("OPENAI_API_KEY not set".into()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenAI API error {status}: {body_text}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Provider("invalid response: missing message content".into()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Mock provider ============

/// Deterministic offline model: answers by acknowledging the question and
/// echoing how much context it was grounded in. Enough for integration tests
/// to assert the full retrieval → prompt → answer path.
pub struct MockChat;

#[async_trait]
impl ChatModel for MockChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let passages = system.matches("[passage").count();
        Ok(format!(
            "Grounded answer to \"{user}\" based on {passages} passage(s)."
        ))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_chat_reports_passage_count() {
        let answer = MockChat
            .complete("context:\n[passage 1] aaa\n[passage 2] bbb", "what is aaa?")
            .await
            .unwrap();
        assert!(answer.contains("2 passage(s)"));
        assert!(answer.contains("what is aaa?"));
    }

    #[test]
    fn disabled_provider_is_an_error() {
        let cfg = LlmConfig::default();
        assert!(create_chat_model(&cfg).is_err());
    }
}
