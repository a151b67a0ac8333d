//! Client for an OpenAI-compatible chat-completion backend.

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// A chat-completion backend: fixed instructions plus table context plus a
/// question in, free-text answer out. The orchestrator depends only on this
/// trait, so tests can substitute a stub.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, context: &str, question: &str)
        -> Result<String>;
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            temperature: config.temperature,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, system_prompt: &str, context: &str, question: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": format!("{}\n\nQUESTION: {}", context, question)},
            ],
        })
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String> {
        let body = self.request_body(system_prompt, context, question);

        debug!("Sending chat completion request to {}", self.base_url);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Backend(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Backend(format!(
                "LLM API returned {}: {}",
                status, detail
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            AssistantError::Backend(format!("Failed to parse LLM response: {}", e))
        })?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AssistantError::Backend("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};

    fn test_client() -> LlmClient {
        LlmClient::new(LlmConfig {
            api_key: "test-key".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.9,
        })
    }

    #[test]
    fn test_request_body_shape() {
        let body = test_client().request_body("sys", "TABLE: orders", "how many rows?");

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert!((body["temperature"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["role"], "user");

        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("TABLE: orders"));
        assert!(user.contains("how many rows?"));
    }
}
