//! SQL generation collaborator
//!
//! The pipeline only needs "prompt in, text out". `OpenAiGenerator` talks to any
//! OpenAI-compatible chat-completions endpoint; `StaticGenerator` returns canned
//! replies for offline runs and tests.

use crate::config::LlmConfig;
use crate::error::{Nl2SqlError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SYSTEM_PROMPT: &str = "You are a SQL expert. Generate only valid SQLite queries \
     without any explanations or markdown formatting.";

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Reply text for a composed prompt; `question` is the raw user question
    async fn generate(&self, prompt: &str, question: &str) -> Result<String>;
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAiGenerator {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Nl2SqlError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            config,
        })
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Nl2SqlError::Generation(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Nl2SqlError::Generation(format!("LLM API returned {}: {}", status, text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Nl2SqlError::Generation(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Nl2SqlError::Generation("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl SqlGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str, _question: &str) -> Result<String> {
        let request_id = Uuid::new_v4();
        info!(
            "[{}] Requesting SQL from {} ({} prompt chars)",
            request_id,
            self.config.model,
            prompt.chars().count()
        );
        let reply = time_bounded(self.config.timeout, self.call_llm(prompt)).await?;
        debug!("[{}] Generator reply: {}", request_id, reply);
        Ok(reply)
    }
}

/// Run a generation future, turning an elapsed deadline into `Generation`
pub async fn time_bounded<F>(limit: Duration, call: F) -> Result<String>
where
    F: Future<Output = Result<String>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Nl2SqlError::Generation(format!("generation timed out after {:?}", limit)))?
}

/// Canned replies, optionally keyed by question
#[derive(Debug, Clone, Default)]
pub struct StaticGenerator {
    default_reply: Option<String>,
    replies: HashMap<String, String>,
}

impl StaticGenerator {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            default_reply: Some(default_reply.into()),
            replies: HashMap::new(),
        }
    }

    pub fn with_reply(mut self, question: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies.insert(question.into(), reply.into());
        self
    }
}

#[async_trait]
impl SqlGenerator for StaticGenerator {
    async fn generate(&self, _prompt: &str, question: &str) -> Result<String> {
        self.replies
            .get(question)
            .or(self.default_reply.as_ref())
            .cloned()
            .ok_or_else(|| Nl2SqlError::Generation(format!("no canned reply for '{}'", question)))
    }
}
