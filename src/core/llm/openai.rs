//! OpenAI-Compatible Completion Client
//!
//! Talks to any `/chat/completions` endpoint that follows the OpenAI wire
//! format (OpenAI, OpenRouter, LiteLLM, local gateways).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::client::CompletionClient;
use super::error::{LLMError, Result};
use super::types::{CompletionRequest, CompletionResponse, ResponseFormat, TokenUsage};
use crate::config::LlmConfig;

/// Default retry-after when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Completion client for OpenAI-compatible APIs
pub struct OpenAICompatibleClient {
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
    client: Client,
}

impl OpenAICompatibleClient {
    pub fn new(
        api_key: String,
        model: String,
        max_tokens: u32,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key,
            model,
            max_tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build a client from configuration, reading the key from the environment.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| LLMError::NotConfigured(format!("{} is not set", config.api_key_env)))?;

        Self::new(
            api_key,
            config.model.clone(),
            config.max_tokens,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.temperature,
        });

        if request.response_format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    fn model(&self) -> String {
        self.model.clone()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let latency = start.elapsed().as_millis() as u64;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(LLMError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = resp.text().await.unwrap_or_default();
            return Err(LLMError::AuthError {
                status: status.as_u16(),
                message: text,
            });
        }

        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(LLMError::Timeout);
        }

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LLMError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        let json: serde_json::Value = resp.json().await?;

        let choice = json["choices"].as_array().and_then(|arr| arr.first());

        let content = choice
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| LLMError::InvalidResponse("Missing content".to_string()))?
            .to_string();

        let usage = json["usage"].as_object().map(|u| TokenUsage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        let finish_reason = choice
            .and_then(|c| c["finish_reason"].as_str())
            .map(|s| s.to_string());

        tracing::debug!(model = %self.model, latency_ms = latency, "Completion received");

        Ok(CompletionResponse {
            content,
            model: json["model"].as_str().unwrap_or(&self.model).to_string(),
            usage,
            finish_reason,
            latency_ms: latency,
        })
    }
}
