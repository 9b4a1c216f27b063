use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use roofline_core::config::{LlmConfig, LlmProvider};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Single-turn completions against Ollama (`/api/generate`) or an
/// OpenAI-compatible server (`/v1/chat/completions`).
pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(url)) => url.trim_end_matches('/').to_string(),
            (LlmProvider::OpenAi, None) => DEFAULT_OPENAI_BASE_URL.to_string(),
            (LlmProvider::Ollama, None) => bail!("llm.base_url is required for ollama"),
        };
        if config.provider == LlmProvider::OpenAi && config.api_key.is_none() {
            bail!("llm.api_key is required for openai");
        }

        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build LLM http client")?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
            LlmProvider::OpenAi => format!("{}/v1/chat/completions", self.base_url),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let endpoint = self.endpoint();
        let mut request = self
            .http
            .post(&endpoint)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(&request_body(self.provider, &self.model, prompt));
        if let Some(api_key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()));
        }

        tracing::debug!(
            event_name = "system.llm.request",
            endpoint = %endpoint,
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending completion request"
        );

        let response = request
            .send()
            .await
            .with_context(|| format!("LLM request to {endpoint} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("LLM endpoint {endpoint} returned {status}: {body}");
        }

        let payload: Value =
            response.json().await.context("LLM response body is not valid JSON")?;
        extract_completion(self.provider, &payload)
    }
}

fn request_body(provider: LlmProvider, model: &str, prompt: &str) -> Value {
    match provider {
        LlmProvider::Ollama => json!({ "model": model, "prompt": prompt, "stream": false }),
        LlmProvider::OpenAi => json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        }),
    }
}

fn extract_completion(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::Ollama => payload.get("response").and_then(Value::as_str),
        LlmProvider::OpenAi => payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
    };

    text.map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("LLM response carried no completion text"))
}
