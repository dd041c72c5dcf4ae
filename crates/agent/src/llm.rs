use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use fieldline_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completion client for the supported backends. The provider only
/// changes the wire shape; callers see one `complete` contract.
pub struct HttpLlmClient {
    provider: LlmProvider,
    http: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl HttpLlmClient {
    /// Returns `None` when the backend is disabled or unusable with the
    /// given settings; the analyzer then runs fallback-only.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => "https://api.openai.com".to_string(),
            (None, LlmProvider::Anthropic) => "https://api.anthropic.com".to_string(),
            (None, LlmProvider::Ollama) => return None,
        };

        let needs_key = matches!(config.provider, LlmProvider::OpenAi | LlmProvider::Anthropic);
        if needs_key && config.api_key.is_none() {
            return None;
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .ok()?;

        Some(Self {
            provider: config.provider,
            http,
            api_key: config.api_key.clone(),
            base_url,
            model: config.model.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("llm api key is not configured"))
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&json!({
                "model": self.model,
                "temperature": 0,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai returned an error status")?;

        let body: Value = response.json().await.context("openai response was not json")?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("openai response had no message content"))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": 512,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic returned an error status")?;

        let body: Value = response.json().await.context("anthropic response was not json")?;
        body["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("anthropic response had no text content"))
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&json!({
                "model": self.model,
                "stream": false,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await
            .context("ollama request failed")?
            .error_for_status()
            .context("ollama returned an error status")?;

        let body: Value = response.json().await.context("ollama response was not json")?;
        body["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("ollama response had no message content"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAi => self.complete_openai(prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
        }
    }
}
