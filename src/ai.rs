use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned no content")]
    Empty,

    #[error("CLI provider failed: {0}")]
    Cli(String),
}

// --- Provider trait ---

#[async_trait]
pub trait AIProvider: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    ClaudeCode,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub short_name: String,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    let (provider, model_id, short_name) = match name {
        // `claude` CLI, no API key needed
        "claude-sonnet" | "sonnet" => (ProviderKind::ClaudeCode, "claude-sonnet-4-5-20250929", "claude-sonnet"),
        "claude-haiku" | "haiku" => (ProviderKind::ClaudeCode, "claude-haiku-4-5-20251001", "claude-haiku"),
        // ANTHROPIC_API_KEY
        "api-sonnet" => (ProviderKind::Anthropic, "claude-sonnet-4-5-20250929", "api-sonnet"),
        "api-haiku" => (ProviderKind::Anthropic, "claude-haiku-4-5-20251001", "api-haiku"),
        // OPENAI_API_KEY
        "gpt-4o" => (ProviderKind::OpenAI, "gpt-4o", "gpt-4o"),
        "gpt-4o-mini" | "mini" => (ProviderKind::OpenAI, "gpt-4o-mini", "gpt-4o-mini"),
        _ => {
            return Err(anyhow!(
                "Unknown model '{}'. Available: claude-sonnet (default), claude-haiku, \
                 api-sonnet, api-haiku, gpt-4o, gpt-4o-mini",
                name
            ));
        }
    };
    Ok(ModelSpec {
        provider,
        model_id: model_id.to_string(),
        short_name: short_name.to_string(),
    })
}

pub fn create_provider(model: &ModelSpec) -> Result<Box<dyn AIProvider>> {
    match model.provider {
        ProviderKind::ClaudeCode => Ok(Box::new(ClaudeCodeProvider::new(model.model_id.clone())?)),
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(model.model_id.clone())?)),
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::new(model.model_id.clone())?)),
    }
}

/// Wait requested by a 429 response, from `retry-after-ms` or `retry-after` (seconds).
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    if let Some(ms) = header("retry-after-ms") {
        return Some(Duration::from_secs_f64(ms / 1000.0));
    }
    header("retry-after").map(Duration::from_secs_f64)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            retry_after: retry_after(response.headers()),
        });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set. Set it with: export ANTHROPIC_API_KEY=your-key-here")?;
        Ok(Self {
            api_key,
            model_id,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl AIProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: AnthropicResponse = response.json().await?;

        body.content
            .into_iter()
            .map(|block| block.text)
            .find(|text| !text.trim().is_empty())
            .ok_or(ProviderError::Empty)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Claude Code provider (shells out to `claude` CLI) ---

#[derive(Debug)]
pub struct ClaudeCodeProvider {
    model_id: String,
}

impl ClaudeCodeProvider {
    pub fn new(model_id: String) -> Result<Self> {
        std::process::Command::new("claude")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .context("'claude' CLI not found. Install it or use api-sonnet/gpt-4o instead.")?;
        Ok(Self { model_id })
    }
}

#[async_trait]
impl AIProvider for ClaudeCodeProvider {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, ProviderError> {
        let output = tokio::process::Command::new("claude")
            .arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(&self.model_id)
            .output()
            .await
            .map_err(|e| ProviderError::Cli(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.to_lowercase().contains("rate limit") {
                return Err(ProviderError::RateLimited { retry_after: None });
            }
            return Err(ProviderError::Cli(stderr));
        }

        let response = String::from_utf8_lossy(&output.stdout).to_string();
        if response.trim().is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set. Set it with: export OPENAI_API_KEY=your-key-here")?;
        Ok(Self {
            api_key,
            model_id,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl AIProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError> {
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: OpenAIResponse = response.json().await?;

        body.choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .find(|text| !text.trim().is_empty())
            .ok_or(ProviderError::Empty)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
