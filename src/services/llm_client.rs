use crate::errors::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Single call the core needs from any LLM backend: a completion given
/// a prompt, token budget and temperature.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize, Clone)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

pub struct OpenAiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default(),
        }
    }

    async fn call_once(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, AppError> {
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!("OpenAI returned HTTP {status}: {body}")));
        }

        response.json::<OpenAiResponse>().await.map_err(AppError::from)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    /// Retries 429s with `10s * (attempt+1)` backoff up to 3 attempts,
    /// per the verification protocol's batch-call rule.
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String, AppError> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![OpenAiMessage { role: "user".to_string(), content: prompt.to_string() }],
            max_tokens,
            temperature,
        };

        let max_attempts = 3;
        for attempt in 0..max_attempts {
            match self.call_once(&request).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| AppError::External("LLM response had no choices".to_string()))?;
                    return Ok(content);
                }
                Err(AppError::RateLimited) if attempt + 1 < max_attempts => {
                    let delay = Duration::from_secs(10 * (attempt as u64 + 1));
                    warn!("LLM rate limited, retrying in {delay:?} (attempt {}/{max_attempts})", attempt + 1);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::RateLimited)
    }
}

/// Test double returning a fixed response, letting `SentimentEngine`
/// tests exercise the verification protocol without network access.
pub struct FixedLlmClient {
    pub response: String,
}

#[async_trait]
impl LlmClient for FixedLlmClient {
    async fn complete(&self, _prompt: &str, _max_tokens: usize, _temperature: f32) -> Result<String, AppError> {
        info!("FixedLlmClient returning canned response");
        Ok(self.response.clone())
    }
}
