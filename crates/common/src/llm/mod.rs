//! Text-completion service abstraction
//!
//! The pipeline treats the model as an opaque `prompt -> text` function and
//! never trusts its output: callers clean or strictly parse whatever comes back.

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Synchronous (non-streaming) completion contract
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion for `prompt` and return the raw text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Call `client` and record latency/outcome metrics.
pub async fn complete_timed(client: &dyn CompletionClient, prompt: &str) -> Result<String> {
    let start = Instant::now();
    let result = client.complete(prompt).await;
    metrics::record_completion(
        start.elapsed().as_secs_f64(),
        client.model_name(),
        result.is_ok(),
    );
    result
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// OpenAI-compatible chat completions client
pub struct OpenAIChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatClient {
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::CompletionError {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionError {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::CompletionError {
                message: format!("Failed to parse LLM response: {}", e),
            })?;

        chat_response.choices.into_iter().next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| AppError::CompletionError {
                message: "Empty response from LLM".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Ollama client (`POST /api/generate`, `stream: false`)
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    context_window: u32,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            context_window: config.context_window,
        })
    }
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_ctx: self.context_window,
            },
        };

        let response = self.client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::CompletionError {
                message: format!("Ollama request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionError {
                message: format!("Ollama error {}: {}", status, body),
            });
        }

        let generated: GenerateResponse = response.json().await
            .map_err(|e| AppError::CompletionError {
                message: format!("Failed to parse Ollama response: {}", e),
            })?;

        Ok(generated.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scripted completion client for tests and dry runs.
///
/// Returns the same reply for every prompt and keeps the prompts it saw.
pub struct MockCompletion {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletion {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a completion client based on configuration
pub fn create_completion_client(config: &LlmConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIChatClient::new(key, config)?))
        }
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        "mock" => Ok(Arc::new(MockCompletion::new(
            "The knowledge base does not contain a clear answer to this question.",
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}
