//! Chat-completion client used for answer synthesis and guide generation.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

/// Prompt envelope shared by all completion calls.
pub struct CompletionRequest<'a> {
    /// System prompt establishing the assistant persona.
    pub system: &'a str,
    /// User prompt carrying question and context.
    pub user: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: usize,
}

/// Trait implemented by concrete LLM providers.
pub trait LlmProvider: Send + Sync {
    /// Produces a completion for the given prompts.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Blocking client for OpenAI-compatible chat-completions endpoints.
///
/// The default deployment points this at DeepSeek, whose API speaks the same
/// wire format.
pub struct ChatCompletionsProvider {
    api_key: String,
    endpoint: String,
    model: String,
    client: Client,
}

impl ChatCompletionsProvider {
    /// Builds a new chat-completions client.
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing chat API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing chat model name");
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build chat HTTP client")?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            api_key,
            endpoint,
            model,
            client,
        })
    }
}

impl LlmProvider for ChatCompletionsProvider {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid chat API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .context("failed to call chat completions")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("chat endpoint returned {}: {}", status, text);
        }
        let parsed: ChatResponse = resp.json().context("failed to parse chat response")?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if answer.is_empty() {
            bail!("chat response missing assistant content");
        }
        Ok(answer)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
