use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_MAX_TOKENS: u32 = 900;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Abstraction over the completion endpoint for testability.
///
/// Implementations may block; callers on the async path run them on the
/// blocking pool.
pub trait CompletionClient: Send + Sync {
    /// Send the request and return the first choice's message content.
    fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<String>;
}

/// Extract `choices[0].message.content` from a raw response body.
pub fn parse_completion(body: &str) -> Result<String> {
    let invalid = || Error::Api("Invalid response from AI API".to_string());
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|_| invalid())?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(invalid)
}

/// Format a non-success response the way users see it.
pub fn api_error(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| "Unknown error".to_string());
    Error::Api(format!("API Error: {status} - {message}"))
}

/// Chat-completion client over HTTPS with retry on transient failures.
pub struct HttpCompletionClient {
    api_url: String,
    initial_backoff: Duration,
}

impl HttpCompletionClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Delay before the first retry; doubled for each later one.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<String> {
        let body = serde_json::to_value(request)
            .map_err(|e| Error::Api(format!("failed to encode request: {e}")))?;

        let mut backoff = self.initial_backoff;
        for attempt in 1..=MAX_RETRIES {
            match ureq::post(&self.api_url)
                .set("Authorization", &format!("Bearer {api_key}"))
                .set("Content-Type", "application/json")
                .send_json(&body)
            {
                Ok(response) => {
                    let text = response
                        .into_string()
                        .map_err(|e| Error::Api(format!("failed to read API response: {e}")))?;
                    debug!(bytes = text.len(), "received completion");
                    return parse_completion(&text);
                }
                Err(ref e) if attempt < MAX_RETRIES && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying completion API after transient error"
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(ureq::Error::Status(code, response)) => {
                    let text = response.into_string().unwrap_or_default();
                    return Err(api_error(code, &text));
                }
                Err(ureq::Error::Transport(t)) => {
                    return Err(Error::Api(format!(
                        "Network error. Please check your internet connection. ({t})"
                    )));
                }
            }
        }
        unreachable!()
    }
}

/// Only retry rate-limits (429), server errors (5xx), and transport/network errors.
fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}
