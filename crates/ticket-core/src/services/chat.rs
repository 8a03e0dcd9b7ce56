//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServiceError, TicketError};
use crate::models::config::{FallbackConfig, RetryPolicy};
use crate::ticket::StructuredExtractionService;

use super::{read_secret, transport_error, with_retry};

const SERVICE: &str = "chat completion";

/// Structured-extraction service backed by a chat-completions endpoint.
pub struct ChatCompletionService {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_transcript_chars: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionService {
    /// Build from configuration; the API key is read from the configured
    /// environment variable.
    pub fn from_config(config: &FallbackConfig, retry: RetryPolicy) -> Result<Self, TicketError> {
        let api_key = read_secret(&config.api_key_env)?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TicketError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_transcript_chars: config.max_transcript_chars,
            timeout,
            retry,
        })
    }

    fn send(&self, body: &ChatRequest<'_>) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| transport_error(SERVICE, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ServiceError::Unavailable {
                    service: SERVICE,
                    attempts: 1,
                    reason: format!("HTTP {status}"),
                }
            } else {
                ServiceError::Rejected {
                    service: SERVICE,
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let reply: ChatResponse = response.json().map_err(|e| ServiceError::Rejected {
            service: SERVICE,
            status: status.as_u16(),
            body: format!("unreadable reply: {e}"),
        })?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::Rejected {
                service: SERVICE,
                status: status.as_u16(),
                body: "reply has no message content".to_string(),
            })
    }
}

impl StructuredExtractionService for ChatCompletionService {
    fn request(&self, instruction: &str, transcript: &str) -> Result<String, ServiceError> {
        let transcript = truncate_chars(transcript, self.max_transcript_chars);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: instruction,
                },
                ChatMessage {
                    role: "user",
                    content: transcript,
                },
            ],
            temperature: self.temperature,
        };

        debug!(model = %self.model, chars = transcript.len(), "Sending chat completion");
        with_retry(&self.retry, SERVICE, || self.send(&body))
    }
}

/// Longest prefix of `text` holding at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
