//! OpenAI-compatible chat completion backend

use super::types::{BackendError, BackendExecutor, BackendRequest, BackendResponse, TokenUsage};
use crate::config::BackendConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Executor for HTTP chat completion APIs
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Backend name
    name: String,

    /// Base URL for the API
    base_url: String,

    /// API key (if required)
    api_key: Option<String>,

    /// Model ID to use
    model: String,

    /// Whole-request timeout
    timeout: Duration,

    /// HTTP client
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl HttpBackend {
    /// Create a new HTTP backend from config.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env`; an explicit `api_key` in the config wins.
    pub fn from_config(
        name: impl Into<String>,
        config: &BackendConfig,
    ) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(config.timeout);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::config(format!("failed to build HTTP client: {}", e)))?;

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .filter(|k| !k.is_empty());

        Ok(Self {
            name: name.into(),
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            timeout,
            client,
        })
    }

    /// Build the chat completion URL
    fn chat_completion_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    /// Map HTTP status to BackendError
    fn map_http_error(
        &self,
        status: reqwest::StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> BackendError {
        match status.as_u16() {
            401 | 403 => BackendError::auth(format!("HTTP {}: {}", status, body)),
            429 => BackendError::rate_limit(
                retry_after_header(headers).or_else(|| retry_after_body(body)),
            ),
            408 | 504 => BackendError::timeout(self.timeout),
            400..=499 => BackendError::config(format!("HTTP {}: {}", status, body)),
            500..=599 => BackendError::network(format!("HTTP {}: {}", status, body)),
            _ => BackendError::network(format!("unexpected HTTP {}: {}", status, body)),
        }
    }
}

/// Delay from a `Retry-After: <seconds>` header. HTTP-date values are ignored.
fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    seconds_to_duration(value.trim().parse().ok()?)
}

/// Look for a `retry_after` field (seconds) in an error body
fn retry_after_body(body: &str) -> Option<Duration> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    seconds_to_duration(json.get("retry_after")?.as_f64()?)
}

/// Server-supplied delays may be negative, NaN or huge
fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

#[async_trait]
impl BackendExecutor for HttpBackend {
    async fn execute(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if let Some(ref system) = request.system_prompt {
            messages.push(Message {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(Message {
            role: "user",
            content: request.prompt.clone(),
        });

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
        };

        let mut http_request = self.client.post(self.chat_completion_url()).json(&body);
        if let Some(ref key) = self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        tracing::debug!(
            backend = %self.name,
            model = %self.model,
            "sending chat completion request"
        );

        let result = tokio::time::timeout(self.timeout, http_request.send()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(response)) => {
                let status = response.status();

                if !status.is_success() {
                    let headers = response.headers().clone();
                    let body = response.text().await.unwrap_or_default();
                    return Err(self.map_http_error(status, &headers, &body));
                }

                let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
                    BackendError::parse(format!("failed to parse response: {}", e))
                })?;

                let text = completion
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| BackendError::parse("response contained no message content"))?;

                let mut backend_response = BackendResponse::new(text, self.name.clone(), elapsed);

                if let Some(model) = completion.model {
                    backend_response = backend_response.with_model(model);
                }

                if let Some(usage) = completion.usage {
                    backend_response = backend_response.with_usage(TokenUsage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                    });
                }

                Ok(backend_response)
            }
            Ok(Err(e)) => {
                if e.is_timeout() {
                    Err(BackendError::timeout(elapsed))
                } else if e.is_connect() {
                    Err(BackendError::network(format!("connection failed: {}", e)))
                } else {
                    Err(BackendError::network(format!("request failed: {}", e)))
                }
            }
            Err(_) => Err(BackendError::timeout(elapsed)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
