//! Request, response and error types shared by every backend

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Why a request to the model failed
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The provider asked us to slow down
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit { retry_after: Option<Duration> },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Connection failures and 5xx responses
    #[error("network error: {message}")]
    Network { message: String },

    /// The response body was not a usable completion
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Client-side problems: bad request, bad client setup
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl BackendError {
    /// Timeouts, rate limits and network failures may succeed on a retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout { .. }
                | BackendError::RateLimit { .. }
                | BackendError::Network { .. }
        )
    }

    /// Server-supplied delay, only ever set on rate limits
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// A completed chat turn
#[derive(Debug, Clone)]
pub struct BackendResponse {
    /// Assistant message content, unparsed
    pub text: String,
    pub backend: String,
    /// Model the provider reports having used, which may differ from the one asked for
    pub model: Option<String>,
    pub duration: Duration,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl BackendResponse {
    pub fn new(text: String, backend: String, duration: Duration) -> Self {
        Self {
            text,
            backend,
            model: None,
            duration,
            usage: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// One chat turn: an optional system instruction and one user message
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

impl BackendRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Something that can answer a chat turn
#[async_trait]
pub trait BackendExecutor: Send + Sync {
    async fn execute(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError>;

    /// Short name for logs
    fn name(&self) -> &str;
}
