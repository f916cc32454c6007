//! Backend execution module
//!
//! Talks to the model that proposes patches. The repair loop only sees the
//! [`BackendExecutor`] trait; [`HttpBackend`] speaks the OpenAI-compatible
//! chat completions protocol and [`RetryExecutor`] wraps it with backoff for
//! transient failures.
//!
//! # Example
//!
//! ```ignore
//! use mend::backend_executor::{create_executor, BackendExecutor, BackendRequest};
//!
//! let backend = create_executor("openai", &config.backend)?;
//! let request = BackendRequest::new("Fix this program").with_system_prompt("You fix code");
//! let response = backend.execute(&request).await?;
//!
//! println!("Output: {}", response.text);
//! ```

mod http_backend;
mod output_parser;
mod retry;
mod types;

pub use http_backend::HttpBackend;
pub use output_parser::extract_json;
pub use retry::{RetryExecutor, RetryPolicy, with_retry};
#[allow(unused_imports)]
pub use types::{BackendError, BackendExecutor, BackendRequest, BackendResponse, TokenUsage};

use crate::config::BackendConfig;

/// Create the HTTP executor for a backend config, wrapped with its retry policy
pub fn create_executor(
    name: &str,
    config: &BackendConfig,
) -> Result<RetryExecutor<HttpBackend>, BackendError> {
    let executor = HttpBackend::from_config(name, config)?;
    Ok(with_retry(executor, RetryPolicy::from_config(config)))
}
