//! Completion transports for the foundation-models API.
//!
//! One request/response cycle per call, behind a single trait with two
//! implementations selected at client construction: [`SyncCompletion`] posts
//! to the direct completion endpoint, [`DeferredCompletion`] starts an
//! operation and polls for its result.

mod deferred;
mod sync;

pub use deferred::DeferredCompletion;
pub use sync::SyncCompletion;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::YaGptConfig;
use crate::error::{Error, Result};
use crate::types::Message;

/// A generated answer with its usage accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated answer text.
    pub text: String,
    /// Token cost of the answer, from the provider's usage counters.
    pub completion_tokens: u32,
}

/// Transport for a single completion request.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Transport name (e.g. "sync", "deferred").
    fn name(&self) -> &str;

    /// Send the message list and return the generated answer.
    async fn complete(&self, messages: &[Message], iam_token: &str) -> Result<Completion>;
}

/// Build the HTTP client shared by the completion transports.
///
/// Carries the folder id header on every request, per the API contract.
pub(crate) fn http_client(config: &YaGptConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        "x-folder-id",
        HeaderValue::from_str(&config.folder_id)
            .map_err(|e| Error::Config(format!("folder id is not a valid header value: {e}")))?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CompletionBody<'a> {
    #[serde(rename = "modelUri")]
    pub model_uri: &'a str,
    #[serde(rename = "completionOptions")]
    pub options: CompletionOptions,
    pub messages: &'a [Message],
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CompletionOptions {
    pub stream: bool,
    pub temperature: f64,
    /// The API expects the limit as a string.
    #[serde(rename = "maxTokens")]
    pub max_tokens: String,
}

impl CompletionOptions {
    pub(crate) fn from_config(config: &YaGptConfig) -> Self {
        Self {
            stream: false,
            temperature: config.temperature,
            max_tokens: config.max_reply_tokens.to_string(),
        }
    }
}

/// Usage counters arrive as either JSON numbers or decimal strings.
fn count_from_json<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: Message,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(
        rename = "completionTokens",
        deserialize_with = "count_from_json",
        default
    )]
    completion_tokens: u32,
}

impl CompletionResult {
    /// Extract the first alternative as the answer.
    pub(crate) fn into_completion(mut self) -> Result<Completion> {
        if self.alternatives.is_empty() {
            return Err(Error::upstream("completion response has no alternatives"));
        }
        let alternative = self.alternatives.remove(0);
        Ok(Completion {
            text: alternative.message.text,
            completion_tokens: self.usage.completion_tokens,
        })
    }
}

/// Map a transport-level reqwest failure onto the error taxonomy.
pub(crate) fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("completion request timed out: {e}"))
    } else {
        Error::upstream(format!("completion request failed: {e}"))
    }
}

/// Turn a non-success HTTP response into an upstream error.
pub(crate) async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::Upstream {
        status: Some(status),
        message: body,
    }
}
