//! Direct (blocking-style) completion transport.

use async_trait::async_trait;

use super::{
    http_client, request_error, status_error, Completion, CompletionBody, CompletionOptions,
    CompletionResult, CompletionTransport,
};
use crate::config::YaGptConfig;
use crate::error::Result;
use crate::types::Message;

/// Transport posting to the direct completion endpoint.
///
/// The call returns once the model has generated the full answer.
pub struct SyncCompletion {
    http: reqwest::Client,
    url: String,
    model_uri: String,
    options: CompletionOptions,
}

impl SyncCompletion {
    /// Create the transport from the client configuration.
    pub fn new(config: &YaGptConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            url: format!("{}/completion", config.llm_endpoint),
            model_uri: config.model_uri(),
            options: CompletionOptions::from_config(config),
        })
    }
}

#[async_trait]
impl CompletionTransport for SyncCompletion {
    fn name(&self) -> &str {
        "sync"
    }

    async fn complete(&self, messages: &[Message], iam_token: &str) -> Result<Completion> {
        let body = CompletionBody {
            model_uri: &self.model_uri,
            options: self.options.clone(),
            messages,
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(iam_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let result: CompletionResult = response.json().await.map_err(|e| {
            crate::error::Error::upstream(format!("failed to decode completion response: {e}"))
        })?;

        result.into_completion()
    }
}
