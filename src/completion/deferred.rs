//! Deferred-operation completion transport.
//!
//! The request is queued by the provider and answered with an operation id;
//! the result is then polled from the operations endpoint until `done`,
//! bounded by the configured deadline.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    http_client, request_error, status_error, Completion, CompletionBody, CompletionOptions,
    CompletionResult, CompletionTransport,
};
use crate::config::YaGptConfig;
use crate::error::{Error, Result};
use crate::types::Message;

#[derive(Debug, Deserialize)]
struct Operation {
    id: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<CompletionResult>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Transport going through the deferred completion API.
pub struct DeferredCompletion {
    http: reqwest::Client,
    start_url: String,
    operation_endpoint: String,
    model_uri: String,
    options: CompletionOptions,
    poll_interval: Duration,
    deadline: Duration,
}

impl DeferredCompletion {
    /// Create the transport from the client configuration.
    pub fn new(config: &YaGptConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            start_url: format!("{}/completionAsync", config.llm_endpoint),
            operation_endpoint: config.operation_endpoint.clone(),
            model_uri: config.model_uri(),
            options: CompletionOptions::from_config(config),
            poll_interval: config.poll_interval,
            deadline: config.async_timeout,
        })
    }

    fn resolve(operation: Operation) -> Result<Completion> {
        if let Some(error) = operation.error {
            return Err(Error::Upstream {
                status: None,
                message: format!("operation {} failed ({}): {}", operation.id, error.code, error.message),
            });
        }
        operation
            .response
            .ok_or_else(|| {
                Error::upstream(format!("operation {} finished without a response", operation.id))
            })?
            .into_completion()
    }

    async fn poll(&self, operation_id: &str, iam_token: &str) -> Result<Completion> {
        let url = format!("{}/{}", self.operation_endpoint, operation_id);

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .http
                .get(&url)
                .bearer_auth(iam_token)
                .send()
                .await
                .map_err(request_error)?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let operation: Operation = response.json().await.map_err(|e| {
                Error::upstream(format!("failed to decode operation status: {e}"))
            })?;

            tracing::debug!(
                operation_id = %operation.id,
                done = operation.done,
                "polled deferred completion"
            );

            if operation.done {
                return Self::resolve(operation);
            }
        }
    }
}

#[async_trait]
impl CompletionTransport for DeferredCompletion {
    fn name(&self) -> &str {
        "deferred"
    }

    async fn complete(&self, messages: &[Message], iam_token: &str) -> Result<Completion> {
        let body = CompletionBody {
            model_uri: &self.model_uri,
            options: self.options.clone(),
            messages,
        };

        let response = self
            .http
            .post(&self.start_url)
            .bearer_auth(iam_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let operation: Operation = response.json().await.map_err(|e| {
            Error::upstream(format!("failed to decode operation response: {e}"))
        })?;

        if operation.done {
            return Self::resolve(operation);
        }

        let operation_id = operation.id.clone();
        tokio::time::timeout(self.deadline, self.poll(&operation_id, iam_token))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "deferred completion did not finish within {:?} (operation_id: {operation_id})",
                    self.deadline
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_with_error_resolves_to_upstream() {
        let operation: Operation = serde_json::from_str(
            r#"{"id": "op-1", "done": true, "error": {"code": 8, "message": "quota exhausted"}}"#,
        )
        .unwrap();
        let err = DeferredCompletion::resolve(operation).unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[test]
    fn done_operation_without_response_is_upstream_error() {
        let operation: Operation =
            serde_json::from_str(r#"{"id": "op-2", "done": true}"#).unwrap();
        assert!(DeferredCompletion::resolve(operation).is_err());
    }

    #[test]
    fn done_operation_with_response_resolves() {
        let operation: Operation = serde_json::from_str(
            r#"{
                "id": "op-3",
                "done": true,
                "response": {
                    "alternatives": [{"message": {"role": "assistant", "text": "queued answer"}}],
                    "usage": {"completionTokens": "4"}
                }
            }"#,
        )
        .unwrap();
        let completion = DeferredCompletion::resolve(operation).unwrap();
        assert_eq!(completion.text, "queued answer");
        assert_eq!(completion.completion_tokens, 4);
    }

    #[test]
    fn pending_operation_parses() {
        let operation: Operation = serde_json::from_str(r#"{"id": "op-4"}"#).unwrap();
        assert!(!operation.done);
        assert!(operation.response.is_none());
        assert!(operation.error.is_none());
    }
}
