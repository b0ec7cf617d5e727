//! Token counting via the foundation-models tokenizer endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Message;

/// Counts the token cost of text before it is sent to the model.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Token count of a plain text fragment.
    async fn count_text(&self, text: &str, iam_token: &str) -> Result<u32>;

    /// Token count of a full message list, completion options included.
    async fn count_messages(&self, messages: &[Message], iam_token: &str) -> Result<u32>;
}

#[derive(Serialize)]
struct TokenizeBody<'a> {
    #[serde(rename = "modelUri")]
    model_uri: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct TokenizeCompletionBody<'a> {
    #[serde(rename = "modelUri")]
    model_uri: &'a str,
    #[serde(rename = "completionOptions")]
    options: TokenizeOptions,
    messages: &'a [Message],
}

#[derive(Serialize)]
struct TokenizeOptions {
    stream: bool,
    #[serde(rename = "maxTokens")]
    max_tokens: u32,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    #[serde(default)]
    tokens: Vec<serde_json::Value>,
}

/// Tokenizer backed by the Yandex tokenizer endpoints.
pub struct YandexTokenizer {
    http: reqwest::Client,
    tokenize_url: String,
    tokenize_completion_url: String,
    model_uri: String,
    max_tokens: u32,
}

impl YandexTokenizer {
    /// Create a tokenizer for a model.
    pub fn new(
        http: reqwest::Client,
        llm_endpoint: &str,
        model_uri: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            http,
            tokenize_url: format!("{llm_endpoint}/tokenize"),
            tokenize_completion_url: format!("{llm_endpoint}/tokenizeCompletion"),
            model_uri: model_uri.into(),
            max_tokens,
        }
    }

    async fn request<B: Serialize>(&self, url: &str, body: &B, iam_token: &str) -> Result<u32> {
        let response = self
            .http
            .post(url)
            .bearer_auth(iam_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Tokenization(format!("tokenizer request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tokenization(format!(
                "tokenizer rejected the request ({status}): {body}"
            )));
        }

        let parsed: TokenizeResponse = response
            .json()
            .await
            .map_err(|e| Error::Tokenization(format!("failed to decode tokenizer response: {e}")))?;

        let count = parsed.tokens.len() as u32;
        tracing::debug!(token_count = count, "text tokenized");
        Ok(count)
    }
}

#[async_trait]
impl Tokenizer for YandexTokenizer {
    async fn count_text(&self, text: &str, iam_token: &str) -> Result<u32> {
        let body = TokenizeBody {
            model_uri: &self.model_uri,
            text,
        };
        self.request(&self.tokenize_url, &body, iam_token).await
    }

    async fn count_messages(&self, messages: &[Message], iam_token: &str) -> Result<u32> {
        let body = TokenizeCompletionBody {
            model_uri: &self.model_uri,
            options: TokenizeOptions {
                stream: false,
                max_tokens: self.max_tokens,
            },
            messages,
        };
        self.request(&self.tokenize_completion_url, &body, iam_token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_body_shape() {
        let body = TokenizeBody {
            model_uri: "gpt://folder/yandexgpt-lite/latest",
            text: "hello",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["modelUri"], "gpt://folder/yandexgpt-lite/latest");
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn tokenize_completion_body_shape() {
        let messages = vec![Message::user("hi")];
        let body = TokenizeCompletionBody {
            model_uri: "gpt://folder/yandexgpt-lite/latest",
            options: TokenizeOptions {
                stream: false,
                max_tokens: 7500,
            },
            messages: &messages,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["completionOptions"]["maxTokens"], 7500);
        assert_eq!(json["completionOptions"]["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn tokenize_response_counts_entries() {
        let parsed: TokenizeResponse =
            serde_json::from_str(r#"{"tokens":[{"id":"1"},{"id":"2"},{"id":"3"}]}"#).unwrap();
        assert_eq!(parsed.tokens.len(), 3);

        let parsed: TokenizeResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.tokens.is_empty());
    }
}
