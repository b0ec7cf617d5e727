//! Error types for the YandexGPT client.

use thiserror::Error;

/// Result type alias using the client error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all client operations.
///
/// Callers can match on the variant to decide whether a failure is worth
/// retrying; see [`Error::is_retryable`].
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing construction input. Not retryable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Setup-time failure (identity provider or store unreachable,
    /// credentials rejected). Retryable by calling `initialize` again.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// The client was used before `initialize` succeeded.
    #[error("Client not initialized: call initialize() first")]
    NotInitialized,

    /// Invalid request input (empty prompt or session id, or a prompt
    /// that is empty after sanitation).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-side failure of the completion call.
    #[error("Upstream service error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        /// HTTP status from the provider, if the request got that far.
        status: Option<u16>,
        message: String,
    },

    /// Tokenizer endpoint failure.
    #[error("Tokenization error: {0}")]
    Tokenization(String),

    /// A network call or deferred-operation poll exceeded its deadline.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Session store unreachable or returned corrupted data.
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether the failure class is transient and safe to retry.
    ///
    /// Only idempotent, provider- or network-side failures qualify;
    /// configuration and input errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Initialization(_) | Self::Timeout(_) | Self::Store(_) => true,
            Self::Upstream { status, .. } => match status {
                Some(code) => matches!(*code, 408 | 429) || *code >= 500,
                None => true,
            },
            _ => false,
        }
    }

    /// Check if this is a store-side error.
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Convenience constructor for upstream errors without an HTTP status.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(Error::Initialization("iam down".into()).is_retryable());
        assert!(Error::Timeout("poll".into()).is_retryable());
        assert!(Error::Store("redis gone".into()).is_retryable());
        assert!(Error::Upstream {
            status: Some(429),
            message: "rate limited".into()
        }
        .is_retryable());
        assert!(Error::Upstream {
            status: Some(503),
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(Error::upstream("connection reset").is_retryable());
    }

    #[test]
    fn test_non_retryable_classes() {
        assert!(!Error::Config("missing key".into()).is_retryable());
        assert!(!Error::NotInitialized.is_retryable());
        assert!(!Error::InvalidInput("empty prompt".into()).is_retryable());
        assert!(!Error::Upstream {
            status: Some(400),
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!Error::Upstream {
            status: Some(401),
            message: "auth expired".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_display_includes_status() {
        let err = Error::Upstream {
            status: Some(429),
            message: "too many requests".into(),
        };
        let text = err.to_string();
        assert!(text.contains("429"));
        assert!(text.contains("too many requests"));

        let err = Error::upstream("connection refused");
        assert!(!err.to_string().contains('('));
    }
}
