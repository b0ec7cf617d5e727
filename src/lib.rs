//! Session-aware client for the YandexGPT foundation-models API.
//!
//! The client authenticates with a service-account key (JWT exchanged for an
//! IAM token), keeps per-session conversation history in Redis, and answers
//! prompts through either the direct completion endpoint or the
//! deferred-operation one.
//!
//! ```no_run
//! use yagpt::{ServiceAccountKey, YaGptClient, YaGptConfig};
//!
//! # async fn run() -> yagpt::Result<()> {
//! let raw = std::fs::read_to_string("key.json").expect("readable key file");
//! let key = ServiceAccountKey::from_json(&raw)?;
//! let config = YaGptConfig::new(
//!     key,
//!     "b1g-folder-id",
//!     "You are a concise support assistant.",
//!     "redis://127.0.0.1:6379",
//! );
//!
//! let client = YaGptClient::new(config)?;
//! client.initialize().await?;
//!
//! let answer = client.get_answer("How do I reset my password?", "user-42").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod prompt;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use auth::{IamTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::{YaGptClient, YaGptClientBuilder};
pub use completion::{Completion, CompletionTransport, DeferredCompletion, SyncCompletion};
pub use config::{ServiceAccountKey, YaGptConfig};
pub use context::{ContextMessage, ContextWindow};
pub use error::{Error, Result};
pub use prompt::PromptCleaner;
pub use store::{MemoryStore, RedisStore, SessionStore};
pub use tokenizer::{Tokenizer, YandexTokenizer};
pub use types::{Message, Role};
