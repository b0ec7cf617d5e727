//! Session-scoped answer client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::auth::{IamTokenProvider, TokenProvider};
use crate::completion::{CompletionTransport, DeferredCompletion, SyncCompletion};
use crate::config::YaGptConfig;
use crate::context::{ContextMessage, ContextWindow};
use crate::error::{Error, Result};
use crate::prompt::PromptCleaner;
use crate::store::{RedisStore, SessionStore};
use crate::tokenizer::{Tokenizer, YandexTokenizer};
use crate::types::{Message, Role};

/// Map a component failure during setup onto the initialization class.
fn init_error(e: Error) -> Error {
    match e {
        Error::Config(_) | Error::Initialization(_) => e,
        other => Error::Initialization(other.to_string()),
    }
}

/// Client for session-scoped answers from the generative-text service.
///
/// Configuration is fixed at construction. [`YaGptClient::initialize`] must
/// succeed before [`YaGptClient::get_answer`] is usable. The client holds no
/// locks of its own beyond the token cache and is safe to share via `Arc`
/// across tasks; calls for different sessions do not block one another.
pub struct YaGptClient {
    system_message: Message,
    token_provider: Arc<dyn TokenProvider>,
    store: Arc<dyn SessionStore>,
    history: ContextWindow,
    tokenizer: Arc<dyn Tokenizer>,
    transport: Arc<dyn CompletionTransport>,
    cleaner: PromptCleaner,
    initialized: AtomicBool,
}

/// Builder allowing component substitution (custom stores, stub transports).
pub struct YaGptClientBuilder {
    config: YaGptConfig,
    token_provider: Option<Arc<dyn TokenProvider>>,
    store: Option<Arc<dyn SessionStore>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    transport: Option<Arc<dyn CompletionTransport>>,
}

impl YaGptClientBuilder {
    /// Start a builder from a configuration.
    pub fn new(config: YaGptConfig) -> Self {
        Self {
            config,
            token_provider: None,
            store: None,
            tokenizer: None,
            transport: None,
        }
    }

    /// Substitute the token provider.
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Substitute the session store.
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Substitute the tokenizer.
    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Substitute the completion transport.
    pub fn transport(mut self, transport: Arc<dyn CompletionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and assemble the client.
    pub fn build(self) -> Result<YaGptClient> {
        let config = self.config;
        config.validate()?;

        let token_provider: Arc<dyn TokenProvider> = match self.token_provider {
            Some(provider) => provider,
            None => Arc::new(IamTokenProvider::new(&config)?),
        };

        let store: Arc<dyn SessionStore> = match self.store {
            Some(store) => store,
            None => Arc::new(RedisStore::new(&config.redis_dsn)?),
        };

        let tokenizer: Arc<dyn Tokenizer> = match self.tokenizer {
            Some(tokenizer) => tokenizer,
            None => {
                let http = reqwest::Client::builder()
                    .timeout(config.request_timeout)
                    .build()
                    .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
                Arc::new(YandexTokenizer::new(
                    http,
                    &config.llm_endpoint,
                    config.model_uri(),
                    config.max_tokens,
                ))
            }
        };

        let transport: Arc<dyn CompletionTransport> = match self.transport {
            Some(transport) => transport,
            None if config.async_mode => Arc::new(DeferredCompletion::new(&config)?),
            None => Arc::new(SyncCompletion::new(&config)?),
        };

        tracing::debug!(
            transport = transport.name(),
            store = store.name(),
            model_uri = %config.model_uri(),
            "client assembled"
        );

        Ok(YaGptClient {
            system_message: Message::system(config.gpt_role.clone()),
            token_provider,
            history: ContextWindow::new(
                store.clone(),
                config.max_context_messages,
                config.max_tokens,
            ),
            store,
            tokenizer,
            transport,
            cleaner: PromptCleaner,
            initialized: AtomicBool::new(false),
        })
    }
}

impl YaGptClient {
    /// Create a client with default components for the configuration.
    pub fn new(config: YaGptConfig) -> Result<Self> {
        YaGptClientBuilder::new(config).build()
    }

    /// Start a builder for component substitution.
    pub fn builder(config: YaGptConfig) -> YaGptClientBuilder {
        YaGptClientBuilder::new(config)
    }

    /// Whether `initialize` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Perform one-time setup: acquire an IAM token, connect the session
    /// store, and probe the tokenizer with the role text.
    ///
    /// Idempotent — a second call on a live client is a no-op. A failed call
    /// leaves the client uninitialized and may be retried.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            tracing::debug!("client already initialized");
            return Ok(());
        }

        let token = self.token_provider.token().await.map_err(init_error)?;
        self.store.connect().await.map_err(init_error)?;

        let role_tokens = self
            .tokenizer
            .count_text(&self.system_message.text, &token)
            .await
            .map_err(init_error)?;

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(role_tokens, "client initialized");
        Ok(())
    }

    /// Answer a prompt within a session.
    ///
    /// The cleaned prompt is appended to the session's stored history, the
    /// system message plus the trimmed history is sent to the completion
    /// transport, and the assistant turn is stored only after a successful
    /// response. Store failures propagate as [`Error::Store`]; history is
    /// never silently dropped.
    pub async fn get_answer(&self, prompt: &str, session_id: &str) -> Result<String> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        if session_id.trim().is_empty() {
            return Err(Error::InvalidInput("session id must not be empty".into()));
        }

        let cleaned = self.cleaner.clean(prompt)?;
        let token = self.token_provider.token().await?;
        let prompt_tokens = self.tokenizer.count_text(&cleaned, &token).await?;

        let context = self
            .history
            .append(
                session_id,
                ContextMessage::new(Role::User, cleaned, prompt_tokens),
            )
            .await?;

        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(self.system_message.clone());
        messages.extend(context.iter().map(ContextMessage::to_message));

        tracing::debug!(
            session_id = %session_id,
            context_messages = context.len(),
            transport = self.transport.name(),
            "requesting completion"
        );

        let completion = self.transport.complete(&messages, &token).await?;

        self.history
            .append(
                session_id,
                ContextMessage::new(
                    Role::Assistant,
                    completion.text.clone(),
                    completion.completion_tokens,
                ),
            )
            .await?;

        Ok(completion.text)
    }
}
