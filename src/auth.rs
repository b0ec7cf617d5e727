//! IAM token acquisition from a service-account key.
//!
//! The provider signs a short-lived PS256 JWT with the service account's
//! private key and exchanges it for an IAM token at the identity endpoint.
//! The token is cached per provider instance and renewed ten minutes before
//! expiry; a mutex keeps at most one refresh in flight under concurrent use.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::YaGptConfig;
use crate::error::{Error, Result};

/// JWT assertion lifetime.
const JWT_LIFETIME: Duration = Duration::from_secs(3600);

/// Renew the IAM token this long before it expires.
const RENEWAL_MARGIN: Duration = Duration::from_secs(600);

/// Fallback token lifetime when the response omits `expiresIn` (12 hours).
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 43_200;

/// Source of bearer tokens for API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a currently valid token, refreshing it if needed.
    async fn token(&self) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    sub: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "iamToken")]
    iam_token: String,
    #[serde(rename = "expiresIn", default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// IAM token provider backed by a service-account key.
pub struct IamTokenProvider {
    key_id: String,
    service_account_id: String,
    encoding_key: EncodingKey,
    endpoint: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl IamTokenProvider {
    /// Build a provider from the client configuration.
    ///
    /// Fails with a configuration error if the private key PEM does not
    /// parse as an RSA signing key.
    pub fn new(config: &YaGptConfig) -> Result<Self> {
        let key = &config.service_account_key;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Config(format!("service account private key is not valid RSA PEM: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            key_id: key.id.clone(),
            service_account_id: key.service_account_id.clone(),
            encoding_key,
            endpoint: config.iam_endpoint.clone(),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Sign the token-exchange JWT assertion.
    fn signed_jwt(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            iss: self.service_account_id.clone(),
            sub: self.service_account_id.clone(),
            aud: self.endpoint.clone(),
            iat: now,
            exp: now + JWT_LIFETIME.as_secs(),
        };

        let mut header = Header::new(Algorithm::PS256);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| Error::Initialization(format!("failed to sign token-exchange JWT: {e}")))
    }

    /// Exchange the signed JWT for a fresh IAM token.
    async fn fetch_token(&self) -> Result<CachedToken> {
        let assertion = self.signed_jwt()?;

        let response = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "jwt": assertion }))
            .send()
            .await
            .map_err(|e| Error::Initialization(format!("IAM token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Initialization(format!(
                "IAM token exchange rejected ({status}): {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Initialization(format!("failed to decode IAM token response: {e}")))?;

        let lifetime = parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = Instant::now() + Duration::from_secs(lifetime).saturating_sub(RENEWAL_MARGIN);

        tracing::debug!(lifetime_secs = lifetime, "IAM token acquired");

        Ok(CachedToken {
            token: parsed.iam_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for IamTokenProvider {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.expires_at {
                tracing::trace!("reusing cached IAM token");
                return Ok(entry.token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// Fixed-token provider for tests and pre-issued tokens.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap an already issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_key, YaGptConfig};

    fn test_config() -> YaGptConfig {
        YaGptConfig::new(test_key(), "folder", "role", "redis://127.0.0.1:6379")
    }

    #[test]
    fn bad_pem_is_config_error() {
        // The placeholder test key carries a non-PEM private key.
        let err = match IamTokenProvider::new(&test_config()) {
            Ok(_) => panic!("expected a configuration error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("RSA PEM"));
    }

    #[tokio::test]
    async fn static_provider_returns_fixed_token() {
        let provider = StaticTokenProvider::new("t-fixed");
        assert_eq!(provider.token().await.unwrap(), "t-fixed");
        assert_eq!(provider.token().await.unwrap(), "t-fixed");
    }

    #[test]
    fn token_response_defaults_lifetime() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"iamToken":"t-1"}"#).unwrap();
        assert_eq!(parsed.iam_token, "t-1");
        assert!(parsed.expires_in.is_none());

        let parsed: TokenResponse =
            serde_json::from_str(r#"{"iamToken":"t-2","expiresIn":120}"#).unwrap();
        assert_eq!(parsed.expires_in, Some(120));
    }
}
