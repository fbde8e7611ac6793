//! Refresh-token exchange against the provider's token endpoint.
//!
//! One form-encoded POST per call, bounded by the configured timeout, with
//! no internal retry. A provider rejecting a refresh token usually means the
//! token was revoked, so retrying belongs to caller policy if anywhere.

use async_trait::async_trait;
use keygate_core::EpochSeconds;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigError, RefreshError};
use crate::oidc::OidcConfig;

/// The token endpoint's answer to a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
    /// Present only when the provider rotates refresh tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl RefreshedTokens {
    /// Returns the absolute expiry for a refresh completed at `now`.
    #[must_use]
    pub fn expires_at(&self, now: EpochSeconds) -> EpochSeconds {
        now.plus_secs(self.expires_in)
    }
}

/// Exchanges a refresh token for new provider tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Performs a single refresh-token exchange.
    ///
    /// # Errors
    ///
    /// Returns a `RefreshError` report when the endpoint is unreachable,
    /// times out, rejects the token, or answers with something that is not
    /// a token response.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, Report<RefreshError>>;
}

#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for Arc<T> {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, Report<RefreshError>> {
        (**self).refresh(refresh_token).await
    }
}

/// Form body of a `refresh_token` grant.
#[derive(Serialize)]
struct RefreshGrant<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

/// Refresh executor backed by `reqwest`.
///
/// Client credentials travel in the form body, the way Keycloak's
/// confidential clients expect them.
#[derive(Clone)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    token_url: reqwest::Url,
    client_id: String,
    client_secret: String,
}

impl HttpTokenRefresher {
    /// Creates an executor for the provider described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` report if the token endpoint is not a valid
    /// URL or the HTTP client cannot be built.
    pub fn new(config: &OidcConfig) -> keygate_core::Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.refresh_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        Self::with_client(client, config)
    }

    /// Creates an executor that sends requests through `client`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` report if the token endpoint is not a valid URL.
    pub fn with_client(
        client: reqwest::Client,
        config: &OidcConfig,
    ) -> keygate_core::Result<Self, ConfigError> {
        let token_url = reqwest::Url::parse(&config.token_endpoint()).map_err(|e| {
            ConfigError::InvalidSetting {
                name: "token_endpoint".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            client,
            token_url,
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().to_string(),
        })
    }

    /// Returns the token endpoint this executor posts to.
    #[must_use]
    pub fn token_url(&self) -> &reqwest::Url {
        &self.token_url
    }
}

impl fmt::Debug for HttpTokenRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenRefresher")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[instrument(skip_all, fields(token_url = %self.token_url, client_id = %self.client_id))]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, Report<RefreshError>> {
        let grant = RefreshGrant {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token,
        };

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&grant)
            .send()
            .await
            .map_err(RefreshError::from_transport)?;

        let status = response.status();
        debug!(status = status.as_u16(), "received token endpoint response");

        let body = response
            .bytes()
            .await
            .map_err(RefreshError::from_transport)?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body).into_owned();
            warn!(status = status.as_u16(), body = %body, "token refresh rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let tokens: RefreshedTokens =
            serde_json::from_slice(&body).map_err(|e| RefreshError::MalformedResponse {
                reason: e.to_string(),
            })?;

        info!(
            expires_in = tokens.expires_in,
            rotated = tokens.refresh_token.is_some(),
            "refreshed access token"
        );

        Ok(tokens)
    }
}
