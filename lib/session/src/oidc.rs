//! OIDC (OpenID Connect) provider configuration.
//!
//! This module describes how to reach the external identity provider:
//! where it lives, which client identity to present, and how long a
//! refresh call may take. The configuration is built once at startup and
//! shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Path of the token endpoint below a Keycloak-style issuer URL.
const TOKEN_ENDPOINT_PATH: &str = "/protocol/openid-connect/token";

/// Identity provider settings, read from the `OIDC__*` variables.
///
/// Only the four connection settings are required; everything else has a
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Issuer URL, e.g. a Keycloak realm such as
    /// "https://sso.example.org/realms/keygate". Discovery starts here.
    issuer_url: String,
    /// Confidential client registered for keygate.
    client_id: String,
    /// Secret of the confidential client; sent on every refresh.
    client_secret: String,
    /// Where the provider sends the browser back, normally `<origin>/auth/callback`.
    redirect_uri: String,
    /// Comma-separated scopes; "openid,email,profile" unless set.
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Explicit token endpoint. When absent it is derived from the issuer.
    #[serde(default)]
    token_endpoint: Option<String>,
    /// Seconds a single refresh exchange may take (10 unless set).
    #[serde(default = "default_refresh_timeout_seconds")]
    refresh_timeout_seconds: u64,
    /// Comma-separated JWS algorithms accepted on ID tokens ("RS256" unless set).
    #[serde(default = "default_id_token_signing_algs")]
    id_token_signing_algs: String,
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

fn default_refresh_timeout_seconds() -> u64 {
    10
}

fn default_id_token_signing_algs() -> String {
    "RS256".to_string()
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

impl OidcConfig {
    /// Settings with only the connection fields given.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes: default_scopes(),
            token_endpoint: None,
            refresh_timeout_seconds: default_refresh_timeout_seconds(),
            id_token_signing_algs: default_id_token_signing_algs(),
        }
    }

    /// Starts a builder for overriding the optional settings.
    #[must_use]
    pub fn builder(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> OidcConfigBuilder {
        OidcConfigBuilder::new(issuer_url, client_id, client_secret, redirect_uri)
    }

    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Scopes requested at sign-in.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        split_list(&self.scopes)
    }

    /// Returns the token endpoint used for refresh-token exchanges.
    ///
    /// Falls back to `<issuer>/protocol/openid-connect/token`.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        match &self.token_endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint.trim().to_string(),
            _ => format!(
                "{}{TOKEN_ENDPOINT_PATH}",
                self.issuer_url.trim_end_matches('/')
            ),
        }
    }

    /// Returns the timeout applied to each refresh-token exchange.
    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_seconds)
    }

    /// Returns the accepted ID token signing algorithm names (e.g. "ES256").
    #[must_use]
    pub fn id_token_signing_algs(&self) -> Vec<&str> {
        split_list(&self.id_token_signing_algs)
    }

    /// Returns the names of required settings that are empty.
    #[must_use]
    pub fn missing_settings(&self) -> Vec<&'static str> {
        [
            ("issuer_url", &self.issuer_url),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", &self.redirect_uri),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Checks that every required setting is present and usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingSettings` naming every empty required
    /// field, or `ConfigError::InvalidSetting` for a zero refresh timeout or
    /// an empty algorithm list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing = self.missing_settings();
        if !missing.is_empty() {
            return Err(ConfigError::MissingSettings {
                names: missing.into_iter().map(str::to_string).collect(),
            });
        }
        if self.refresh_timeout_seconds == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "refresh_timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.id_token_signing_algs().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "id_token_signing_algs".to_string(),
                reason: "at least one algorithm is required".to_string(),
            });
        }
        Ok(())
    }
}

/// Incremental construction of an [`OidcConfig`].
#[derive(Debug)]
pub struct OidcConfigBuilder {
    issuer_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    token_endpoint: Option<String>,
    refresh_timeout_seconds: u64,
    id_token_signing_algs: Vec<String>,
}

impl OidcConfigBuilder {
    /// Starts from the connection fields and default options.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            token_endpoint: None,
            refresh_timeout_seconds: default_refresh_timeout_seconds(),
            id_token_signing_algs: vec![default_id_token_signing_algs()],
        }
    }

    /// Requests an extra scope, e.g. `offline_access`.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.iter().any(|existing| *existing == scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Overrides the token endpoint derived from the issuer.
    #[must_use]
    pub fn token_endpoint(mut self, endpoint: String) -> Self {
        self.token_endpoint = Some(endpoint);
        self
    }

    /// Sets the refresh timeout in seconds.
    #[must_use]
    pub fn refresh_timeout_seconds(mut self, seconds: u64) -> Self {
        self.refresh_timeout_seconds = seconds;
        self
    }

    /// Sets the accepted ID token signing algorithms.
    #[must_use]
    pub fn id_token_signing_algs(mut self, algs: Vec<String>) -> Self {
        self.id_token_signing_algs = algs;
        self
    }

    #[must_use]
    pub fn build(self) -> OidcConfig {
        let Self {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            token_endpoint,
            refresh_timeout_seconds,
            id_token_signing_algs,
        } = self;
        OidcConfig {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes: scopes.join(","),
            token_endpoint,
            refresh_timeout_seconds,
            id_token_signing_algs: id_token_signing_algs.join(","),
        }
    }
}
