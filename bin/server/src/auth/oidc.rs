//! Sign-in against the identity provider.
//!
//! Covers discovery, the authorization redirect, and the code exchange that
//! produces the initial [`FreshGrant`]. Refreshing tokens afterwards is the
//! session crate's job, not this client's.

use base64::Engine;
use keygate_core::EpochSeconds;
use keygate_session::{FreshGrant, OidcConfig, Profile};
use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreJwsSigningAlgorithm, CoreProviderMetadata,
};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet, EndpointNotSet,
    EndpointSet, IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, Scope, TokenResponse,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Client shape produced by discovery: authorization endpoint known, token
/// and userinfo endpoints as advertised by the provider.
type DiscoveredClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// A discovered provider plus the keygate client registration.
pub struct OidcClient {
    client: DiscoveredClient,
    signing_algs: Vec<CoreJwsSigningAlgorithm>,
    http_client: reqwest::Client,
    config: OidcConfig,
}

/// Flow state kept in an encrypted cookie between sign-in and callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthState {
    pub csrf_token: String,
    pub pkce_verifier: String,
    pub nonce: String,
}

impl OidcClient {
    /// Fetches the provider metadata from the issuer and prepares the client.
    pub async fn discover(config: OidcConfig) -> Result<Self, OidcError> {
        let issuer = IssuerUrl::new(config.issuer_url().to_string())
            .map_err(|e| OidcError::configuration("issuer_url", e))?;
        let redirect = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| OidcError::configuration("redirect_uri", e))?;
        let signing_algs = parse_signing_algs(&config.id_token_signing_algs())?;

        // Redirects are never followed.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OidcError::configuration("http_client", e))?;

        let metadata = CoreProviderMetadata::discover_async(issuer, &http_client)
            .await
            .map_err(|e| OidcError::Discovery {
                reason: e.to_string(),
            })?;

        info!(
            issuer = config.issuer_url(),
            token_endpoint = ?metadata.token_endpoint().map(|url| url.as_str()),
            "discovered OIDC provider"
        );

        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(config.client_id().to_string()),
            Some(ClientSecret::new(config.client_secret().to_string())),
        )
        .set_redirect_uri(redirect);

        Ok(Self {
            client,
            signing_algs,
            http_client,
            config,
        })
    }

    /// Builds the provider URL the browser is sent to, and the state needed
    /// to finish the flow on callback.
    pub fn authorization_url(&self) -> (String, AuthState) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let request = self
            .config
            .scopes()
            .into_iter()
            .fold(
                self.client.authorize_url(
                    CoreAuthenticationFlow::AuthorizationCode,
                    CsrfToken::new_random,
                    Nonce::new_random,
                ),
                |request, scope| request.add_scope(Scope::new(scope.to_string())),
            )
            .set_pkce_challenge(challenge);

        let (url, csrf, nonce) = request.url();
        let state = AuthState {
            csrf_token: csrf.secret().to_string(),
            pkce_verifier: verifier.secret().to_string(),
            nonce: nonce.secret().to_string(),
        };
        (url.into(), state)
    }

    /// Redeems an authorization code and verifies the returned ID token.
    ///
    /// `now` anchors the absolute expiry of the issued access token.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &AuthState,
        now: EpochSeconds,
    ) -> Result<FreshGrant, OidcError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| OidcError::TokenExchange {
                reason: e.to_string(),
            })?
            .set_pkce_verifier(PkceCodeVerifier::new(state.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OidcError::TokenExchange {
                reason: e.to_string(),
            })?;

        let id_token = response.id_token().ok_or_else(|| OidcError::TokenExchange {
            reason: "response carries no id_token".to_string(),
        })?;

        // Signature, issuer, audience, expiry, and nonce are checked here;
        // the profile below is read from the same, now trusted, payload.
        let verifier = self
            .client
            .id_token_verifier()
            .set_allowed_algs(self.signing_algs.clone());
        id_token
            .claims(&verifier, &Nonce::new(state.nonce.clone()))
            .map_err(|e| OidcError::TokenValidation {
                reason: e.to_string(),
            })?;

        let raw = match serde_json::to_value(id_token) {
            Ok(serde_json::Value::String(raw)) => raw,
            _ => {
                return Err(OidcError::TokenValidation {
                    reason: "ID token did not serialize to a compact JWT".to_string(),
                });
            }
        };
        let profile = profile_from_id_token(&raw)?;

        let expires_at = match response.expires_in() {
            Some(lifetime) => now.plus_secs(lifetime.as_secs()),
            None => {
                warn!("provider omitted expires_in; session will refresh on next access");
                now
            }
        };

        Ok(FreshGrant {
            access_token: response.access_token().secret().clone(),
            expires_at,
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            profile,
        })
    }
}

/// Maps configured algorithm names onto the verifier's algorithm type.
fn parse_signing_algs(names: &[&str]) -> Result<Vec<CoreJwsSigningAlgorithm>, OidcError> {
    names
        .iter()
        .map(|name| {
            serde_json::from_value(serde_json::Value::String((*name).to_string())).map_err(|_| {
                OidcError::Configuration {
                    setting: "id_token_signing_algs",
                    reason: format!("unsupported algorithm {name}"),
                }
            })
        })
        .collect()
}

/// Decodes the payload segment of a compact JWT into a profile.
///
/// The openidconnect claim types only expose standard claims, so the raw
/// payload is read to keep provider-specific ones as well.
fn profile_from_id_token(id_token: &str) -> Result<Profile, OidcError> {
    let invalid = |reason: String| OidcError::TokenValidation { reason };

    let mut segments = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(invalid("ID token is not a compact JWT".to_string()));
    };

    let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| invalid(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&json).map_err(|e| invalid(format!("payload is not a profile: {e}")))
}

/// Failures while talking to the identity provider.
#[derive(Debug)]
pub enum OidcError {
    /// A setting could not be turned into a usable client.
    Configuration {
        setting: &'static str,
        reason: String,
    },
    /// The issuer's discovery document could not be fetched or parsed.
    Discovery { reason: String },
    /// The token endpoint refused or failed the code exchange.
    TokenExchange { reason: String },
    /// The ID token failed verification or could not be read.
    TokenValidation { reason: String },
}

impl OidcError {
    fn configuration(setting: &'static str, err: impl fmt::Display) -> Self {
        Self::Configuration {
            setting,
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for OidcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { setting, reason } => {
                write!(f, "invalid OIDC setting {}: {}", setting, reason)
            }
            Self::Discovery { reason } => write!(f, "provider discovery failed: {}", reason),
            Self::TokenExchange { reason } => write!(f, "code exchange failed: {}", reason),
            Self::TokenValidation { reason } => write!(f, "ID token rejected: {}", reason),
        }
    }
}

impl std::error::Error for OidcError {}
