//! Authentication module for the keygate server.
//!
//! This module provides:
//! - OIDC sign-in with an external identity provider
//! - Encrypted, chunked session cookies holding the token record
//! - Routes that refresh the session on every read
//!
//! Sessions are stateless: everything the server knows about a signed-in
//! user lives in the cookie, encrypted with a key derived from
//! `AUTH__SECRET`.

pub mod cookies;
pub mod oidc;
pub mod routes;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use keygate_session::{HttpTokenRefresher, TokenLifecycle};
use std::sync::Arc;

use crate::config::SessionConfig;

pub use oidc::OidcClient;
pub use routes::{callback, session, signin, signout};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// OIDC client for sign-in.
    pub oidc_client: Arc<OidcClient>,
    /// Token lifecycle controller used on every session read.
    pub lifecycle: Arc<TokenLifecycle<HttpTokenRefresher>>,
    /// Session configuration.
    pub session_config: SessionConfig,
    /// Key that encrypts the session cookies.
    pub cookie_key: Key,
}

impl AppState {
    /// Creates a new application state.
    ///
    /// The cookie key is derived from `secret`, which must be at least 32
    /// bytes long; configuration validation guarantees this.
    pub fn new(
        oidc_client: OidcClient,
        lifecycle: TokenLifecycle<HttpTokenRefresher>,
        session_config: SessionConfig,
        secret: &str,
    ) -> Self {
        Self {
            oidc_client: Arc::new(oidc_client),
            lifecycle: Arc::new(lifecycle),
            session_config,
            cookie_key: Key::derive_from(secret.as_bytes()),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
