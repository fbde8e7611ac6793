//! HTTP-facing error types for the auth routes.
//!
//! Internal details are logged; responses carry only a short message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

use crate::auth::cookies::SessionCookieError;
use crate::auth::oidc::OidcError;

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    /// The callback arrived without the auth state cookie.
    MissingAuthState,
    /// The auth state cookie could not be parsed.
    InvalidAuthState,
    /// The callback omitted `code` or `state`.
    InvalidCallback,
    /// The `state` parameter does not match the stored CSRF token.
    CsrfMismatch,
    /// The identity provider redirected back with an error.
    ProviderError { error: String },
    /// Exchanging the authorization code failed.
    TokenExchange(OidcError),
    /// The session could not be written to cookies.
    SessionCookie(SessionCookieError),
    /// Any other server-side failure.
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAuthState => write!(f, "missing auth state"),
            Self::InvalidAuthState => write!(f, "invalid auth state"),
            Self::InvalidCallback => write!(f, "callback is missing code or state"),
            Self::CsrfMismatch => write!(f, "CSRF token mismatch"),
            Self::ProviderError { error } => write!(f, "identity provider error: {}", error),
            Self::TokenExchange(e) => write!(f, "{}", e),
            Self::SessionCookie(e) => write!(f, "{}", e),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<OidcError> for AuthError {
    fn from(e: OidcError) -> Self {
        Self::TokenExchange(e)
    }
}

impl From<SessionCookieError> for AuthError {
    fn from(e: SessionCookieError) -> Self {
        Self::SessionCookie(e)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingAuthState => (StatusCode::BAD_REQUEST, "Missing auth state"),
            Self::InvalidAuthState => (StatusCode::BAD_REQUEST, "Invalid auth state"),
            Self::InvalidCallback => (StatusCode::BAD_REQUEST, "Invalid callback request"),
            Self::CsrfMismatch => (StatusCode::BAD_REQUEST, "CSRF token mismatch"),
            Self::ProviderError { error } => {
                tracing::warn!(%error, "identity provider returned an error");
                (StatusCode::UNAUTHORIZED, "Sign-in was not completed")
            }
            Self::TokenExchange(e) => {
                tracing::error!("Token exchange failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed")
            }
            Self::SessionCookie(e) => {
                tracing::error!("Session cookie error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        for error in [
            AuthError::MissingAuthState,
            AuthError::InvalidAuthState,
            AuthError::InvalidCallback,
            AuthError::CsrfMismatch,
        ] {
            assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn provider_error_is_unauthorized() {
        let error = AuthError::ProviderError {
            error: "access_denied".to_string(),
        };
        assert_eq!(error.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn server_failures_hide_details() {
        let error = AuthError::from(OidcError::TokenExchange {
            reason: "invalid_grant".to_string(),
        });
        assert!(error.to_string().contains("invalid_grant"));
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let error = AuthError::from(SessionCookieError::TooLarge { chunks: 20 });
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
