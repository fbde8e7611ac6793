//! Authentication routes for sign-in, callback, session, and sign-out.

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use keygate_core::{Clock, SystemClock};
use keygate_session::{SessionView, TokenLifecycle, TokenRefresher};
use serde::Deserialize;
use time::Duration as TimeDuration;
use tracing::info;

use super::{
    AppState,
    cookies::{AUTH_STATE_COOKIE, clear_session, read_session, write_session},
    oidc::AuthState,
};
use crate::config::SessionConfig;
use crate::error::AuthError;

/// Query parameters for the OIDC callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Initiates the OIDC sign-in flow by redirecting to the identity provider.
pub async fn signin(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let (auth_url, auth_state) = state.oidc_client.authorization_url();

    // Store the auth state in an encrypted cookie for validation on callback
    let auth_state_json =
        serde_json::to_string(&auth_state).map_err(|e| AuthError::Internal(e.to_string()))?;

    let cookie = Cookie::build((AUTH_STATE_COOKIE, auth_state_json))
        .path("/")
        .http_only(true)
        .secure(state.session_config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(10));

    Ok((jar.add(cookie), Redirect::to(&auth_url)))
}

/// Handles the OIDC callback after the user authenticates with the identity provider.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AuthError> {
    if let Some(error) = query.error {
        let error = match query.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(AuthError::ProviderError { error });
    }

    let (Some(code), Some(csrf)) = (query.code, query.state) else {
        return Err(AuthError::InvalidCallback);
    };

    let auth_state = parse_auth_state(&jar)?;
    if csrf != auth_state.csrf_token {
        return Err(AuthError::CsrfMismatch);
    }

    let grant = state
        .oidc_client
        .exchange_code(&code, &auth_state, SystemClock.now())
        .await?;

    let resolution = state.lifecycle.resolve(None, Some(grant)).await;
    info!(
        subject = resolution.record().profile().map(|p| p.sub.as_str()),
        "user signed in"
    );

    let jar = write_session(jar, resolution.record(), &state.session_config)?;
    let remove_auth_state = Cookie::build((AUTH_STATE_COOKIE, "")).path("/");

    Ok((jar.remove(remove_auth_state), Redirect::to("/")))
}

/// Returns the current session, refreshing the access token when it has expired.
///
/// Responds with JSON `null` when there is no session.
pub async fn session(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let (jar, view) =
        refresh_session(jar, state.lifecycle.as_ref(), &state.session_config).await?;
    Ok((jar, Json(view)))
}

/// Signs the user out by removing the session cookies.
pub async fn signout(jar: PrivateCookieJar) -> impl IntoResponse {
    (clear_session(jar), Redirect::to("/"))
}

/// Reads the session, runs it through the lifecycle, and writes it back.
///
/// The cookie is rewritten on every read so its expiry rolls forward and
/// any refreshed or flagged record is persisted.
pub async fn refresh_session<R, C>(
    jar: PrivateCookieJar,
    lifecycle: &TokenLifecycle<R, C>,
    config: &SessionConfig,
) -> Result<(PrivateCookieJar, Option<SessionView>), AuthError>
where
    R: TokenRefresher,
    C: Clock,
{
    let Some(previous) = read_session(&jar) else {
        return Ok((jar, None));
    };

    let resolution = lifecycle.resolve(Some(&previous), None).await;
    let view = SessionView::project(resolution.record());
    let jar = write_session(jar, resolution.record(), config)?;

    Ok((jar, Some(view)))
}

fn parse_auth_state(jar: &PrivateCookieJar) -> Result<AuthState, AuthError> {
    let cookie = jar
        .get(AUTH_STATE_COOKIE)
        .ok_or(AuthError::MissingAuthState)?;
    serde_json::from_str(cookie.value()).map_err(|_| AuthError::InvalidAuthState)
}
