//! The token record carried inside the session cookie.
//!
//! A record is created at sign-in from the provider's authorization-code
//! exchange and replaced wholesale by the lifecycle controller afterwards.
//! Transition methods take `&self` and return a new record; nothing edits
//! a record in place.

use keygate_core::EpochSeconds;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::refresh::RefreshedTokens;

/// Error state carried on a token record.
///
/// Sticky: once set, it survives every transition except a fresh sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenError {
    /// The access token could not be refreshed, or there was nothing to
    /// refresh with. The refresh token is presumed unusable.
    RefreshTokenError,
}

impl TokenError {
    /// Returns the wire name of this error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RefreshTokenError => "RefreshTokenError",
        }
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity claims captured from the verified ID token at sign-in.
///
/// Only `sub` is required. A standard claim whose value has an unexpected
/// type (some providers send `"email_verified": "true"`) is kept verbatim
/// in `extra` instead of failing the sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, JsonValue>")]
pub struct Profile {
    /// Subject identifier at the provider.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Every other claim the provider put in the ID token.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Profile {
    /// Creates a profile with only a subject.
    #[must_use]
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            ..Self::default()
        }
    }

    /// Sets the email claim.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the display name claim.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

impl TryFrom<Map<String, JsonValue>> for Profile {
    type Error = String;

    fn try_from(mut claims: Map<String, JsonValue>) -> Result<Self, Self::Error> {
        let sub = match claims.remove("sub") {
            Some(JsonValue::String(sub)) => sub,
            Some(other) => return Err(format!("claim `sub` must be a string, got {other}")),
            None => return Err("missing claim `sub`".to_string()),
        };

        Ok(Self {
            sub,
            name: take_claim(&mut claims, "name", owned_str),
            preferred_username: take_claim(&mut claims, "preferred_username", owned_str),
            given_name: take_claim(&mut claims, "given_name", owned_str),
            family_name: take_claim(&mut claims, "family_name", owned_str),
            email: take_claim(&mut claims, "email", owned_str),
            email_verified: take_claim(&mut claims, "email_verified", JsonValue::as_bool),
            extra: claims,
        })
    }
}

fn owned_str(value: &JsonValue) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Removes `name` from `claims` when `read` accepts its value.
///
/// Values of another type stay in `claims`; `null` is dropped.
fn take_claim<T>(
    claims: &mut Map<String, JsonValue>,
    name: &str,
    read: impl Fn(&JsonValue) -> Option<T>,
) -> Option<T> {
    let value = claims.get(name)?;
    if value.is_null() {
        claims.remove(name);
        return None;
    }
    let taken = read(value)?;
    claims.remove(name);
    Some(taken)
}

/// Tokens issued by the provider's authorization-code exchange.
///
/// Present only immediately after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshGrant {
    pub access_token: String,
    pub expires_at: EpochSeconds,
    pub refresh_token: Option<String>,
    pub profile: Profile,
}

/// A user's current credential state.
///
/// `expires_at` is present whenever `access_token` is. The default record
/// is empty; the controller treats it like an expired session with nothing
/// to refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<EpochSeconds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<TokenError>,
}

impl TokenRecord {
    /// Builds a record entirely from a fresh grant.
    ///
    /// No earlier error state can survive this.
    #[must_use]
    pub fn from_grant(grant: FreshGrant) -> Self {
        Self {
            access_token: Some(grant.access_token),
            expires_at: Some(grant.expires_at),
            refresh_token: grant.refresh_token,
            profile: Some(grant.profile),
            error: None,
        }
    }

    /// Sets the access token and its expiry.
    #[must_use]
    pub fn with_access_token(mut self, access_token: String, expires_at: EpochSeconds) -> Self {
        self.access_token = Some(access_token);
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the expiry without touching the access token.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Option<EpochSeconds>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    /// Sets the identity profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Option<Profile>) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the error state.
    #[must_use]
    pub fn with_error(mut self, error: Option<TokenError>) -> Self {
        self.error = error;
        self
    }

    /// Returns the provider access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Returns when the access token expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<EpochSeconds> {
        self.expires_at
    }

    /// Returns the provider refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the identity claims captured at sign-in.
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Returns the sticky error state, if set.
    #[must_use]
    pub fn error(&self) -> Option<TokenError> {
        self.error
    }

    /// Returns true if the access token is usable at `now`.
    ///
    /// An expiry equal to `now` counts as expired.
    #[must_use]
    pub fn is_valid_at(&self, now: EpochSeconds) -> bool {
        matches!(self.expires_at, Some(expires_at) if now < expires_at)
    }

    /// Returns this record flagged with `RefreshTokenError`.
    ///
    /// Tokens and expiry are carried over untouched.
    #[must_use]
    pub fn flagged(&self) -> Self {
        Self {
            error: Some(TokenError::RefreshTokenError),
            ..self.clone()
        }
    }

    /// Returns this record updated with a successful refresh at `now`.
    ///
    /// The refresh token is kept when the provider did not rotate it.
    #[must_use]
    pub fn refreshed(&self, tokens: RefreshedTokens, now: EpochSeconds) -> Self {
        let expires_at = tokens.expires_at(now);
        Self {
            access_token: Some(tokens.access_token),
            expires_at: Some(expires_at),
            refresh_token: tokens.refresh_token.or_else(|| self.refresh_token.clone()),
            profile: self.profile.clone(),
            error: None,
        }
    }
}
