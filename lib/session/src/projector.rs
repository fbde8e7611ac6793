//! Projection of a token record into the externally visible session.

use keygate_core::EpochSeconds;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::{Profile, TokenError, TokenRecord};

/// The session shape returned by session-inspection endpoints.
///
/// A flagged record still projects its (possibly stale) tokens; the
/// `error` field tells the caller the session is degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<EpochSeconds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<TokenError>,
}

impl SessionView {
    /// Maps a record into its session view.
    #[must_use]
    pub fn project(record: &TokenRecord) -> Self {
        if let Some(error) = record.error() {
            warn!(%error, "session contains token error");
        }

        Self {
            access_token: record.access_token().map(str::to_string),
            id_token: record.profile().cloned(),
            refresh_token: record.refresh_token().map(str::to_string),
            expires_at: record.expires_at(),
            error: record.error(),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    #[must_use]
    pub fn id_token(&self) -> Option<&Profile> {
        self.id_token.as_ref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<EpochSeconds> {
        self.expires_at
    }

    #[must_use]
    pub fn error(&self) -> Option<TokenError> {
        self.error
    }

    /// Returns true if the caller should send the user back through sign-in.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        self.error.is_some()
    }
}
