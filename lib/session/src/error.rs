//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `RefreshError`: Failures of a single refresh-token exchange
//! - `ConfigError`: Invalid or missing provider configuration

use std::fmt;

/// Errors from a refresh-token exchange with the identity provider.
///
/// The lifecycle controller reacts to every variant the same way. The
/// variants exist so the log line says what actually went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The token endpoint could not be reached.
    Transport { reason: String },
    /// The token endpoint did not answer within the configured timeout.
    Timeout,
    /// The provider answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The provider's response was not a token response.
    MalformedResponse { reason: String },
}

impl RefreshError {
    /// Classifies a transport-level `reqwest` failure.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport {
                reason: err.to_string(),
            }
        }
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => {
                write!(f, "token endpoint unreachable: {reason}")
            }
            Self::Timeout => {
                write!(f, "token endpoint timed out")
            }
            Self::Rejected { status, body } => {
                write!(f, "token refresh rejected with status {status}: {body}")
            }
            Self::MalformedResponse { reason } => {
                write!(f, "malformed token response: {reason}")
            }
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors from validating provider configuration.
///
/// These are startup-time faults; nothing at request time produces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required settings are absent or empty.
    MissingSettings { names: Vec<String> },
    /// A setting is present but unusable.
    InvalidSetting { name: String, reason: String },
    /// The HTTP client for the token endpoint could not be built.
    HttpClient { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSettings { names } => {
                write!(f, "missing required settings: {}", names.join(", "))
            }
            Self::InvalidSetting { name, reason } => {
                write!(f, "invalid setting '{name}': {reason}")
            }
            Self::HttpClient { reason } => {
                write!(f, "failed to build HTTP client: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
