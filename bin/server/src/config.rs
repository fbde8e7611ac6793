//! Server settings read from the process environment.
//!
//! Nested sections use `__` as the separator (`OIDC__CLIENT_ID`,
//! `SESSION__MAX_AGE_DAYS`). `main` loads a `.env` file first when one
//! exists.
//!
//! See [`OidcConfig`](keygate_session::OidcConfig) for the identity
//! provider settings.

use keygate_session::{ConfigError, OidcConfig};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;

/// Settings that must be present for the server to start.
pub const REQUIRED_VARIABLES: &[&str] = &[
    "AUTH__SECRET",
    "OIDC__ISSUER_URL",
    "OIDC__CLIENT_ID",
    "OIDC__CLIENT_SECRET",
    "OIDC__REDIRECT_URI",
];

/// Minimum length of the session secret; the cookie key is derived from it.
pub const MIN_SECRET_BYTES: usize = 32;

/// Longest session cookie lifetime accepted; browsers clamp `Max-Age` to this.
pub const MAX_SESSION_DAYS: i64 = 400;

/// Everything the server needs at startup.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session token signing/encryption settings.
    pub auth: AuthConfig,

    /// Identity provider settings.
    pub oidc: OidcConfig,

    /// Session cookie configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3100".to_string()
}

/// Secret material for the session token.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// Master secret the session cookie key is derived from.
    pub secret: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of the session cookie in days.
    /// Rolled forward on every session access.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    /// Sets the `Secure` attribute on every cookie. Turn off only for plain
    /// HTTP on localhost.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_max_age_days() -> i64 {
    30
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

/// Returns the required variables that `lookup` reports as unset or blank.
pub fn missing_variables(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    REQUIRED_VARIABLES
        .iter()
        .filter(|name| lookup(**name).is_none_or(|value| value.trim().is_empty()))
        .map(|name| (*name).to_string())
        .collect()
}

impl ServerConfig {
    /// Loads and validates configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingSettings` naming every absent required
    /// variable, or another `ConfigError` if a value is unusable.
    pub fn load() -> keygate_core::Result<Self, ConfigError> {
        let missing = missing_variables(|name| std::env::var(name).ok());
        if !missing.is_empty() {
            return Err(ConfigError::MissingSettings { names: missing }.into());
        }

        let config = Self::from_env().map_err(|e| ConfigError::InvalidSetting {
            name: "environment".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Deserializes the environment without validating it.
    ///
    /// # Errors
    ///
    /// Returns the `config` crate's error for absent sections or values of
    /// the wrong type.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Checks values that deserialized but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as a `ConfigError`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.oidc.validate().map_err(|err| match err {
            ConfigError::MissingSettings { names } => ConfigError::MissingSettings {
                names: names
                    .iter()
                    .map(|name| format!("OIDC__{}", name.to_uppercase()))
                    .collect(),
            },
            other => other,
        })?;

        if self.auth.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::InvalidSetting {
                name: "AUTH__SECRET".to_string(),
                reason: format!("must be at least {MIN_SECRET_BYTES} bytes"),
            });
        }

        if !(1..=MAX_SESSION_DAYS).contains(&self.session.max_age_days) {
            return Err(ConfigError::InvalidSetting {
                name: "SESSION__MAX_AGE_DAYS".to_string(),
                reason: format!("must be between 1 and {MAX_SESSION_DAYS}"),
            });
        }

        self.socket_addr()?;
        Ok(())
    }

    /// Returns the parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSetting` if `listen_addr` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidSetting {
                name: "LISTEN_ADDR".to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn config_json(secret: &str) -> String {
        format!(
            r#"{{
                "auth": {{ "secret": "{secret}" }},
                "oidc": {{
                    "issuer_url": "https://auth.example.com/realms/main",
                    "client_id": "keygate",
                    "client_secret": "s3cret",
                    "redirect_uri": "http://localhost:3100/auth/callback"
                }}
            }}"#
        )
    }

    #[test]
    fn session_defaults_are_thirty_day_secure_cookies() {
        let config = SessionConfig::default();
        assert_eq!(config.max_age_days, 30);
        assert!(config.secure_cookies);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ServerConfig = serde_json::from_str(&config_json(SECRET)).expect("deserialize");

        assert_eq!(config.listen_addr, "0.0.0.0:3100");
        assert_eq!(config.session.max_age_days, 30);
        assert_eq!(config.oidc.client_id(), "keygate");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.socket_addr().expect("valid address").port(),
            3100
        );
    }

    #[test]
    fn short_secret_is_rejected() {
        let config: ServerConfig = serde_json::from_str(&config_json("short")).expect("deserialize");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { name, .. }) if name == "AUTH__SECRET"
        ));
    }

    #[test]
    fn empty_oidc_settings_are_named_as_variables() {
        let mut config: ServerConfig =
            serde_json::from_str(&config_json(SECRET)).expect("deserialize");
        config.oidc = OidcConfig::new(
            "https://auth.example.com".to_string(),
            String::new(),
            "s3cret".to_string(),
            "http://localhost:3100/auth/callback".to_string(),
        );

        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingSettings {
                names: vec!["OIDC__CLIENT_ID".to_string()],
            })
        );
    }

    #[test]
    fn session_lifetime_must_fit_cookie_limits() {
        let mut config: ServerConfig =
            serde_json::from_str(&config_json(SECRET)).expect("deserialize");

        for days in [0, -1, MAX_SESSION_DAYS + 1, 1_000_000_000_000_000] {
            config.session.max_age_days = days;
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidSetting { ref name, .. }) if name == "SESSION__MAX_AGE_DAYS"
                ),
                "{days} days should be rejected"
            );
        }

        config.session.max_age_days = MAX_SESSION_DAYS;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn bad_listen_addr_is_rejected() {
        let mut config: ServerConfig =
            serde_json::from_str(&config_json(SECRET)).expect("deserialize");
        config.listen_addr = "localhost".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_variables_lists_every_absent_or_blank_name() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AUTH__SECRET", SECRET),
            ("OIDC__ISSUER_URL", "https://auth.example.com"),
            ("OIDC__CLIENT_ID", "   "),
        ]);

        let missing = missing_variables(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(
            missing,
            vec![
                "OIDC__CLIENT_ID".to_string(),
                "OIDC__CLIENT_SECRET".to_string(),
                "OIDC__REDIRECT_URI".to_string(),
            ]
        );
    }

    #[test]
    fn auth_config_debug_redacts_secret() {
        let auth = AuthConfig {
            secret: SECRET.to_string(),
        };
        assert!(!format!("{auth:?}").contains(SECRET));
    }
}
