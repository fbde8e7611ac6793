//! Token lifecycle for OIDC-backed stateless sessions.
//!
//! This crate provides:
//! - The token record carried inside the session cookie (`TokenRecord`)
//! - The refresh executor that talks to the provider's token endpoint
//!   (`TokenRefresher`, `HttpTokenRefresher`)
//! - The lifecycle controller deciding mint, reuse, or refresh on every
//!   session access (`TokenLifecycle`)
//! - The projection of a record into the session shape returned to callers
//!   (`SessionView`)
//! - Provider configuration (`OidcConfig`)
//!
//! # Failure Model
//!
//! Nothing in the refresh path raises past the controller. A missing
//! refresh token, a rejected refresh, a timeout, or an unparseable
//! response all become the sticky `RefreshTokenError` flag on the record.
//! Callers inspect the flag and decide whether to force reauthentication.
//!
//! # Example
//!
//! ```
//! use keygate_core::EpochSeconds;
//! use keygate_session::{FreshGrant, Profile, SessionView, TokenRecord};
//!
//! let record = TokenRecord::from_grant(FreshGrant {
//!     access_token: "a1".to_string(),
//!     expires_at: EpochSeconds::new(1_700_003_600),
//!     refresh_token: Some("r1".to_string()),
//!     profile: Profile::new("user-123"),
//! });
//!
//! let view = SessionView::project(&record);
//! assert_eq!(view.access_token(), Some("a1"));
//! assert!(!view.requires_reauthentication());
//! ```

pub mod error;
pub mod lifecycle;
pub mod oidc;
pub mod projector;
pub mod record;
pub mod refresh;

pub use error::{ConfigError, RefreshError};
pub use lifecycle::{Outcome, Resolution, TokenLifecycle};
pub use oidc::{OidcConfig, OidcConfigBuilder};
pub use projector::SessionView;
pub use record::{FreshGrant, Profile, TokenError, TokenRecord};
pub use refresh::{HttpTokenRefresher, RefreshedTokens, TokenRefresher};
