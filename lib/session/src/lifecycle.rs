//! The token lifecycle state machine.
//!
//! Every session access runs [`TokenLifecycle::resolve`], which decides, in
//! order:
//!
//! 1. a fresh grant from sign-in replaces whatever came before;
//! 2. a record whose access token has not yet expired is reused as-is;
//! 3. otherwise the record needs a refresh, unless it already carries the
//!    sticky error or has no refresh token, in which case it is flagged and
//!    returned without touching the network.
//!
//! The refresh call is the only suspension point and the only side effect.
//! Its failure is folded into the record; `resolve` always yields a record.
//!
//! # Concurrent refreshes
//!
//! Two requests carrying the same stale cookie (two browser tabs) can both
//! reach step 3 and both call the provider. With a provider that rotates
//! refresh tokens, one call wins and the other comes back flagged with
//! `RefreshTokenError`, even though the session was just refreshed in the
//! other tab. There is no shared refresh guard here; the record lives only
//! in the caller's cookie.

use keygate_core::{Clock, SystemClock};
use tracing::{debug, info, warn};

use crate::record::{FreshGrant, TokenRecord};
use crate::refresh::TokenRefresher;

/// Which path the controller took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Built from a fresh sign-in grant.
    Minted,
    /// The previous record was still valid and returned unchanged.
    Reused,
    /// The provider issued a new access token.
    Refreshed,
    /// The refresh call failed; the record is now flagged.
    RefreshFailed,
    /// The record had no refresh token; it is now flagged.
    MissingRefreshToken,
    /// The record was already flagged; returned unchanged.
    PreviouslyFailed,
}

impl Outcome {
    /// Returns a short label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minted => "minted",
            Self::Reused => "reused",
            Self::Refreshed => "refreshed",
            Self::RefreshFailed => "refresh_failed",
            Self::MissingRefreshToken => "missing_refresh_token",
            Self::PreviouslyFailed => "previously_failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The next record and how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    record: TokenRecord,
    outcome: Outcome,
}

impl Resolution {
    fn new(record: TokenRecord, outcome: Outcome) -> Self {
        Self { record, outcome }
    }

    /// Returns the resulting record.
    #[must_use]
    pub fn record(&self) -> &TokenRecord {
        &self.record
    }

    /// Returns which path produced the record.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Consumes the resolution, returning the record.
    #[must_use]
    pub fn into_record(self) -> TokenRecord {
        self.record
    }
}

/// Decides mint, reuse, or refresh for a token record.
#[derive(Debug, Clone)]
pub struct TokenLifecycle<R, C = SystemClock> {
    refresher: R,
    clock: C,
}

impl<R> TokenLifecycle<R, SystemClock> {
    /// Creates a controller that reads the system clock.
    #[must_use]
    pub fn new(refresher: R) -> Self {
        Self {
            refresher,
            clock: SystemClock,
        }
    }
}

impl<R, C> TokenLifecycle<R, C> {
    /// Creates a controller that reads time from `clock`.
    #[must_use]
    pub fn with_clock(refresher: R, clock: C) -> Self {
        Self { refresher, clock }
    }
}

impl<R: TokenRefresher, C: Clock> TokenLifecycle<R, C> {
    /// Produces the next token record.
    ///
    /// `previous` is the record decoded from the session, if any. `grant` is
    /// present only right after a successful authorization-code exchange.
    /// With neither, the result is an empty record flagged with
    /// `RefreshTokenError`.
    pub async fn resolve(
        &self,
        previous: Option<&TokenRecord>,
        grant: Option<FreshGrant>,
    ) -> Resolution {
        if let Some(grant) = grant {
            info!(outcome = %Outcome::Minted, "session minted from sign-in grant");
            return Resolution::new(TokenRecord::from_grant(grant), Outcome::Minted);
        }

        let previous = previous.cloned().unwrap_or_default();
        let now = self.clock.now();

        if previous.is_valid_at(now) {
            debug!(outcome = %Outcome::Reused, expires_at = ?previous.expires_at(), "access token still valid");
            return Resolution::new(previous, Outcome::Reused);
        }

        if let Some(error) = previous.error() {
            debug!(outcome = %Outcome::PreviouslyFailed, %error, "refresh previously failed, not retrying");
            return Resolution::new(previous, Outcome::PreviouslyFailed);
        }

        let Some(refresh_token) = previous.refresh_token() else {
            warn!(outcome = %Outcome::MissingRefreshToken, "refresh token is missing");
            return Resolution::new(previous.flagged(), Outcome::MissingRefreshToken);
        };

        match self.refresher.refresh(refresh_token).await {
            Ok(tokens) => {
                let refreshed = previous.refreshed(tokens, self.clock.now());
                info!(
                    outcome = %Outcome::Refreshed,
                    expires_at = ?refreshed.expires_at(),
                    "access token refreshed"
                );
                Resolution::new(refreshed, Outcome::Refreshed)
            }
            Err(report) => {
                warn!(outcome = %Outcome::RefreshFailed, error = %report, "error refreshing access token");
                Resolution::new(previous.flagged(), Outcome::RefreshFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefreshError;
    use crate::record::{Profile, TokenError};
    use crate::refresh::RefreshedTokens;
    use async_trait::async_trait;
    use keygate_core::{EpochSeconds, ManualClock};
    use pretty_assertions::assert_eq;
    use rootcause::prelude::Report;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const NOW: EpochSeconds = EpochSeconds::new(1_700_000_000);

    /// Scripted refresh executor that records every call.
    struct StubRefresher {
        response: Result<RefreshedTokens, RefreshError>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl StubRefresher {
        fn succeeding(access_token: &str, expires_in: u64, refresh_token: Option<&str>) -> Self {
            Self::with_response(Ok(RefreshedTokens {
                access_token: access_token.to_string(),
                expires_in,
                refresh_token: refresh_token.map(str::to_string),
            }))
        }

        fn failing(error: RefreshError) -> Self {
            Self::with_response(Err(error))
        }

        fn with_response(response: Result<RefreshedTokens, RefreshError>) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(
            &self,
            refresh_token: &str,
        ) -> Result<RefreshedTokens, Report<RefreshError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .expect("lock")
                .push(refresh_token.to_string());
            self.response.clone().map_err(Into::into)
        }
    }

    type StubLifecycle = TokenLifecycle<Arc<StubRefresher>, ManualClock>;

    fn lifecycle(refresher: StubRefresher) -> (StubLifecycle, Arc<StubRefresher>) {
        let refresher = Arc::new(refresher);
        (
            TokenLifecycle::with_clock(refresher.clone(), ManualClock::new(NOW)),
            refresher,
        )
    }

    fn record(expires_at: EpochSeconds, refresh_token: Option<&str>) -> TokenRecord {
        TokenRecord::default()
            .with_access_token("a1".to_string(), expires_at)
            .with_refresh_token(refresh_token.map(str::to_string))
            .with_profile(Some(Profile::new("user-1")))
    }

    fn grant() -> FreshGrant {
        FreshGrant {
            access_token: "fresh".to_string(),
            expires_at: NOW.plus_secs(300),
            refresh_token: Some("fresh-refresh".to_string()),
            profile: Profile::new("user-2"),
        }
    }

    #[tokio::test]
    async fn valid_record_is_reused_without_network_call() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.plus_secs(1), Some("r1"));

        let resolution = controller.resolve(Some(&previous), None).await;

        assert_eq!(resolution.outcome(), Outcome::Reused);
        assert_eq!(resolution.record(), &previous);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn reuse_is_idempotent_byte_for_byte() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.plus_secs(60), Some("r1"));

        let first = controller.resolve(Some(&previous), None).await.into_record();
        let second = controller.resolve(Some(&first), None).await.into_record();

        assert_eq!(
            serde_json::to_vec(&first).expect("serialize"),
            serde_json::to_vec(&second).expect("serialize")
        );
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn expiry_equal_to_now_triggers_refresh() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW, Some("r1"));

        let resolution = controller.resolve(Some(&previous), None).await;

        assert_eq!(resolution.outcome(), Outcome::Refreshed);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_record_refreshes_exactly_once_with_its_refresh_token() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.minus_secs(10), Some("r1"));

        controller.resolve(Some(&previous), None).await;

        assert_eq!(refresher.calls(), 1);
        assert_eq!(refresher.seen(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn scenario_a_refresh_without_rotation() {
        let (controller, _) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.minus_secs(10), Some("r1"));

        let resolution = controller.resolve(Some(&previous), None).await;

        let expected = record(NOW.plus_secs(3600), Some("r1")).with_access_token(
            "a2".to_string(),
            NOW.plus_secs(3600),
        );
        assert_eq!(resolution.outcome(), Outcome::Refreshed);
        assert_eq!(resolution.record(), &expected);
        assert_eq!(resolution.record().error(), None);
    }

    #[tokio::test]
    async fn rotated_refresh_token_replaces_previous() {
        let (controller, _) = lifecycle(StubRefresher::succeeding("a2", 60, Some("r2")));
        let previous = record(NOW.minus_secs(10), Some("r1"));

        let next = controller.resolve(Some(&previous), None).await.into_record();

        assert_eq!(next.refresh_token(), Some("r2"));
        assert_eq!(next.expires_at(), Some(NOW.plus_secs(60)));
    }

    #[tokio::test]
    async fn scenario_b_missing_refresh_token_flags_without_call() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = TokenRecord::default().with_expires_at(Some(NOW.minus_secs(10)));

        let resolution = controller.resolve(Some(&previous), None).await;

        assert_eq!(resolution.outcome(), Outcome::MissingRefreshToken);
        assert_eq!(
            resolution.record(),
            &previous.clone().with_error(Some(TokenError::RefreshTokenError))
        );
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn absent_expiry_and_refresh_token_flags_without_call() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));

        let resolution = controller.resolve(None, None).await;

        assert_eq!(resolution.outcome(), Outcome::MissingRefreshToken);
        assert_eq!(
            resolution.record().error(),
            Some(TokenError::RefreshTokenError)
        );
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn absent_expiry_with_refresh_token_refreshes() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 120, None));
        let previous = TokenRecord::default().with_refresh_token(Some("r1".to_string()));

        let next = controller.resolve(Some(&previous), None).await.into_record();

        assert_eq!(refresher.calls(), 1);
        assert_eq!(next.access_token(), Some("a2"));
        assert_eq!(next.expires_at(), Some(NOW.plus_secs(120)));
    }

    #[tokio::test]
    async fn scenario_c_network_failure_flags_and_keeps_tokens() {
        let (controller, refresher) = lifecycle(StubRefresher::failing(RefreshError::Transport {
            reason: "connection refused".to_string(),
        }));
        let previous = record(NOW.minus_secs(10), Some("r1"));

        let resolution = controller.resolve(Some(&previous), None).await;

        assert_eq!(resolution.outcome(), Outcome::RefreshFailed);
        assert_eq!(resolution.record(), &previous.flagged());
        assert_eq!(resolution.record().access_token(), Some("a1"));
        assert_eq!(resolution.record().refresh_token(), Some("r1"));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn every_refresh_failure_kind_flags_the_same_way() {
        let failures = [
            RefreshError::Timeout,
            RefreshError::Rejected {
                status: 400,
                body: "invalid_grant".to_string(),
            },
            RefreshError::MalformedResponse {
                reason: "expected value".to_string(),
            },
        ];

        for failure in failures {
            let (controller, _) = lifecycle(StubRefresher::failing(failure));
            let previous = record(NOW.minus_secs(10), Some("r1"));

            let resolution = controller.resolve(Some(&previous), None).await;

            assert_eq!(resolution.outcome(), Outcome::RefreshFailed);
            assert_eq!(resolution.record(), &previous.flagged());
        }
    }

    #[tokio::test]
    async fn flagged_record_is_not_refreshed_again() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.minus_secs(10), Some("r1")).flagged();

        let resolution = controller.resolve(Some(&previous), None).await;

        assert_eq!(resolution.outcome(), Outcome::PreviouslyFailed);
        assert_eq!(resolution.record(), &previous);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn flagged_but_unexpired_record_is_reused_with_its_error() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.plus_secs(30), Some("r1")).flagged();

        let resolution = controller.resolve(Some(&previous), None).await;

        assert_eq!(resolution.outcome(), Outcome::Reused);
        assert_eq!(resolution.record(), &previous);
        assert_eq!(
            resolution.record().error(),
            Some(TokenError::RefreshTokenError)
        );
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn scenario_d_fresh_grant_replaces_flagged_record() {
        let (controller, refresher) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.minus_secs(10), Some("r1")).flagged();

        let resolution = controller.resolve(Some(&previous), Some(grant())).await;

        assert_eq!(resolution.outcome(), Outcome::Minted);
        assert_eq!(resolution.record(), &TokenRecord::from_grant(grant()));
        assert_eq!(resolution.record().error(), None);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_grant_wins_over_still_valid_record() {
        let (controller, _) = lifecycle(StubRefresher::succeeding("a2", 3600, None));
        let previous = record(NOW.plus_secs(3600), Some("r1"));

        let next = controller
            .resolve(Some(&previous), Some(grant()))
            .await
            .into_record();

        assert_eq!(next.access_token(), Some("fresh"));
        assert_eq!(next.profile().map(|p| p.sub.as_str()), Some("user-2"));
    }

    #[tokio::test]
    async fn refreshed_record_is_reused_until_it_expires() {
        let refresher = Arc::new(StubRefresher::succeeding("a2", 100, None));
        let clock = Arc::new(ManualClock::new(NOW));
        let controller = TokenLifecycle::with_clock(refresher.clone(), clock.clone());
        let previous = record(NOW.minus_secs(1), Some("r1"));

        let refreshed = controller.resolve(Some(&previous), None).await.into_record();
        clock.advance(99);
        let reused = controller.resolve(Some(&refreshed), None).await;
        clock.advance(1);
        let expired = controller.resolve(Some(reused.record()), None).await;

        assert_eq!(reused.outcome(), Outcome::Reused);
        assert_eq!(expired.outcome(), Outcome::Refreshed);
        assert_eq!(refresher.calls(), 2);
    }
}
