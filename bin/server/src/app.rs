//! HTTP router assembly.

use axum::{
    Json, Router,
    extract::FromRef,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};

/// Body of the health check response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/signin", get(auth::signin))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/session", get(auth::session))
        .merge(signout_routes())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sign-out only needs the cookie key, so it works with any state that
/// provides one.
///
/// POST only: a cross-site GET (an image tag, a prefetch) must not end
/// the session.
pub fn signout_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Key: FromRef<S>,
{
    Router::new().route("/auth/signout", post(auth::signout))
}

/// Liveness probe.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "OK",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use reqwest::StatusCode;
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        addr
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("client")
    }

    #[tokio::test]
    async fn health_reports_ok_with_timestamp() {
        let Json(body) = health().await;

        assert_eq!(body.status, "OK");
        assert!(DateTime::parse_from_rfc3339(&body.timestamp).is_ok());

        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["status"], "OK");
    }

    #[tokio::test]
    async fn signout_rejects_get() {
        let addr = serve(signout_routes().with_state(Key::generate())).await;

        let response = client()
            .get(format!("http://{addr}/auth/signout"))
            .send()
            .await
            .expect("request");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn signout_post_redirects_home() {
        let addr = serve(signout_routes().with_state(Key::generate())).await;

        let response = client()
            .post(format!("http://{addr}/auth/signout"))
            .send()
            .await
            .expect("request");

        assert!(response.status().is_redirection());
        assert_eq!(
            response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("/")
        );
    }
}
