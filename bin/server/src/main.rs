use keygate_server::{
    app,
    auth::{AppState, OidcClient},
    config::ServerConfig,
};
use keygate_session::{HttpTokenRefresher, TokenLifecycle};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is not an error
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(report) => {
            tracing::error!("Failed to load configuration: {}", report);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Loaded configuration");

    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid listen address: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let refresher = match HttpTokenRefresher::new(&config.oidc) {
        Ok(refresher) => refresher,
        Err(report) => {
            tracing::error!("Failed to create token refresher: {}", report);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(token_endpoint = %refresher.token_url(), "Configured token refresh");

    // Initialize OIDC client
    tracing::info!("Discovering OIDC provider...");
    let oidc_client = match OidcClient::discover(config.oidc).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to discover OIDC provider: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(
        oidc_client,
        TokenLifecycle::new(refresher),
        config.session,
        &config.auth.secret,
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("  GET  /auth/signin");
    tracing::info!("  GET  /auth/callback");
    tracing::info!("  GET  /auth/session");
    tracing::info!("  POST /auth/signout");
    tracing::info!("  GET  /health");

    if let Err(e) = axum::serve(listener, app::router(state)).await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
