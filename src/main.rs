use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware::from_fn_with_state,
};

use http::{Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::CorsLayer,
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod crypto {
    pub mod tokens;
}

mod models {
    pub mod user;
    pub mod session;
    pub mod code;
    pub mod medication;
}

mod repositories {
    pub mod user;
    pub mod session;
    pub mod code;
    pub mod medication;
}

mod services {
    pub mod sessions;
    pub mod codes;
    pub mod accounts;
    pub mod medications;
    pub mod reminders;
}

mod realtime {
    pub mod message;
    pub mod registry;
    pub mod gateway;
}

mod handlers {
    pub mod auth;
    pub mod link;
    pub mod medications;
}

mod middleware_layer {
    pub mod auth;
}

mod validation {
    pub mod auth;
    pub mod medications;
}

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)?;
    tracing::info!("✅ AppState initialized");

    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:5173".parse().unwrap(),
            "http://127.0.0.1:5173".parse().unwrap(),
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::COOKIE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    // Credential-issuing and code-redeeming routes are the guessable surface
    // (six-digit link codes in particular), so they get a tight limiter.
    let credential_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(5)
            .burst_size(20)
            .use_headers()
            .finish()
            .unwrap(),
    );

    let credential_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/discord", post(handlers::auth::discord_login))
        .route(
            "/api/link-codes/redeem",
            post(handlers::link::redeem_link_code),
        )
        .route(
            "/api/connect-tokens/redeem",
            post(handlers::link::redeem_connect_token),
        )
        .layer(tower_governor::GovernorLayer::new(
            credential_governor_conf.clone(),
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route("/api/auth/me", delete(handlers::auth::delete_account))
        .route("/api/auth/discord", put(handlers::auth::link_discord))
        .route("/api/link-codes", post(handlers::link::issue_link_code))
        .route(
            "/api/connect-tokens",
            post(handlers::link::issue_connect_token),
        )
        .route(
            "/api/medications",
            get(handlers::medications::list_medications),
        )
        .route(
            "/api/medications",
            post(handlers::medications::create_medication),
        )
        .route(
            "/api/medications/{medication_id}",
            put(handlers::medications::update_medication),
        )
        .route(
            "/api/medications/{medication_id}",
            delete(handlers::medications::delete_medication),
        )
        .route(
            "/api/medications/{medication_id}/taken",
            post(handlers::medications::mark_taken),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    // The push gateway authenticates inside the upgrade (token travels as a
    // query parameter), so it sits outside the cookie middleware.
    let push_routes = Router::new()
        .route("/ws", get(realtime::gateway::ws_handler))
        .with_state(state.clone());

    let app = Router::new()
        .merge(credential_routes)
        .merge(protected_routes)
        .merge(push_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors);

    let sweep_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            tracing::info!("🧹 Running scheduled sweep of expired credentials...");
            match sweep_state.sessions.sweep().await {
                Ok(swept) => tracing::info!("✅ Swept {} expired sessions", swept),
                Err(e) => tracing::error!("❌ Session sweep failed: {}", e),
            }
            match sweep_state.codes.sweep().await {
                Ok(swept) => tracing::info!("✅ Swept {} expired codes", swept),
                Err(e) => tracing::error!("❌ Code sweep failed: {}", e),
            }
        }
    });

    tokio::spawn(services::reminders::run_reminder_loop(state.clone()));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Credential sweep and reminder dispatch started");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let shutdown_state = state.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("👋 Shutdown signal received");
        shutdown_state.registry.broadcast("Server shutting down");
    })
    .await?;

    Ok(())
}
