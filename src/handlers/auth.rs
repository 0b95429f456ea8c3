use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tower_cookies::{Cookie, Cookies};
use tower_cookies::cookie::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    middleware_layer::auth::{AuthUser, SESSION_COOKIE},
    models::user::{CreatedVia, User},
    services::accounts,
    state::AppState,
    validation::auth::validate_discord_id,
};

/// The request payload for Discord-identity login.
#[derive(Deserialize, Debug)]
pub struct DiscordLoginRequest {
    pub discord_id: String,
}

/// The request payload for linking a Discord identity.
#[derive(Deserialize, Debug)]
pub struct LinkDiscordRequest {
    pub discord_id: String,
}

/// The response payload for session-issuing requests. The token is returned
/// in the body as well as the cookie because the push channel presents it
/// out-of-band (query parameter on upgrade).
#[derive(Serialize)]
pub struct SessionResponse {
    pub uid: Uuid,
    pub token: String,
}

/// The response payload for simple status requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for `GET /api/auth/me`.
#[derive(Serialize)]
pub struct MeResponse {
    pub uid: Uuid,
    pub discord_id: Option<String>,
    pub created_via: CreatedVia,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for MeResponse {
    fn from(user: User) -> Self {
        Self {
            uid: user.id,
            discord_id: user.discord_id,
            created_via: user.created_via,
            created_at: user.created_at,
        }
    }
}

/// Creates the session cookie with the given token and max age.
pub fn create_session_cookie(token: String, max_age_days: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);

    let is_production = std::env::var("APP_ENV")
        .unwrap_or_else(|_| "development".to_string()) == "production";

    cookie.set_http_only(true);
    if is_production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::days(max_age_days));
    cookie.set_path("/");

    cookie
}

fn clear_session_cookie(cookies: &Cookies) {
    let mut stale = Cookie::new(SESSION_COOKIE, "");
    stale.set_max_age(Duration::seconds(0));
    stale.set_path("/");
    cookies.remove(stale);
}

/// Handles direct signup: creates the user and issues a session.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    let user = accounts::create_user(&state.db, CreatedVia::Signup).await?;
    let token = state.sessions.issue(user.id).await?;

    cookies.add(create_session_cookie(
        token.clone(),
        state.config.session_ttl_days,
    ));
    tracing::info!("✅ User registered and session issued: {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            uid: user.id,
            token,
        }),
    )
        .into_response())
}

/// Handles login by Discord identity. The OAuth code exchange happens
/// upstream; this boundary receives the already-verified identity.
#[axum::debug_handler]
pub async fn discord_login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<DiscordLoginRequest>,
) -> Result<Response> {
    validate_discord_id(&payload.discord_id)?;

    let (user, created) =
        accounts::find_or_create_by_discord_id(&state.db, &payload.discord_id).await?;
    let token = state.sessions.issue(user.id).await?;

    cookies.add(create_session_cookie(
        token.clone(),
        state.config.session_ttl_days,
    ));
    tracing::info!("✅ Discord login for user {} (created: {})", user.id, created);

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SessionResponse {
            uid: user.id,
            token,
        }),
    )
        .into_response())
}

/// Handles logout: revokes the presented session and clears cookies.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        state.sessions.revoke(cookie.value()).await?;
    }
    clear_session_cookie(&cookies);
    tracing::info!("👋 User logged out: {}", auth.user_id);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the identity behind the current session.
#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let user = accounts::get_user(&state.db, auth.user_id).await?;
    Ok(Json(MeResponse::from(user)))
}

/// Links a Discord identity to the authenticated user. Fails with 409 when
/// the identity belongs to a different user.
#[axum::debug_handler]
pub async fn link_discord(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<LinkDiscordRequest>,
) -> Result<Response> {
    validate_discord_id(&payload.discord_id)?;
    accounts::link_discord(&state.db, auth.user_id, &payload.discord_id).await?;

    let response = AuthResponse {
        success: true,
        message: "Discord account linked".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Deletes the authenticated user's account. Sessions, codes, and
/// medications cascade in the store.
#[axum::debug_handler]
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    cookies: Cookies,
) -> Result<Response> {
    accounts::delete_account(&state.db, auth.user_id).await?;
    clear_session_cookie(&cookies);

    let response = AuthResponse {
        success: true,
        message: "Account deleted".to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}
