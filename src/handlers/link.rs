use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tower_cookies::Cookies;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    handlers::auth::{create_session_cookie, SessionResponse},
    middleware_layer::auth::AuthUser,
    state::AppState,
};

/// The response payload for code-issuing requests.
#[derive(Serialize)]
pub struct CodeResponse {
    pub code: String,
    pub expires_in_minutes: i64,
}

/// The request payload for redeeming a code or token.
#[derive(Deserialize, Debug)]
pub struct RedeemRequest {
    pub code: String,
}

/// Issues a short link code for the authenticated user, to be typed into
/// another channel (e.g. shown in Discord, entered in the browser).
#[axum::debug_handler]
pub async fn issue_link_code(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let code = state.codes.issue_link_code(auth.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CodeResponse {
            code,
            expires_in_minutes: state.config.code_ttl_minutes,
        }),
    ))
}

/// Redeems a link code: consumes it and signs the caller in as its owner.
#[axum::debug_handler]
pub async fn redeem_link_code(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RedeemRequest>,
) -> Result<Response> {
    let user_id = state
        .codes
        .validate_link_code(&payload.code)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    let token = state.sessions.issue(user_id).await?;
    cookies.add(create_session_cookie(
        token.clone(),
        state.config.session_ttl_days,
    ));
    tracing::info!("Link code redeemed for user {}", user_id);

    Ok((StatusCode::OK, Json(SessionResponse { uid: user_id, token })).into_response())
}

/// Issues an opaque connect token for the authenticated user.
#[axum::debug_handler]
pub async fn issue_connect_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let code = state.codes.issue_connect_token(auth.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CodeResponse {
            code,
            expires_in_minutes: state.config.code_ttl_minutes,
        }),
    ))
}

/// Redeems a connect token: consumes it and signs the caller in as its owner.
#[axum::debug_handler]
pub async fn redeem_connect_token(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RedeemRequest>,
) -> Result<Response> {
    let user_id = state
        .codes
        .validate_connect_token(&payload.code)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    let token = state.sessions.issue(user_id).await?;
    cookies.add(create_session_cookie(
        token.clone(),
        state.config.session_ttl_days,
    ));
    tracing::info!("Connect token redeemed for user {}", user_id);

    Ok((StatusCode::OK, Json(SessionResponse { uid: user_id, token })).into_response())
}
