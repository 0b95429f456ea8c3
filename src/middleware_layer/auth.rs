use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// The name of the session cookie.
pub const SESSION_COOKIE: &str = "session_token";

/// The authenticated identity resolved from the session cookie, inserted
/// into request extensions by `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// A middleware that requires a valid session to be present.
///
/// Every request re-checks the store; token validity is never cached in
/// memory, so revocation takes effect on the next request.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = cookies
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| {
            tracing::debug!("No session cookie on request");
            AppError::Unauthenticated
        })?;

    match state.sessions.validate(&token).await? {
        Some(user_id) => {
            tracing::debug!("Authenticated request for user {}", user_id);
            request.extensions_mut().insert(AuthUser { user_id });
            Ok(next.run(request).await)
        }
        None => {
            // The credential is stale; clear it so the client stops sending it.
            let mut stale = Cookie::new(SESSION_COOKIE, "");
            stale.set_path("/");
            cookies.remove(stale);
            Err(AppError::Unauthenticated)
        }
    }
}
