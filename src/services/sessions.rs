use chrono::{Duration, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::crypto::tokens;
use crate::error::{AppError, Result};
use crate::repositories::session as session_repo;
use crate::repositories::user as user_repo;

/// Issues, validates, and revokes long-lived session tokens.
///
/// Constructed once at process start and handed to the boundary layers;
/// tests build their own instances against their own pools.
#[derive(Clone)]
pub struct SessionManager {
    db: Pool,
    ttl: Duration,
}

impl SessionManager {
    /// Creates a new `SessionManager` issuing tokens valid for `ttl_days`.
    pub fn new(db: Pool, ttl_days: i64) -> Self {
        Self {
            db,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Issues a fresh session token for a user.
    ///
    /// Fails with `NotFound` when the user does not exist. Sweeps expired
    /// sessions first, keeping the table bounded as a side effect of normal
    /// traffic.
    pub async fn issue(&self, user_id: Uuid) -> Result<String> {
        session_repo::sweep_expired(&self.db).await?;

        if !user_repo::exists(&self.db, &user_id).await? {
            return Err(AppError::NotFound);
        }

        let token = tokens::generate_opaque_token();
        let expires_at = Utc::now() + self.ttl;
        session_repo::insert_session(&self.db, &token, &user_id, expires_at).await?;

        tracing::info!("🔑 Issued session for user {}", user_id);
        Ok(token)
    }

    /// Resolves a token to its owning user.
    ///
    /// Fails closed: unknown and expired tokens both come back as `None`,
    /// never as an error. The sweep runs before the lookup, so an
    /// expired-but-not-yet-swept token is never accepted; the lookup itself
    /// also rejects expired rows, so correctness does not depend on the
    /// sweep having run.
    pub async fn validate(&self, token: &str) -> Result<Option<Uuid>> {
        session_repo::sweep_expired(&self.db).await?;

        let session = session_repo::find_valid(&self.db, token).await?;
        Ok(session
            .filter(|s| !s.is_expired(Utc::now()))
            .map(|s| s.user_id))
    }

    /// Revokes a token. Returns whether it existed; revoking an
    /// already-revoked token is a no-op returning `false`.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let existed = session_repo::delete_session(&self.db, token).await?;
        if existed {
            tracing::info!("Revoked session token");
        }
        Ok(existed)
    }

    /// Deletes all expired sessions. Also run from the maintenance task so
    /// stale rows stay bounded on idle deployments.
    pub async fn sweep(&self) -> Result<u64> {
        session_repo::sweep_expired(&self.db).await
    }
}
