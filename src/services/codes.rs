use chrono::{Duration, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::crypto::tokens;
use crate::error::{AppError, Result};
use crate::models::code::CodeKind;
use crate::repositories::code as code_repo;
use crate::repositories::user as user_repo;

/// How many times issuance retries a colliding code value. Only realistic
/// for six-digit link codes, and only near space exhaustion.
const MAX_ISSUE_ATTEMPTS: usize = 8;

/// Issues and redeems single-use, short-lived codes.
///
/// Link codes and connect tokens share mechanics but live in separate code
/// spaces (`CodeKind`), so a value issued for one purpose can never be
/// redeemed for the other.
#[derive(Clone)]
pub struct CodeIssuer {
    db: Pool,
    ttl: Duration,
}

impl CodeIssuer {
    /// Creates a new `CodeIssuer` issuing codes valid for `ttl_minutes`.
    pub fn new(db: Pool, ttl_minutes: i64) -> Self {
        Self {
            db,
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issues a short human-typeable link code for a user.
    ///
    /// Multiple outstanding codes per user are permitted; issuing a new one
    /// leaves prior unexpired codes valid.
    pub async fn issue_link_code(&self, user_id: Uuid) -> Result<String> {
        self.issue(user_id, CodeKind::Link).await
    }

    /// Issues an opaque connect token for a user.
    pub async fn issue_connect_token(&self, user_id: Uuid) -> Result<String> {
        self.issue(user_id, CodeKind::Connect).await
    }

    async fn issue(&self, user_id: Uuid, kind: CodeKind) -> Result<String> {
        code_repo::sweep_expired(&self.db).await?;

        if !user_repo::exists(&self.db, &user_id).await? {
            return Err(AppError::NotFound);
        }

        let expires_at = Utc::now() + self.ttl;
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let code = match kind {
                CodeKind::Link => tokens::generate_link_code(),
                CodeKind::Connect => tokens::generate_opaque_token(),
            };
            if code_repo::insert_code(&self.db, kind, &code, &user_id, expires_at).await? {
                tracing::info!("🔑 Issued {} code for user {}", kind.as_str(), user_id);
                return Ok(code);
            }
            tracing::debug!("{} code collision, retrying", kind.as_str());
        }

        Err(AppError::Internal(format!(
            "Could not allocate a unique {} code",
            kind.as_str()
        )))
    }

    /// Redeems a link code, consuming it atomically.
    ///
    /// Unknown, expired, and already-consumed codes all come back as `None`;
    /// under concurrent redemption of the same code only one caller wins.
    pub async fn validate_link_code(&self, code: &str) -> Result<Option<Uuid>> {
        let consumed = code_repo::consume_code(&self.db, CodeKind::Link, code).await?;
        Ok(consumed.map(|c| c.user_id))
    }

    /// Redeems a connect token, consuming it atomically.
    pub async fn validate_connect_token(&self, token: &str) -> Result<Option<Uuid>> {
        let consumed = code_repo::consume_code(&self.db, CodeKind::Connect, token).await?;
        Ok(consumed.map(|c| c.user_id))
    }

    /// Deletes all expired codes.
    pub async fn sweep(&self) -> Result<u64> {
        code_repo::sweep_expired(&self.db).await
    }
}
