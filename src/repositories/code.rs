use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::code::{CodeKind, EphemeralCode},
};

/// A helper function to map a `tokio_postgres::Row` to an `EphemeralCode`.
fn row_to_code(row: &Row) -> Result<EphemeralCode> {
    let kind: String = row.try_get("kind").map_err(|_| AppError::MissingData("kind".to_string()))?;
    Ok(EphemeralCode {
        code: row.try_get("code").map_err(|_| AppError::MissingData("code".to_string()))?,
        kind: CodeKind::parse(&kind).ok_or_else(|| AppError::MissingData("kind".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
    })
}

/// Inserts a new ephemeral code.
///
/// Returns `false` when the `(kind, code)` slot is held by another unexpired
/// code, in which case the caller generates a fresh value and retries. An
/// expired occupant is overwritten in place.
pub async fn insert_code(
    pool: &Pool,
    kind: CodeKind,
    code: &str,
    user_id: &Uuid,
    expires_at: DateTime<Utc>,
) -> Result<bool> {
    let client = pool.get().await?;
    let inserted = client
        .execute(
            r#"
            INSERT INTO ephemeral_codes (kind, code, user_id, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, code) DO UPDATE
            SET user_id = EXCLUDED.user_id, expires_at = EXCLUDED.expires_at
            WHERE ephemeral_codes.expires_at <= now()
            "#,
            &[&kind.as_str(), &code, user_id, &expires_at],
        )
        .await?;
    Ok(inserted > 0)
}

/// Atomically consumes a code: the row is deleted in the same statement that
/// resolves it, so of N concurrent redeemers exactly one gets the row back.
///
/// Unknown and expired codes both come back as `None` with no mutation.
pub async fn consume_code(
    pool: &Pool,
    kind: CodeKind,
    code: &str,
) -> Result<Option<EphemeralCode>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            DELETE FROM ephemeral_codes
            WHERE kind = $1 AND code = $2 AND expires_at > now()
            RETURNING *
            "#,
            &[&kind.as_str(), &code],
        )
        .await?;
    row.map(|r| row_to_code(&r)).transpose()
}

/// Deletes all codes whose expiry has passed. Returns the number removed.
pub async fn sweep_expired(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let swept = client
        .execute(
            r#"
            DELETE FROM ephemeral_codes
            WHERE expires_at <= now()
            "#,
            &[],
        )
        .await?;
    Ok(swept)
}
