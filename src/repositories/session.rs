use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::session::Session,
};

/// A helper function to map a `tokio_postgres::Row` to a `Session`.
fn row_to_session(row: &Row) -> Result<Session> {
    Ok(Session {
        token: row.try_get("token").map_err(|_| AppError::MissingData("token".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        issued_at: row.try_get("issued_at").map_err(|_| AppError::MissingData("issued_at".to_string()))?,
        expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
    })
}

/// Inserts a new session row.
pub async fn insert_session(
    pool: &Pool,
    token: &str,
    user_id: &Uuid,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            INSERT INTO sessions (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
            &[&token, user_id, &expires_at],
        )
        .await?;
    Ok(())
}

/// Finds a session by token, rejecting expired rows in the query itself so an
/// expired-but-not-yet-swept token is never accepted.
pub async fn find_valid(pool: &Pool, token: &str) -> Result<Option<Session>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM sessions
            WHERE token = $1 AND expires_at > now()
            "#,
            &[&token],
        )
        .await?;
    row.map(|r| row_to_session(&r)).transpose()
}

/// Deletes a session row. Returns whether it existed.
pub async fn delete_session(pool: &Pool, token: &str) -> Result<bool> {
    let client = pool.get().await?;
    let deleted = client
        .execute(
            r#"
            DELETE FROM sessions
            WHERE token = $1
            "#,
            &[&token],
        )
        .await?;
    Ok(deleted > 0)
}

/// Deletes all sessions whose expiry has passed. Returns the number removed.
pub async fn sweep_expired(pool: &Pool) -> Result<u64> {
    let client = pool.get().await?;
    let swept = client
        .execute(
            r#"
            DELETE FROM sessions
            WHERE expires_at <= now()
            "#,
            &[],
        )
        .await?;
    Ok(swept)
}
