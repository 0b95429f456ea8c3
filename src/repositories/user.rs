use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::user::{CreatedVia, User},
};

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    let created_via: String = row.try_get("created_via").map_err(|_| AppError::MissingData("created_via".to_string()))?;
    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        discord_id: row.try_get("discord_id").map_err(|_| AppError::MissingData("discord_id".to_string()))?,
        created_via: CreatedVia::parse(&created_via)
            .ok_or_else(|| AppError::MissingData("created_via".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
    })
}

/// Creates a new user in the database.
pub async fn create_user(
    pool: &Pool,
    id: Uuid,
    discord_id: Option<&str>,
    created_via: CreatedVia,
) -> Result<User> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO users (id, discord_id, created_via)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
            &[&id, &discord_id, &created_via.as_str()],
        )
        .await?;
    row_to_user(&row)
}

/// Finds a user by their ID.
pub async fn find_by_id(pool: &Pool, user_id: &Uuid) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM users
            WHERE id = $1
            "#,
            &[user_id],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Finds a user by their linked Discord account ID.
pub async fn find_by_discord_id(pool: &Pool, discord_id: &str) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM users
            WHERE discord_id = $1
            "#,
            &[&discord_id],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Returns whether a user row exists.
pub async fn exists(pool: &Pool, user_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT 1
            FROM users
            WHERE id = $1
            "#,
            &[user_id],
        )
        .await?;
    Ok(row.is_some())
}

/// Links a Discord account ID to a user.
///
/// The unique index on `discord_id` is the arbiter under concurrent linking:
/// a duplicate-key failure surfaces as `Conflict`.
pub async fn link_discord_id(pool: &Pool, user_id: &Uuid, discord_id: &str) -> Result<()> {
    let client = pool.get().await?;
    let result = client
        .execute(
            r#"
            UPDATE users
            SET discord_id = $1
            WHERE id = $2
            "#,
            &[&discord_id, user_id],
        )
        .await;

    match result {
        Ok(0) => Err(AppError::NotFound),
        Ok(_) => Ok(()),
        Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(AppError::Conflict(
            "Discord account is already linked to another user".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Deletes a user. Sessions, codes, and medications cascade.
pub async fn delete_user(pool: &Pool, user_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let deleted = client
        .execute(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
            &[user_id],
        )
        .await?;
    Ok(deleted > 0)
}
