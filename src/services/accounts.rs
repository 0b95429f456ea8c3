use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::{CreatedVia, User};
use crate::repositories::user as user_repo;

/// Creates a user via direct signup.
pub async fn create_user(db: &Pool, created_via: CreatedVia) -> Result<User> {
    let user = user_repo::create_user(db, Uuid::new_v4(), None, created_via).await?;
    tracing::info!("User created with ID: {}", user.id);
    Ok(user)
}

/// Resolves a Discord identity to a user, creating the account on first
/// contact. Returns the user and whether it was just created.
pub async fn find_or_create_by_discord_id(db: &Pool, discord_id: &str) -> Result<(User, bool)> {
    if let Some(user) = user_repo::find_by_discord_id(db, discord_id).await? {
        return Ok((user, false));
    }

    // Two first contacts can race here; the unique index on discord_id
    // arbitrates and the loser re-reads the winner's row.
    match user_repo::create_user(db, Uuid::new_v4(), Some(discord_id), CreatedVia::Discord).await {
        Ok(user) => {
            tracing::info!("User created for Discord identity: {}", user.id);
            Ok((user, true))
        }
        Err(AppError::Database(ref e)) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
            user_repo::find_by_discord_id(db, discord_id)
                .await?
                .map(|user| (user, false))
                .ok_or_else(|| {
                    AppError::Internal("Discord identity vanished during creation".to_string())
                })
        }
        Err(e) => Err(e),
    }
}

/// Links a Discord identity to an existing user.
///
/// Surfaced as `Conflict` when the identity already belongs to a different
/// user; an existing link is never silently overwritten. Re-linking the same
/// identity to the same user is a no-op.
pub async fn link_discord(db: &Pool, user_id: Uuid, discord_id: &str) -> Result<()> {
    if let Some(owner) = user_repo::find_by_discord_id(db, discord_id).await? {
        if owner.id == user_id {
            return Ok(());
        }
        return Err(AppError::Conflict(
            "Discord account is already linked to another user".to_string(),
        ));
    }

    user_repo::link_discord_id(db, &user_id, discord_id).await?;
    tracing::info!("Linked Discord identity to user {}", user_id);
    Ok(())
}

/// Fetches a user, failing with `NotFound` when absent.
pub async fn get_user(db: &Pool, user_id: Uuid) -> Result<User> {
    user_repo::find_by_id(db, &user_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// Deletes a user. Sessions, codes, and medications cascade in the store.
pub async fn delete_account(db: &Pool, user_id: Uuid) -> Result<()> {
    if !user_repo::delete_user(db, &user_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!("Deleted user {}", user_id);
    Ok(())
}
