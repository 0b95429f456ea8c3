use chrono::NaiveTime;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::medication::Medication,
};

/// A helper function to map a `tokio_postgres::Row` to a `Medication`.
fn row_to_medication(row: &Row) -> Result<Medication> {
    Ok(Medication {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        dose: row.try_get("dose").map_err(|_| AppError::MissingData("dose".to_string()))?,
        schedule_time: row.try_get("schedule_time").map_err(|_| AppError::MissingData("schedule_time".to_string()))?,
        timezone: row.try_get("timezone").map_err(|_| AppError::MissingData("timezone".to_string()))?,
        taken_today: row.try_get("taken_today").map_err(|_| AppError::MissingData("taken_today".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

/// Creates a new medication row.
pub async fn create_medication(
    pool: &Pool,
    id: Uuid,
    user_id: &Uuid,
    name: &str,
    dose: Option<&str>,
    schedule_time: NaiveTime,
    timezone: &str,
) -> Result<Medication> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO medications (id, user_id, name, dose, schedule_time, timezone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
            &[&id, user_id, &name, &dose, &schedule_time, &timezone],
        )
        .await?;
    row_to_medication(&row)
}

/// Lists a user's medications, newest first.
pub async fn list_for_user(pool: &Pool, user_id: &Uuid) -> Result<Vec<Medication>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT *
            FROM medications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
            &[user_id],
        )
        .await?;
    rows.iter().map(row_to_medication).collect()
}

/// Finds a medication owned by the given user.
pub async fn find_by_id(pool: &Pool, id: &Uuid, user_id: &Uuid) -> Result<Option<Medication>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT *
            FROM medications
            WHERE id = $1 AND user_id = $2
            "#,
            &[id, user_id],
        )
        .await?;
    row.map(|r| row_to_medication(&r)).transpose()
}

/// Updates a medication's fields. Returns the updated row, or `None` when no
/// such medication belongs to the user.
pub async fn update_medication(
    pool: &Pool,
    id: &Uuid,
    user_id: &Uuid,
    name: &str,
    dose: Option<&str>,
    schedule_time: NaiveTime,
    timezone: &str,
) -> Result<Option<Medication>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            UPDATE medications
            SET name = $3, dose = $4, schedule_time = $5, timezone = $6,
                taken_today = false, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
            &[id, user_id, &name, &dose, &schedule_time, &timezone],
        )
        .await?;
    row.map(|r| row_to_medication(&r)).transpose()
}

/// Deletes a medication. Returns whether it existed for the user.
pub async fn delete_medication(pool: &Pool, id: &Uuid, user_id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let deleted = client
        .execute(
            r#"
            DELETE FROM medications
            WHERE id = $1 AND user_id = $2
            "#,
            &[id, user_id],
        )
        .await?;
    Ok(deleted > 0)
}

/// Marks today's dose as taken. Returns the updated row, or `None` when no
/// such medication belongs to the user.
pub async fn mark_taken(pool: &Pool, id: &Uuid, user_id: &Uuid) -> Result<Option<Medication>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            UPDATE medications
            SET taken_today = true, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
            &[id, user_id],
        )
        .await?;
    row.map(|r| row_to_medication(&r)).transpose()
}

/// Lists untaken medications whose reminder time is exactly `due`.
/// Schedule times are validated to minute resolution, so the reminder poll
/// matches on the truncated minute.
pub async fn list_due_at(pool: &Pool, due: NaiveTime) -> Result<Vec<Medication>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT *
            FROM medications
            WHERE taken_today = false AND schedule_time = $1
            "#,
            &[&due],
        )
        .await?;
    rows.iter().map(row_to_medication).collect()
}
