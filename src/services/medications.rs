use chrono::NaiveTime;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::medication::Medication,
    realtime::message::{EventKind, PushEvent},
    repositories::medication as medication_repo,
    state::AppState,
};

fn medication_event(kind: EventKind, medication_id: Uuid) -> PushEvent {
    PushEvent {
        kind,
        payload: Some(sonic_rs::json!({
            "medication_id": medication_id.to_string()
        })),
    }
}

/// Creates a medication and notifies the user's live connections.
///
/// Notification happens after persistence succeeds and is best-effort; a
/// user with no open push connections still gets a successful mutation.
pub async fn create_medication(
    state: &AppState,
    user_id: Uuid,
    name: String,
    dose: Option<String>,
    schedule_time: NaiveTime,
    timezone: String,
) -> Result<Medication> {
    let medication = medication_repo::create_medication(
        &state.db,
        Uuid::new_v4(),
        &user_id,
        &name,
        dose.as_deref(),
        schedule_time,
        &timezone,
    )
    .await?;

    state
        .registry
        .notify(user_id, medication_event(EventKind::MedicationCreated, medication.id));
    Ok(medication)
}

/// Lists a user's medications.
pub async fn list_medications(state: &AppState, user_id: Uuid) -> Result<Vec<Medication>> {
    medication_repo::list_for_user(&state.db, &user_id).await
}

/// Updates a medication, cancels any pending follow-up reminder for it, and
/// notifies the user's live connections.
pub async fn update_medication(
    state: &AppState,
    user_id: Uuid,
    medication_id: Uuid,
    name: String,
    dose: Option<String>,
    schedule_time: NaiveTime,
    timezone: String,
) -> Result<Medication> {
    let medication = medication_repo::update_medication(
        &state.db,
        &medication_id,
        &user_id,
        &name,
        dose.as_deref(),
        schedule_time,
        &timezone,
    )
    .await?
    .ok_or(AppError::NotFound)?;

    state.reminders.cancel(user_id, medication_id);
    state
        .registry
        .notify(user_id, medication_event(EventKind::MedicationUpdated, medication.id));
    Ok(medication)
}

/// Deletes a medication, cancels any pending follow-up reminder, and
/// notifies the user's live connections.
pub async fn delete_medication(state: &AppState, user_id: Uuid, medication_id: Uuid) -> Result<()> {
    if !medication_repo::delete_medication(&state.db, &medication_id, &user_id).await? {
        return Err(AppError::NotFound);
    }

    state.reminders.cancel(user_id, medication_id);
    state
        .registry
        .notify(user_id, medication_event(EventKind::MedicationDeleted, medication_id));
    Ok(())
}

/// Marks today's dose as taken. The pending follow-up reminder is cancelled
/// before it can fire, then the user's live connections are notified.
pub async fn mark_taken(state: &AppState, user_id: Uuid, medication_id: Uuid) -> Result<Medication> {
    let medication = medication_repo::mark_taken(&state.db, &medication_id, &user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    state.reminders.cancel(user_id, medication_id);
    state
        .registry
        .notify(user_id, medication_event(EventKind::MedicationTaken, medication.id));
    Ok(medication)
}
