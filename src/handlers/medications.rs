use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    middleware_layer::auth::AuthUser,
    services::medications as medication_service,
    state::AppState,
    validation::medications::*,
};

/// The request payload for creating or updating a medication.
#[derive(Deserialize, Debug)]
pub struct MedicationRequest {
    pub name: String,
    pub dose: Option<String>,
    /// Reminder time in `HH:MM`.
    pub schedule_time: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Lists the authenticated user's medications.
#[axum::debug_handler]
pub async fn list_medications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let medications = medication_service::list_medications(&state, auth.user_id).await?;
    Ok(Json(medications))
}

/// Creates a medication.
#[axum::debug_handler]
pub async fn create_medication(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<MedicationRequest>,
) -> Result<Response> {
    validate_name(&req.name)?;
    validate_dose(req.dose.as_deref())?;
    let schedule_time = parse_schedule_time(&req.schedule_time)?;
    let timezone = req.timezone.unwrap_or_else(|| "UTC".to_string());
    validate_timezone(&timezone)?;

    let medication = medication_service::create_medication(
        &state,
        auth.user_id,
        req.name,
        req.dose,
        schedule_time,
        timezone,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(medication)).into_response())
}

/// Updates a medication.
#[axum::debug_handler]
pub async fn update_medication(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(medication_id): Path<Uuid>,
    Json(req): Json<MedicationRequest>,
) -> Result<Response> {
    validate_name(&req.name)?;
    validate_dose(req.dose.as_deref())?;
    let schedule_time = parse_schedule_time(&req.schedule_time)?;
    let timezone = req.timezone.unwrap_or_else(|| "UTC".to_string());
    validate_timezone(&timezone)?;

    let medication = medication_service::update_medication(
        &state,
        auth.user_id,
        medication_id,
        req.name,
        req.dose,
        schedule_time,
        timezone,
    )
    .await?;

    Ok((StatusCode::OK, Json(medication)).into_response())
}

/// Deletes a medication.
#[axum::debug_handler]
pub async fn delete_medication(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(medication_id): Path<Uuid>,
) -> Result<Response> {
    medication_service::delete_medication(&state, auth.user_id, medication_id).await?;

    let body = sonic_rs::to_string(&sonic_rs::json!({
        "success": true,
        "message": "Medication deleted"
    }))
    .unwrap_or_else(|_| r#"{"success":true}"#.to_string());
    Ok((StatusCode::OK, body).into_response())
}

/// Marks today's dose as taken, cancelling the pending follow-up reminder.
#[axum::debug_handler]
pub async fn mark_taken(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(medication_id): Path<Uuid>,
) -> Result<Response> {
    let medication = medication_service::mark_taken(&state, auth.user_id, medication_id).await?;
    Ok((StatusCode::OK, Json(medication)).into_response())
}
