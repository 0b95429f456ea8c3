use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a tracked medication.
#[derive(Debug, Clone, Serialize)]
pub struct Medication {
    /// The unique identifier for the medication.
    pub id: Uuid,
    /// The ID of the user who tracks this medication.
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    /// The medication name.
    pub name: String,
    /// Free-form dose description, e.g. "200mg".
    pub dose: Option<String>,
    /// The daily reminder time (UTC).
    pub schedule_time: NaiveTime,
    /// The user's IANA timezone name, kept for the front-ends.
    pub timezone: String,
    /// Whether today's dose has been marked taken.
    pub taken_today: bool,
    /// The timestamp when the medication was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the medication was last updated.
    pub updated_at: DateTime<Utc>,
}
