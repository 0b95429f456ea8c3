use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The channel a user account was created through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedVia {
    /// Created on first successful Discord authentication.
    Discord,
    /// Created by direct signup from the dashboard.
    Signup,
}

impl CreatedVia {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatedVia::Discord => "discord",
            CreatedVia::Signup => "signup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discord" => Some(CreatedVia::Discord),
            "signup" => Some(CreatedVia::Signup),
            _ => None,
        }
    }
}

/// Represents a user in the system.
#[derive(Debug, Clone)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The linked Discord account ID, unique across users when present.
    pub discord_id: Option<String>,
    /// The channel the account was created through.
    pub created_via: CreatedVia,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}
