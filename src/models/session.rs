use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A long-lived session credential row.
///
/// The token itself is the primary key; it is opaque, high-entropy, and never
/// derived from user data.
#[derive(Debug, Clone)]
pub struct Session {
    /// The opaque session token.
    pub token: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The timestamp when the session was issued.
    pub issued_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session has passed its expiry horizon at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_with_ttl(days: i64) -> Session {
        let issued = Utc::now();
        Session {
            token: "tok".to_string(),
            user_id: Uuid::new_v4(),
            issued_at: issued,
            expires_at: issued + Duration::days(days),
        }
    }

    #[test]
    fn valid_until_the_horizon_elapses() {
        let session = session_with_ttl(30);
        assert!(!session.is_expired(session.issued_at));
        assert!(!session.is_expired(session.issued_at + Duration::days(29)));
    }

    #[test]
    fn invalid_once_the_horizon_has_passed() {
        let session = session_with_ttl(30);
        assert!(session.is_expired(session.issued_at + Duration::days(30)));
        assert!(session.is_expired(session.issued_at + Duration::days(31)));
    }
}
