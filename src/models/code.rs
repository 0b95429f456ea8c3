use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The purpose a single-use code was issued for. Kinds are separate code
/// spaces: a code issued for one kind can never be redeemed for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// Short human-typeable code bridging the Discord channel to a browser.
    Link,
    /// Opaque token handed to a client that connects on its own.
    Connect,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Link => "link",
            CodeKind::Connect => "connect",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(CodeKind::Link),
            "connect" => Some(CodeKind::Connect),
            _ => None,
        }
    }
}

/// A single-use, short-lived credential row.
#[derive(Debug, Clone)]
pub struct EphemeralCode {
    /// The code or token value.
    pub code: String,
    /// The code space this value lives in.
    pub kind: CodeKind,
    /// The ID of the user this code was issued for.
    pub user_id: Uuid,
    /// The timestamp when the code expires.
    pub expires_at: DateTime<Utc>,
}

impl EphemeralCode {
    /// Whether the code has passed its expiry horizon at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
