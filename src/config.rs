use std::env;
use anyhow::{Context, Result};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The lifetime of a session token in days.
    pub session_ttl_days: i64,
    /// The lifetime of link codes and connect tokens in minutes.
    pub code_ttl_minutes: i64,
    /// Push connections with no inbound frame for this long are dropped.
    pub ws_idle_timeout_secs: u64,
    /// Delay before a follow-up reminder fires for an untaken medication.
    pub followup_delay_minutes: i64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            session_ttl_days: env::var("SESSION_TTL_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid SESSION_TTL_DAYS")?,
            code_ttl_minutes: env::var("CODE_TTL_MINUTES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid CODE_TTL_MINUTES")?,
            ws_idle_timeout_secs: env::var("WS_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .context("Invalid WS_IDLE_TIMEOUT_SECS")?,
            followup_delay_minutes: env::var("FOLLOWUP_DELAY_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid FOLLOWUP_DELAY_MINUTES")?,
        })
    }
}
