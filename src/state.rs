use deadpool_postgres::Pool;
use std::sync::Arc;
use crate::config::Config;
use crate::error::Result;
use crate::realtime::registry::ConnectionRegistry;
use crate::services::codes::CodeIssuer;
use crate::services::reminders::ReminderTimers;
use crate::services::sessions::SessionManager;

/// The application's state.
///
/// Services are constructed here once, at process start, and handed to the
/// boundary layers by handle. Nothing is a module-level singleton, so tests
/// can build isolated instances.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The application's configuration.
    pub config: Config,
    /// Issues and validates session tokens.
    pub sessions: SessionManager,
    /// Issues and redeems link codes and connect tokens.
    pub codes: CodeIssuer,
    /// The live push-connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Pending follow-up reminder timers.
    pub reminders: ReminderTimers,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized with deadpool-postgres");

        let sessions = SessionManager::new(db.clone(), config.session_ttl_days);
        let codes = CodeIssuer::new(db.clone(), config.code_ttl_minutes);
        let registry = Arc::new(ConnectionRegistry::new());
        let reminders = ReminderTimers::new();
        tracing::info!("✅ Session manager, code issuer, and connection registry initialized");

        Ok(AppState {
            db,
            config: config.clone(),
            sessions,
            codes,
            registry,
            reminders,
        })
    }
}
