use chrono::{Timelike, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::Result;
use crate::realtime::message::{EventKind, PushEvent};
use crate::realtime::registry::ConnectionRegistry;
use crate::repositories::medication as medication_repo;
use crate::state::AppState;

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    next_generation: u64,
    timers: HashMap<(Uuid, Uuid), TimerEntry>,
}

/// Cancellable follow-up reminder timers, keyed by `(user, medication)`.
///
/// Marking a dose taken (or changing the medication) must remove the pending
/// task before it fires. Each scheduled task carries a generation number so
/// a task that fires while being replaced cannot clear its successor's
/// entry. Process-scoped; nothing is persisted.
#[derive(Clone)]
pub struct ReminderTimers {
    inner: Arc<Mutex<Inner>>,
}

impl ReminderTimers {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_generation: 0,
                timers: HashMap::new(),
            })),
        }
    }

    /// Schedules a follow-up reminder, replacing any pending timer for the
    /// same `(user, medication)` key.
    pub fn schedule(
        &self,
        user_id: Uuid,
        medication_id: Uuid,
        delay: Duration,
        registry: Arc<ConnectionRegistry>,
    ) {
        let key = (user_id, medication_id);
        let timers = self.clone();

        let mut inner = self.inner.lock().unwrap();
        let generation = inner.next_generation;
        inner.next_generation += 1;

        if let Some(old) = inner.timers.remove(&key) {
            old.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.notify(
                user_id,
                PushEvent {
                    kind: EventKind::Reminder,
                    payload: Some(sonic_rs::json!({
                        "medication_id": medication_id.to_string(),
                        "followup": true
                    })),
                },
            );
            timers.clear_fired(key, generation);
        });

        inner.timers.insert(key, TimerEntry { generation, handle });
    }

    /// Cancels the pending timer for `(user, medication)`. Returns whether
    /// one was pending.
    pub fn cancel(&self, user_id: Uuid, medication_id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.timers.remove(&(user_id, medication_id)) {
            entry.handle.abort();
            true
        } else {
            false
        }
    }

    /// The number of pending timers.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().timers.len()
    }

    fn clear_fired(&self, key: (Uuid, Uuid), generation: u64) {
        let mut inner = self.inner.lock().unwrap();
        if inner.timers.get(&key).map(|e| e.generation) == Some(generation) {
            inner.timers.remove(&key);
        }
    }
}

impl Default for ReminderTimers {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the medication table once a minute and pushes reminders for doses
/// that have come due, scheduling a follow-up for each.
pub async fn run_reminder_loop(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if let Err(e) = dispatch_due_reminders(&state).await {
            tracing::error!("Reminder dispatch failed: {}", e);
        }
    }
}

async fn dispatch_due_reminders(state: &AppState) -> Result<()> {
    // Schedule times are stored at minute resolution, so the tick matches on
    // the truncated current minute.
    let now = Utc::now().time();
    let minute = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let due = medication_repo::list_due_at(&state.db, minute).await?;
    let followup_delay = Duration::from_secs(state.config.followup_delay_minutes as u64 * 60);

    for medication in due {
        tracing::info!(
            "Reminder due for medication {} (user {})",
            medication.id,
            medication.user_id
        );
        state.registry.notify(
            medication.user_id,
            PushEvent {
                kind: EventKind::Reminder,
                payload: Some(sonic_rs::json!({
                    "medication_id": medication.id.to_string(),
                    "name": medication.name
                })),
            },
        );
        state.reminders.schedule(
            medication.user_id,
            medication.id,
            followup_delay,
            state.registry.clone(),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn scheduled_timer_fires_and_clears_itself() {
        let registry = Arc::new(ConnectionRegistry::new());
        let timers = ReminderTimers::new();
        let uid = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(uid, tx);

        timers.schedule(uid, Uuid::new_v4(), Duration::from_millis(20), registry);
        assert_eq!(timers.pending_count(), 1);

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer did not fire")
            .expect("channel closed");
        let Message::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["data"]["kind"], "reminder");

        // let the fired task clear its map entry
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(timers.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let registry = Arc::new(ConnectionRegistry::new());
        let timers = ReminderTimers::new();
        let uid = Uuid::new_v4();
        let medication_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(uid, tx);

        timers.schedule(uid, medication_id, Duration::from_millis(50), registry);
        assert!(timers.cancel(uid, medication_id));
        assert_eq!(timers.pending_count(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
        // a second cancel finds nothing
        assert!(!timers.cancel(uid, medication_id));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_timer() {
        let registry = Arc::new(ConnectionRegistry::new());
        let timers = ReminderTimers::new();
        let uid = Uuid::new_v4();
        let medication_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(uid, tx);

        timers.schedule(uid, medication_id, Duration::from_secs(3600), registry.clone());
        timers.schedule(uid, medication_id, Duration::from_millis(20), registry);
        assert_eq!(timers.pending_count(), 1);

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("replacement timer did not fire")
            .expect("channel closed");
        assert!(matches!(frame, Message::Text(_)));
        assert!(rx.try_recv().is_err());
    }
}
