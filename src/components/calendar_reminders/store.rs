use super::models::{CalendarEvent, Reminder};
use crate::error::{store_error, ReminderResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The CRM document store, as far as reminders need it
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every event document in the calendar collection
    async fn list_events(&self) -> ReminderResult<Vec<CalendarEvent>>;

    /// One event document, if it exists
    async fn get_event(&self, event_id: &str) -> ReminderResult<Option<CalendarEvent>>;

    /// Overwrite only the `reminders` field of one event
    async fn update_reminders(&self, event_id: &str, reminders: &[Reminder]) -> ReminderResult<()>;
}

type EventLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Reads events with pending reminders and persists `sent` flags
#[derive(Clone)]
pub struct ReminderStateStore {
    store: Arc<dyn DocumentStore>,
    // Serializes this process's writes per event so sibling reminders
    // marked in the same tick do not overwrite each other.
    event_locks: EventLocks,
}

impl ReminderStateStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            event_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn event_lock(&self, event_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.event_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(event_id.to_string()).or_default())
    }

    fn release_event_lock(&self, event_id: &str) {
        let mut locks = self.event_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(event_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(event_id);
        }
    }

    /// Events carrying at least one unsent reminder
    pub async fn fetch_candidate_events(&self) -> ReminderResult<Vec<CalendarEvent>> {
        let events = self.store.list_events().await?;
        let total = events.len();
        let candidates: Vec<_> = events
            .into_iter()
            .filter(CalendarEvent::has_unsent_reminders)
            .collect();
        debug!("{} of {} events have unsent reminders", candidates.len(), total);
        Ok(candidates)
    }

    /// Set `sent = true` on one reminder, leaving its siblings untouched.
    ///
    /// This is a read-modify-write of the `reminders` array with no version
    /// check against the store: an edit made elsewhere (the calendar UI)
    /// between the read and the write is overwritten (last write wins).
    pub async fn mark_reminder_sent(&self, event_id: &str, reminder_index: usize) -> ReminderResult<()> {
        let lock = self.event_lock(event_id);
        let result = {
            let _guard = lock.lock().await;
            self.write_sent_flag(event_id, reminder_index).await
        };
        drop(lock);
        self.release_event_lock(event_id);
        result
    }

    async fn write_sent_flag(&self, event_id: &str, reminder_index: usize) -> ReminderResult<()> {
        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| store_error(&format!("Event {} no longer exists", event_id)))?;

        let mut reminders = event.reminders;
        let reminder = reminders.get_mut(reminder_index).ok_or_else(|| {
            store_error(&format!(
                "Event {} has no reminder at index {}",
                event_id, reminder_index
            ))
        })?;

        if reminder.is_sent() {
            return Ok(());
        }
        reminder.sent = Some(true);

        self.store.update_reminders(event_id, &reminders).await
    }
}
