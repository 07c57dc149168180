#![allow(dead_code)]

use async_trait::async_trait;
use muistuttaja::components::calendar_reminders::alert::AlertSink;
use muistuttaja::components::calendar_reminders::local::{LocalMessage, LocalNotifier, Permission};
use muistuttaja::components::calendar_reminders::models::{CalendarEvent, Reminder};
use muistuttaja::components::calendar_reminders::notifications::{
    DeliveryOutcome, Notification, NotificationSender,
};
use muistuttaja::components::calendar_reminders::store::DocumentStore;
use muistuttaja::error::{store_error, Error, ReminderResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// In-memory stand-in for the CRM document store
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, Value>>,
    writes: Mutex<Vec<(String, Vec<Reminder>)>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: Value) {
        let id = document["id"].as_str().expect("document has an id").to_string();
        self.insert_as(&id, document);
    }

    /// Store a document under `id`, like a Redis hash field
    pub fn insert_as(&self, id: &str, document: Value) {
        self.documents.lock().unwrap().insert(id.to_string(), document);
    }

    pub fn document(&self, id: &str) -> Value {
        self.documents.lock().unwrap()[id].clone()
    }

    pub fn event(&self, id: &str) -> CalendarEvent {
        parse(id, &self.document(id)).unwrap()
    }

    pub fn writes(&self) -> Vec<(String, Vec<Reminder>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn parse(id: &str, document: &Value) -> ReminderResult<CalendarEvent> {
    CalendarEvent::from_document(id, &document.to_string()).map_err(Error::from)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_events(&self) -> ReminderResult<Vec<CalendarEvent>> {
        let documents = self.documents.lock().unwrap();
        documents
            .iter()
            .map(|(id, doc)| parse(id, doc))
            .collect()
    }

    async fn get_event(&self, event_id: &str) -> ReminderResult<Option<CalendarEvent>> {
        let documents = self.documents.lock().unwrap();
        match documents.get(event_id) {
            Some(doc) => Ok(Some(parse(event_id, doc)?)),
            None => Ok(None),
        }
    }

    async fn update_reminders(&self, event_id: &str, reminders: &[Reminder]) -> ReminderResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(store_error("write refused"));
        }
        let mut documents = self.documents.lock().unwrap();
        let doc = documents
            .get_mut(event_id)
            .ok_or_else(|| store_error("no such event"))?;
        doc["reminders"] = serde_json::to_value(reminders)?;
        self.writes
            .lock()
            .unwrap()
            .push((event_id.to_string(), reminders.to_vec()));
        Ok(())
    }
}

/// Records every notification; fails the ones matching `fail_when`
pub struct RecordingSender {
    sent: Mutex<Vec<Notification>>,
    outcome: DeliveryOutcome,
    fail_when: Box<dyn Fn(&Notification) -> bool + Send + Sync>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::with_outcome(DeliveryOutcome::Email {
            message_id: Some("<msg@test>".to_string()),
        })
    }

    pub fn with_outcome(outcome: DeliveryOutcome) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcome,
            fail_when: Box::new(|_| false),
        }
    }

    pub fn failing_when(mut self, f: impl Fn(&Notification) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Box::new(f);
        self
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, notification: &Notification) -> ReminderResult<DeliveryOutcome> {
        self.sent.lock().unwrap().push(notification.clone());
        if (self.fail_when)(notification) {
            return Err(Error::Other("simulated dispatch failure".to_string()));
        }
        Ok(self.outcome.clone())
    }
}

/// Holds every send until `release` is called
pub struct GatedSender {
    pub inner: RecordingSender,
    started: Notify,
    gate: Notify,
}

impl GatedSender {
    pub fn new() -> Self {
        Self {
            inner: RecordingSender::new(),
            started: Notify::new(),
            gate: Notify::new(),
        }
    }

    /// Wait until a send is blocked on the gate
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_waiters();
    }
}

#[async_trait]
impl NotificationSender for GatedSender {
    async fn send(&self, notification: &Notification) -> ReminderResult<DeliveryOutcome> {
        let released = self.gate.notified();
        tokio::pin!(released);
        released.as_mut().enable();
        self.started.notify_one();
        released.await;
        self.inner.send(notification).await
    }
}

/// Local notification facility that remembers what it showed
pub struct RecordingLocal {
    available: bool,
    permission: Mutex<Permission>,
    fail_show: bool,
    pub shown: Mutex<Vec<LocalMessage>>,
    pub requested: Mutex<Vec<LocalMessage>>,
}

impl RecordingLocal {
    pub fn new(available: bool, permission: Permission) -> Self {
        Self {
            available,
            permission: Mutex::new(permission),
            fail_show: false,
            shown: Mutex::new(Vec::new()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_show = true;
        self
    }

    pub fn shown(&self) -> Vec<LocalMessage> {
        self.shown.lock().unwrap().clone()
    }

    pub fn requested(&self) -> Vec<LocalMessage> {
        self.requested.lock().unwrap().clone()
    }
}

impl LocalNotifier for RecordingLocal {
    fn is_available(&self) -> bool {
        self.available
    }

    fn permission(&self) -> Permission {
        *self.permission.lock().unwrap()
    }

    fn request_permission(&self, pending: LocalMessage) {
        self.requested.lock().unwrap().push(pending);
    }

    fn show(&self, message: &LocalMessage) -> ReminderResult<()> {
        if self.fail_show {
            return Err(Error::LocalNotification("no notification daemon".to_string()));
        }
        self.shown.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlert {
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingAlert {
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlert {
    fn alert(&self, title: &str, body: &str) {
        self.alerts
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

/// Yields between reading an event and returning it, so concurrent
/// read-modify-write cycles interleave
pub struct YieldingStore(pub std::sync::Arc<MemoryStore>);

#[async_trait]
impl DocumentStore for YieldingStore {
    async fn list_events(&self) -> ReminderResult<Vec<CalendarEvent>> {
        self.0.list_events().await
    }

    async fn get_event(&self, event_id: &str) -> ReminderResult<Option<CalendarEvent>> {
        let event = self.0.get_event(event_id).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        event
    }

    async fn update_reminders(&self, event_id: &str, reminders: &[Reminder]) -> ReminderResult<()> {
        self.0.update_reminders(event_id, reminders).await
    }
}
