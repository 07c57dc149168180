use crate::components::calendar_reminders::models::{CalendarEvent, Reminder};
use crate::components::calendar_reminders::store::DocumentStore;
use crate::config::Config;
use crate::error::{store_error, ReminderResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

// Redis key constants
pub mod keys {
    /// Prefix for runtime-settable settings
    pub const SETTINGS_PREFIX: &str = "settings:";
    /// Stored email gateway credential
    pub const EMAIL_API_KEY: &str = "settings:email_api_key";
}

/// The Redis actor that owns the document store connection
pub struct RedisActor {
    client: RedisClient,
    events_key: String,
    connection: Option<ConnectionManager>,
    command_rx: mpsc::Receiver<RedisCommand>,
}

/// Commands that can be sent to the Redis actor
pub enum RedisCommand {
    GetEvents(mpsc::Sender<ReminderResult<Vec<CalendarEvent>>>),
    GetEvent(String, mpsc::Sender<ReminderResult<Option<CalendarEvent>>>),
    UpdateReminders(String, Vec<Reminder>, mpsc::Sender<ReminderResult<()>>),
    GetSetting(String, mpsc::Sender<ReminderResult<Option<String>>>),
    SaveSetting(String, Option<String>, mpsc::Sender<ReminderResult<()>>),
    Shutdown,
}

/// Handle for communicating with the Redis actor
#[derive(Clone)]
pub struct RedisActorHandle {
    command_tx: mpsc::Sender<RedisCommand>,
}

impl RedisActorHandle {
    /// Create a handle with no actor behind it; every request fails
    pub fn empty() -> Self {
        let (command_tx, _) = mpsc::channel(32);
        Self { command_tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<ReminderResult<T>>) -> RedisCommand,
    ) -> ReminderResult<T> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(build(response_tx))
            .await
            .map_err(|e| store_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| store_error("Response channel closed"))?
    }

    /// Read a runtime setting
    pub async fn get_setting(&self, key: &str) -> ReminderResult<Option<String>> {
        let key = key.to_string();
        self.request(|tx| RedisCommand::GetSetting(key, tx)).await
    }

    /// Write a runtime setting; `None` deletes it
    pub async fn save_setting(&self, key: &str, value: Option<String>) -> ReminderResult<()> {
        let key = key.to_string();
        self.request(|tx| RedisCommand::SaveSetting(key, value, tx)).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> ReminderResult<()> {
        let _ = self.command_tx.send(RedisCommand::Shutdown).await;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for RedisActorHandle {
    async fn list_events(&self) -> ReminderResult<Vec<CalendarEvent>> {
        self.request(RedisCommand::GetEvents).await
    }

    async fn get_event(&self, event_id: &str) -> ReminderResult<Option<CalendarEvent>> {
        let event_id = event_id.to_string();
        self.request(|tx| RedisCommand::GetEvent(event_id, tx)).await
    }

    async fn update_reminders(&self, event_id: &str, reminders: &[Reminder]) -> ReminderResult<()> {
        let event_id = event_id.to_string();
        let reminders = reminders.to_vec();
        self.request(|tx| RedisCommand::UpdateReminders(event_id, reminders, tx))
            .await
    }
}

impl RedisActor {
    /// Create a new actor and return its handle
    pub async fn new(config: Arc<RwLock<Config>>) -> ReminderResult<(Self, RedisActorHandle)> {
        let (redis_url, events_key) = {
            let config = config.read().await;
            (config.redis_url.clone(), config.events_key.clone())
        };

        let client = RedisClient::open(redis_url.as_str())
            .map_err(|e| store_error(&format!("Failed to create Redis client: {}", e)))?;

        let (command_tx, command_rx) = mpsc::channel(32);

        let actor = Self {
            client,
            events_key,
            connection: None,
            command_rx,
        };

        Ok((actor, RedisActorHandle { command_tx }))
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Redis actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RedisCommand::GetEvents(response_tx) => {
                    let result = self.get_events().await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::GetEvent(id, response_tx) => {
                    let result = self.get_event(&id).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::UpdateReminders(id, reminders, response_tx) => {
                    let result = self.update_reminders(&id, &reminders).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::GetSetting(key, response_tx) => {
                    let result = self.get_setting(&key).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::SaveSetting(key, value, response_tx) => {
                    let result = self.save_setting(&key, value).await;
                    let _ = response_tx.send(result).await;
                }
                RedisCommand::Shutdown => {
                    info!("Redis actor shutting down");
                    break;
                }
            }
        }

        info!("Redis actor shut down");
    }

    /// Get a redis connection, opening it on first use
    async fn connection(&mut self) -> ReminderResult<ConnectionManager> {
        if let Some(conn) = &self.connection {
            return Ok(conn.clone());
        }

        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| store_error(&format!("Failed to connect to Redis: {}", e)))?;
        self.connection = Some(conn.clone());
        Ok(conn)
    }

    async fn get_events(&mut self) -> ReminderResult<Vec<CalendarEvent>> {
        let mut conn = self.connection().await?;
        let documents: HashMap<String, String> = conn.hgetall(&self.events_key).await?;

        let mut events = Vec::with_capacity(documents.len());
        for (id, json) in documents {
            // One malformed document must not hide the rest of the calendar
            match CalendarEvent::from_document(&id, &json) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping malformed event document {}: {}", id, e),
            }
        }
        Ok(events)
    }

    async fn get_event(&mut self, id: &str) -> ReminderResult<Option<CalendarEvent>> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn.hget(&self.events_key, id).await?;
        match json {
            Some(json) => Ok(Some(CalendarEvent::from_document(id, &json)?)),
            None => Ok(None),
        }
    }

    /// Patch the `reminders` key of the stored document; other fields stay as written
    async fn update_reminders(&mut self, id: &str, reminders: &[Reminder]) -> ReminderResult<()> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn.hget(&self.events_key, id).await?;
        let json = json.ok_or_else(|| store_error(&format!("Event {} not found", id)))?;

        let mut document: Value = serde_json::from_str(&json)?;
        let object = document
            .as_object_mut()
            .ok_or_else(|| store_error(&format!("Event {} is not a JSON object", id)))?;
        object.insert("reminders".to_string(), serde_json::to_value(reminders)?);

        () = conn
            .hset(&self.events_key, id, serde_json::to_string(&document)?)
            .await?;
        debug!("Updated reminders of event {}", id);
        Ok(())
    }

    async fn get_setting(&mut self, key: &str) -> ReminderResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(settings_key(key)).await?;
        Ok(value)
    }

    async fn save_setting(&mut self, key: &str, value: Option<String>) -> ReminderResult<()> {
        let mut conn = self.connection().await?;
        let key = settings_key(key);
        match value {
            Some(value) => {
                () = conn.set(key, value).await?;
            }
            None => {
                () = conn.del(key).await?;
            }
        }
        Ok(())
    }
}

fn settings_key(key: &str) -> String {
    if key.starts_with(keys::SETTINGS_PREFIX) {
        key.to_string()
    } else {
        format!("{}{}", keys::SETTINGS_PREFIX, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_keys_are_prefixed_once() {
        assert_eq!(settings_key("email_api_key"), keys::EMAIL_API_KEY);
        assert_eq!(settings_key(keys::EMAIL_API_KEY), keys::EMAIL_API_KEY);
    }

    #[tokio::test]
    async fn empty_handle_reports_store_error() {
        let handle = RedisActorHandle::empty();
        let result = handle.list_events().await;
        assert!(matches!(result, Err(crate::error::Error::Store(_))));
    }
}
