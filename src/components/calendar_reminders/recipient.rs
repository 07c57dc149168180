use super::models::{CalendarEvent, Recipient};
use crate::config::Config;
use crate::error::ReminderResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Decides who receives the reminder for an event
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    /// `None` means the email channel does not apply to this event
    async fn resolve(&self, event: &CalendarEvent) -> ReminderResult<Option<Recipient>>;
}

/// Sends every reminder to the recipient named in the configuration
pub struct ConfiguredRecipient {
    config: Arc<RwLock<Config>>,
}

impl ConfiguredRecipient {
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RecipientResolver for ConfiguredRecipient {
    async fn resolve(&self, _event: &CalendarEvent) -> ReminderResult<Option<Recipient>> {
        let config = self.config.read().await;
        Ok(config.recipient_email.as_ref().map(|email| Recipient {
            email: email.clone(),
            name: config.recipient_name.clone(),
        }))
    }
}
