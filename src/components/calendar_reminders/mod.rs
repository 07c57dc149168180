pub mod alert;
pub mod descriptor;
pub mod email;
pub mod local;
pub mod models;
pub mod notifications;
pub mod recipient;
pub mod scheduler;
pub mod store;
pub mod time;

pub use models::{CalendarEvent, Reminder};
pub use notifications::NotificationDispatcher;
pub use scheduler::{ReminderScheduler, TickReport};

use crate::components::redis_service::{keys, RedisActorHandle};
use crate::config::Config;
use crate::error::{component_error, ReminderResult};
use crate::utils::clock::SystemClock;
use alert::{AlertSink, ConsoleAlert, DiscordAlert};
use async_trait::async_trait;
use email::EmailGateway;
use local::DesktopNotifier;
use recipient::ConfiguredRecipient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Calendar reminder component: owns the scheduler and its dispatcher
#[derive(Default)]
pub struct CalendarReminders {
    scheduler: RwLock<Option<Arc<ReminderScheduler>>>,
    dispatcher: RwLock<Option<Arc<NotificationDispatcher>>>,
    redis_handle: RwLock<Option<RedisActorHandle>>,
}

impl CalendarReminders {
    /// Create a new calendar reminders component
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the scheduler if the component has been initialized
    pub async fn get_scheduler(&self) -> Option<Arc<ReminderScheduler>> {
        self.scheduler.read().await.clone()
    }

    /// Store a new email credential and apply it without restarting
    pub async fn set_email_api_key(&self, api_key: Option<String>) -> ReminderResult<()> {
        let dispatcher = self
            .dispatcher
            .read()
            .await
            .clone()
            .ok_or_else(|| component_error("calendar_reminders is not initialized"))?;

        if let Some(redis) = self.redis_handle.read().await.as_ref() {
            redis.save_setting(keys::EMAIL_API_KEY, api_key.clone()).await?;
        }
        dispatcher.set_api_key(api_key).await;
        Ok(())
    }
}

/// Pick the last-resort alert channel
fn build_alert(config: &Config) -> Arc<dyn AlertSink> {
    match (&config.discord_token, config.alert_channel_id) {
        (Some(token), Some(channel_id)) => match DiscordAlert::new(token, channel_id) {
            Ok(alert) => {
                info!("Reminder alerts go to Discord channel {}", channel_id);
                Arc::new(alert)
            }
            Err(e) => {
                warn!("Discord alerts disabled: {}", e);
                Arc::new(ConsoleAlert)
            }
        },
        _ => Arc::new(ConsoleAlert),
    }
}

#[async_trait]
impl super::Component for CalendarReminders {
    fn name(&self) -> &'static str {
        crate::config::REMINDER_COMPONENT
    }

    async fn init(&self, config: Arc<RwLock<Config>>, redis_handle: RedisActorHandle) -> ReminderResult<()> {
        let mut scheduler_lock = self.scheduler.write().await;
        if let Some(scheduler) = scheduler_lock.as_ref() {
            scheduler.start();
            return Ok(());
        }

        // A credential stored at runtime beats the one from the environment
        match redis_handle.get_setting(keys::EMAIL_API_KEY).await {
            Ok(stored) => config.write().await.apply_stored_api_key(stored.as_deref()),
            Err(e) => warn!("Could not read stored email credential, using environment: {}", e),
        }

        let (poll_interval, local_permission, alert, email_enabled) = {
            let config = config.read().await;
            (
                Duration::from_secs(config.poll_interval_secs),
                config.local_notifications,
                build_alert(&config),
                config.email_api_key.is_some(),
            )
        };
        if !email_enabled {
            info!("No email credential configured, reminders use local notifications");
        }

        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&config),
            EmailGateway::default(),
            Arc::new(DesktopNotifier::new(local_permission)),
            alert,
        ));

        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::clone(&config),
            poll_interval,
            Arc::new(redis_handle.clone()),
            dispatcher.clone(),
            Arc::new(ConfiguredRecipient::new(Arc::clone(&config))),
            Arc::new(SystemClock),
        ));
        scheduler.start();

        *self.dispatcher.write().await = Some(dispatcher);
        *self.redis_handle.write().await = Some(redis_handle);
        *scheduler_lock = Some(scheduler);

        Ok(())
    }

    async fn shutdown(&self) -> ReminderResult<()> {
        if let Some(scheduler) = self.scheduler.read().await.as_ref() {
            scheduler.stop();
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
