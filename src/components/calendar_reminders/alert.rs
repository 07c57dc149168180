use crate::error::ReminderResult;
use serenity::all::{ChannelId, CreateMessage, Http};
use std::sync::Arc;
use tracing::{error, warn};

/// Last-resort channel. Fire and forget: callers never learn whether anyone saw it.
pub trait AlertSink: Send + Sync {
    fn alert(&self, title: &str, body: &str);
}

/// Prints a banner on stderr for whoever watches the service console
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleAlert;

impl AlertSink for ConsoleAlert {
    fn alert(&self, title: &str, body: &str) {
        warn!("Reminder alert: {} - {}", title, body);
        eprintln!("\x07==== {} ====\n{}\n", title, body);
    }
}

/// Posts the alert to a Discord channel
#[derive(Clone)]
pub struct DiscordAlert {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordAlert {
    pub fn new(token: &str, channel_id: u64) -> ReminderResult<Self> {
        if channel_id == 0 {
            return Err(crate::error::config_error("ALERT_CHANNEL_ID must not be zero"));
        }
        Ok(Self {
            http: Arc::new(Http::new(token)),
            channel_id: ChannelId::new(channel_id),
        })
    }
}

impl AlertSink for DiscordAlert {
    fn alert(&self, title: &str, body: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            ConsoleAlert.alert(title, body);
            return;
        };

        let http = Arc::clone(&self.http);
        let channel_id = self.channel_id;
        let content = format!("⏰ **{}**\n{}", title, body);
        let (title, body) = (title.to_string(), body.to_string());

        runtime.spawn(async move {
            if let Err(e) = channel_id
                .send_message(&http, CreateMessage::new().content(content))
                .await
            {
                error!("Failed to post reminder alert to Discord: {}", e);
                ConsoleAlert.alert(&title, &body);
            }
        });
    }
}
