use super::alert::AlertSink;
use super::email::{EmailGateway, EmailSettings};
use super::local::{LocalMessage, LocalNotifier, Permission};
use super::models::{CalendarEvent, Recipient, Reminder};
use crate::config::Config;
use crate::error::ReminderResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One reminder, ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipient: Option<Recipient>,
    pub subject: String,
    /// Plain text; the email channel wraps it in HTML
    pub body: String,
    pub event_id: String,
    pub event_title: String,
    pub event_time: String,
}

impl Notification {
    /// Build the reminder text for one event
    pub fn for_reminder(event: &CalendarEvent, reminder: &Reminder, recipient: Option<Recipient>) -> Self {
        let title = if event.title.trim().is_empty() {
            "Untitled event".to_string()
        } else {
            event.title.trim().to_string()
        };
        let event_time = event.display_start();

        let mut body = format!("Reminder: {} at {}", title, event_time);
        if let Some(descriptor) = reminder.descriptor() {
            body.push_str(&format!("\nStarts in {}.", descriptor));
        }
        if let Some(category) = event.category.as_deref().filter(|c| !c.is_empty()) {
            body.push_str(&format!("\nType: {}", category));
        }
        if let Some(description) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
            body.push_str("\n\n");
            body.push_str(description.trim());
        }

        Self {
            recipient,
            subject: format!("{} ({})", title, event_time),
            body,
            event_id: event.id.clone(),
            event_title: title,
            event_time,
        }
    }

    /// What the local notification facility shows
    pub fn local_message(&self) -> LocalMessage {
        LocalMessage {
            title: format!("Reminder: {}", self.subject),
            body: format!("Reminder: {} at {}", self.event_title, self.event_time),
        }
    }
}

/// Wrap a plain-text body in the fixed reminder email template
pub fn render_html(body: &str) -> String {
    let escaped = body
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace("\r\n", "\n")
        .replace('\n', "<br>");

    format!(
        concat!(
            "<html><body style=\"margin:0;padding:0;background:#f4f5f7;\">",
            "<div style=\"font-family:Arial,Helvetica,sans-serif;max-width:600px;margin:24px auto;",
            "padding:24px;background:#ffffff;border-radius:8px;border:1px solid #e1e4e8;",
            "color:#24292e;font-size:15px;line-height:1.5;\">",
            "<h2 style=\"margin-top:0;color:#0366d6;\">Calendar reminder</h2>",
            "<p>{}</p>",
            "<p style=\"margin-top:24px;font-size:12px;color:#6a737d;\">",
            "This reminder was sent automatically by the CRM calendar.</p>",
            "</div></body></html>"
        ),
        escaped
    )
}

/// Which channel took the notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the email gateway
    Email { message_id: Option<String> },
    /// Shown by the local notification facility
    Local { after_email_failure: bool },
    /// Permission was requested; shown later if granted
    LocalPending { after_email_failure: bool },
    /// Handed to the last-resort alert, unconfirmed
    Alert { after_email_failure: bool },
}

impl DeliveryOutcome {
    /// Whether a channel confirmed the notification reached its target
    pub fn is_confirmed(&self) -> bool {
        matches!(self, DeliveryOutcome::Email { .. } | DeliveryOutcome::Local { .. })
    }

    pub fn channel(&self) -> &'static str {
        match self {
            DeliveryOutcome::Email { .. } => "email",
            DeliveryOutcome::Local { .. } => "local",
            DeliveryOutcome::LocalPending { .. } => "local (pending permission)",
            DeliveryOutcome::Alert { .. } => "alert",
        }
    }
}

/// Something that can send a reminder notification
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> ReminderResult<DeliveryOutcome>;
}

/// Email first, then the local facility, then the alert.
///
/// Sending never persists anything; marking reminders sent is the
/// scheduler's job.
pub struct NotificationDispatcher {
    config: Arc<RwLock<Config>>,
    email: EmailGateway,
    local: Arc<dyn LocalNotifier>,
    alert: Arc<dyn AlertSink>,
}

impl NotificationDispatcher {
    pub fn new(
        config: Arc<RwLock<Config>>,
        email: EmailGateway,
        local: Arc<dyn LocalNotifier>,
        alert: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            email,
            local,
            alert,
        }
    }

    /// Swap the email credential at runtime. `None` falls back to the
    /// environment credential, as a restart would.
    pub async fn set_api_key(&self, api_key: Option<String>) {
        let mut config = self.config.write().await;
        config.apply_stored_api_key(api_key.as_deref());
        info!(
            "Email gateway {}",
            if config.email_api_key.is_some() { "enabled" } else { "disabled" }
        );
    }

    /// Returns whether the email channel failed after being tried
    async fn try_email(&self, notification: &Notification) -> Result<DeliveryOutcome, bool> {
        let settings = {
            let config = self.config.read().await;
            EmailSettings::from_config(&config)
        };

        let Some(settings) = settings else {
            debug!("No email credential configured, skipping email gateway");
            return Err(false);
        };
        let Some(recipient) = &notification.recipient else {
            debug!("No recipient for event {}, skipping email gateway", notification.event_id);
            return Err(false);
        };

        let html = render_html(&notification.body);
        match self
            .email
            .send(&settings, recipient, &notification.subject, &html)
            .await
        {
            Ok(receipt) => {
                info!(
                    "Reminder for event {} emailed to {} (message id {:?})",
                    notification.event_id, recipient.email, receipt.message_id
                );
                Ok(DeliveryOutcome::Email {
                    message_id: receipt.message_id,
                })
            }
            Err(e) => {
                warn!(
                    "Email gateway failed for event {}, falling back: {}",
                    notification.event_id, e
                );
                Err(true)
            }
        }
    }
}

#[async_trait]
impl NotificationSender for NotificationDispatcher {
    async fn send(&self, notification: &Notification) -> ReminderResult<DeliveryOutcome> {
        let after_email_failure = match self.try_email(notification).await {
            Ok(outcome) => return Ok(outcome),
            Err(failed) => failed,
        };

        let message = notification.local_message();

        if self.local.is_available() {
            match self.local.permission() {
                Permission::Granted => match self.local.show(&message) {
                    Ok(()) => return Ok(DeliveryOutcome::Local { after_email_failure }),
                    Err(e) => warn!("Local notification failed for event {}: {}", notification.event_id, e),
                },
                Permission::Undetermined => {
                    self.local.request_permission(message);
                    return Ok(DeliveryOutcome::LocalPending { after_email_failure });
                }
                Permission::Denied => debug!("Local notifications are denied"),
            }
        } else {
            debug!("No local notification facility available");
        }

        self.alert.alert(&message.title, &message.body);
        Ok(DeliveryOutcome::Alert { after_email_failure })
    }
}
