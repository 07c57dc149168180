use crate::error::{config_error, env_error, ReminderResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::str::FromStr;

/// Default Redis connection string
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Redis hash holding the calendar event documents
pub const DEFAULT_EVENTS_KEY: &str = "calendar_events";

/// Transactional email endpoint (Brevo v3 SMTP API)
pub const DEFAULT_EMAIL_API_URL: &str = "https://api.brevo.com/v3/smtp/email";

/// Poll cadence of the reminder scheduler, also the due window width
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Upper bound for a single email gateway request
pub const DEFAULT_EMAIL_TIMEOUT_SECS: u64 = 10;

/// Name of the reminder component in `config/components.toml`
pub const REMINDER_COMPONENT: &str = "calendar_reminders";

/// Email credential captured when the binary was built
const BUILD_TIME_EMAIL_API_KEY: Option<&str> = option_env!("EMAIL_API_KEY");

/// Initial permission for the local (desktop) notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalPermission {
    Granted,
    Denied,
    /// Ask the desktop notification service on first use
    Ask,
}

impl FromStr for LocalPermission {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" | "allow" => Ok(LocalPermission::Granted),
            "denied" | "deny" | "off" => Ok(LocalPermission::Denied),
            "ask" | "default" | "" => Ok(LocalPermission::Ask),
            other => Err(config_error(&format!(
                "Unknown LOCAL_NOTIFICATIONS value: {}",
                other
            ))),
        }
    }
}

/// When a dispatched reminder gets its `sent` flag persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Mark after any dispatch attempt, even if every channel failed
    MarkOnAttempt,
    /// Mark only when at least one channel confirmed delivery
    MarkOnDelivery,
}

impl FromStr for DeliveryPolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attempt" | "mark_on_attempt" | "" => Ok(DeliveryPolicy::MarkOnAttempt),
            "delivered" | "delivery" | "mark_on_delivery" => Ok(DeliveryPolicy::MarkOnDelivery),
            other => Err(config_error(&format!("Unknown DELIVERY_POLICY value: {}", other))),
        }
    }
}

impl fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::MarkOnAttempt => write!(f, "mark-on-attempt"),
            DeliveryPolicy::MarkOnDelivery => write!(f, "mark-on-delivery"),
        }
    }
}

/// Main configuration structure for the reminder service
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis connection string for the document store
    pub redis_url: String,
    /// Redis hash that holds event documents keyed by event id
    pub events_key: String,
    /// IANA timezone in which event dates and times are written
    pub timezone: String,
    /// Scheduler tick interval in seconds
    pub poll_interval_secs: u64,
    /// Transactional email credential, already resolved
    pub email_api_key: Option<String>,
    /// Credential from `EMAIL_API_KEY` (runtime, then build time), used when no key is stored
    #[serde(default, skip_serializing)]
    pub env_email_api_key: Option<String>,
    pub email_api_url: String,
    pub email_sender_name: String,
    pub email_sender_address: String,
    pub email_timeout_secs: u64,
    /// Who receives reminder emails
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub local_notifications: LocalPermission,
    pub delivery_policy: DeliveryPolicy,
    /// Discord bot token used only for last-resort alerts
    pub discord_token: Option<String>,
    pub alert_channel_id: Option<u64>,
    /// Map of component names to their enabled status
    pub components: HashMap<String, bool>,
}

// Credentials stay out of log output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &self.redis_url)
            .field("events_key", &self.events_key)
            .field("timezone", &self.timezone)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("email_api_key", &self.email_api_key.as_ref().map(|_| "<redacted>"))
            .field("env_email_api_key", &self.env_email_api_key.as_ref().map(|_| "<redacted>"))
            .field("email_api_url", &self.email_api_url)
            .field("email_sender_address", &self.email_sender_address)
            .field("recipient_email", &self.recipient_email)
            .field("local_notifications", &self.local_notifications)
            .field("delivery_policy", &self.delivery_policy)
            .field("discord_token", &self.discord_token.as_ref().map(|_| "<redacted>"))
            .field("alert_channel_id", &self.alert_channel_id)
            .field("components", &self.components)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut components = HashMap::new();
        components.insert(REMINDER_COMPONENT.to_string(), true);

        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            events_key: DEFAULT_EVENTS_KEY.to_string(),
            timezone: "UTC".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            email_api_key: None,
            env_email_api_key: None,
            email_api_url: DEFAULT_EMAIL_API_URL.to_string(),
            email_sender_name: "CRM Calendar".to_string(),
            email_sender_address: "calendar@example.com".to_string(),
            email_timeout_secs: DEFAULT_EMAIL_TIMEOUT_SECS,
            recipient_email: None,
            recipient_name: None,
            local_notifications: LocalPermission::Ask,
            delivery_policy: DeliveryPolicy::MarkOnAttempt,
            discord_token: None,
            alert_channel_id: None,
            components,
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> ReminderResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let poll_interval_secs = parse_env_u64("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_interval_secs == 0 {
            return Err(config_error("POLL_INTERVAL_SECS must be greater than zero"));
        }
        let email_timeout_secs = parse_env_u64("EMAIL_TIMEOUT_SECS", DEFAULT_EMAIL_TIMEOUT_SECS)?;

        let alert_channel_id = match non_blank_env("ALERT_CHANNEL_ID") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| env_error("ALERT_CHANNEL_ID"))?),
            None => None,
        };

        let local_notifications = match non_blank_env("LOCAL_NOTIFICATIONS") {
            Some(raw) => raw.parse()?,
            None => defaults.local_notifications,
        };
        let delivery_policy = match non_blank_env("DELIVERY_POLICY") {
            Some(raw) => raw.parse()?,
            None => defaults.delivery_policy,
        };

        let env_email_api_key = resolve_api_key(
            None,
            env::var("EMAIL_API_KEY").ok().as_deref(),
            BUILD_TIME_EMAIL_API_KEY,
        );

        let mut components = defaults.components.clone();
        if let Ok(content) = fs::read_to_string("config/components.toml") {
            if let Ok(file_components) = toml::from_str::<HashMap<String, bool>>(&content) {
                components.extend(file_components);
            }
        }

        let config = Config {
            redis_url: non_blank_env("REDIS_URL").unwrap_or(defaults.redis_url),
            events_key: non_blank_env("EVENTS_KEY").unwrap_or(defaults.events_key),
            timezone: non_blank_env("TIMEZONE").unwrap_or(defaults.timezone),
            poll_interval_secs,
            email_api_key: env_email_api_key.clone(),
            env_email_api_key,
            email_api_url: non_blank_env("EMAIL_API_URL").unwrap_or(defaults.email_api_url),
            email_sender_name: non_blank_env("EMAIL_SENDER_NAME").unwrap_or(defaults.email_sender_name),
            email_sender_address: non_blank_env("EMAIL_SENDER_ADDRESS")
                .unwrap_or(defaults.email_sender_address),
            email_timeout_secs,
            recipient_email: non_blank_env("REMINDER_RECIPIENT_EMAIL"),
            recipient_name: non_blank_env("REMINDER_RECIPIENT_NAME"),
            local_notifications,
            delivery_policy,
            discord_token: non_blank_env("DISCORD_TOKEN"),
            alert_channel_id,
            components,
        };

        // Fail early on a timezone or gateway URL typo rather than on the first tick
        config.tz()?;
        config.email_endpoint()?;

        Ok(config)
    }

    /// Parsed timezone for event dates and times
    pub fn tz(&self) -> ReminderResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| config_error(&format!("Unknown timezone: {}", self.timezone)))
    }

    /// Parsed email gateway endpoint
    pub fn email_endpoint(&self) -> ReminderResult<url::Url> {
        url::Url::parse(&self.email_api_url)
            .map_err(|e| config_error(&format!("Invalid EMAIL_API_URL {}: {}", self.email_api_url, e)))
    }

    /// Check if a component is enabled
    pub fn is_component_enabled(&self, name: &str) -> bool {
        *self.components.get(name).unwrap_or(&false)
    }

    /// Replace the email credential with a runtime value, falling back to
    /// the environment when the stored one is absent or blank.
    pub fn apply_stored_api_key(&mut self, stored: Option<&str>) {
        self.email_api_key = resolve_api_key(stored, self.env_email_api_key.as_deref(), None);
    }
}

/// Pick the email credential: stored value, then runtime env, then build-time env.
pub fn resolve_api_key(
    stored: Option<&str>,
    runtime_env: Option<&str>,
    build_time_env: Option<&str>,
) -> Option<String> {
    [stored, runtime_env, build_time_env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
}

fn non_blank_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_u64(var: &str, default: u64) -> ReminderResult<u64> {
    match non_blank_env(var) {
        Some(raw) => raw.parse::<u64>().map_err(|_| env_error(var)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn stored_key_takes_precedence() {
        assert_eq!(
            resolve_api_key(Some("stored"), Some("runtime"), Some("build")),
            Some("stored".to_string())
        );
        assert_eq!(
            resolve_api_key(None, Some("runtime"), Some("build")),
            Some("runtime".to_string())
        );
        assert_eq!(resolve_api_key(None, None, Some("build")), Some("build".to_string()));
    }

    #[test]
    fn clearing_stored_key_falls_back_to_environment() {
        let mut config = Config {
            env_email_api_key: Some("env-key".to_string()),
            ..Config::default()
        };

        config.apply_stored_api_key(Some("stored-key"));
        assert_eq!(config.email_api_key.as_deref(), Some("stored-key"));

        config.apply_stored_api_key(None);
        assert_eq!(config.email_api_key.as_deref(), Some("env-key"));

        config.env_email_api_key = None;
        config.apply_stored_api_key(Some("  "));
        assert_eq!(config.email_api_key, None);
    }

    #[test]
    fn blank_keys_count_as_absent() {
        assert_eq!(resolve_api_key(Some("   "), Some(""), None), None);
        assert_eq!(
            resolve_api_key(Some(""), None, Some(" build ")),
            Some("build".to_string())
        );
    }

    #[test]
    fn parses_policy_and_permission_values() {
        assert_eq!("attempt".parse::<DeliveryPolicy>().unwrap(), DeliveryPolicy::MarkOnAttempt);
        assert_eq!(
            "Delivered".parse::<DeliveryPolicy>().unwrap(),
            DeliveryPolicy::MarkOnDelivery
        );
        assert!("sometimes".parse::<DeliveryPolicy>().is_err());

        assert_eq!("granted".parse::<LocalPermission>().unwrap(), LocalPermission::Granted);
        assert_eq!("ASK".parse::<LocalPermission>().unwrap(), LocalPermission::Ask);
        assert!("maybe".parse::<LocalPermission>().is_err());
    }

    #[test]
    fn default_config_enables_reminders_in_utc() {
        let config = Config::default();
        assert!(config.is_component_enabled(REMINDER_COMPONENT));
        assert!(!config.is_component_enabled("unknown"));
        assert_eq!(config.tz().unwrap(), chrono_tz::UTC);
        assert_eq!(config.poll_interval_secs, 60);
    }

    #[test]
    fn rejects_malformed_gateway_url() {
        let mut config = Config::default();
        assert!(config.email_endpoint().is_ok());

        config.email_api_url = "not a url".to_string();
        assert!(matches!(config.email_endpoint(), Err(Error::Config(_))));
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let config = Config {
            email_api_key: Some("xkeysib-secret".to_string()),
            discord_token: Some("discord-secret".to_string()),
            ..Config::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("xkeysib-secret"));
        assert!(!printed.contains("discord-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
