use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the reminder service
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Environment error: {0}")]
    #[diagnostic(code(muistuttaja::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(muistuttaja::config))]
    Config(String),

    #[error("Document store error: {0}")]
    #[diagnostic(code(muistuttaja::store))]
    Store(String),

    #[error(
        "Email gateway error{}{}: {message}",
        .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default(),
        .code.as_ref().map(|c| format!(" [{c}]")).unwrap_or_default()
    )]
    #[diagnostic(code(muistuttaja::email_gateway))]
    EmailGateway {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("Local notification error: {0}")]
    #[diagnostic(code(muistuttaja::local_notification))]
    LocalNotification(String),

    #[error("Discord API error: {0}")]
    #[diagnostic(code(muistuttaja::discord_api))]
    Discord(#[from] serenity::Error),

    #[error("Component error: {0}")]
    #[diagnostic(code(muistuttaja::component))]
    Component(String),

    #[error(transparent)]
    #[diagnostic(code(muistuttaja::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(muistuttaja::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(muistuttaja::other))]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Store(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type ReminderResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Invalid environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create document store errors
pub fn store_error(message: &str) -> Error {
    Error::Store(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper for email gateway failures that never reached an HTTP response
pub fn email_transport_error(message: &str) -> Error {
    Error::EmailGateway {
        status: None,
        code: None,
        message: message.to_string(),
    }
}
