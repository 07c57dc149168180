use super::models::Recipient;
use crate::config::Config;
use crate::error::{email_transport_error, Error, ReminderResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Everything the gateway needs for one request, read from config per send
#[derive(Clone)]
pub struct EmailSettings {
    pub api_key: String,
    pub api_url: String,
    pub sender_name: String,
    pub sender_address: String,
    pub timeout: Duration,
}

impl EmailSettings {
    /// `None` when no usable credential is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config
            .email_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())?;

        Some(Self {
            api_key: api_key.to_string(),
            api_url: config.email_api_url.clone(),
            sender_name: config.email_sender_name.clone(),
            sender_address: config.email_sender_address.clone(),
            timeout: Duration::from_secs(config.email_timeout_secs.max(1)),
        })
    }
}

#[derive(Debug, Serialize)]
struct Contact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailResponse {
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Accepted by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
}

/// Client for the transactional email API
#[derive(Clone, Default)]
pub struct EmailGateway {
    client: Client,
}

impl EmailGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send one HTML email. Non-2xx responses and transport failures are errors.
    pub async fn send(
        &self,
        settings: &EmailSettings,
        recipient: &Recipient,
        subject: &str,
        html_content: &str,
    ) -> ReminderResult<EmailReceipt> {
        let request = SendEmailRequest {
            sender: Contact {
                email: &settings.sender_address,
                name: Some(&settings.sender_name),
            },
            to: vec![Contact {
                email: &recipient.email,
                name: recipient.name.as_deref(),
            }],
            subject,
            html_content,
        };

        let response = self
            .client
            .post(&settings.api_url)
            .header("api-key", &settings.api_key)
            .header("accept", "application/json")
            .timeout(settings.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| email_transport_error(&format!("Failed to reach email gateway: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Could not read response body".to_string());

        if !status.is_success() {
            return Err(gateway_error(status.as_u16(), &body));
        }

        let message_id = serde_json::from_str::<SendEmailResponse>(&body)
            .ok()
            .and_then(|r| r.message_id);
        debug!("Email gateway accepted message {:?}", message_id);

        Ok(EmailReceipt { message_id })
    }
}

/// Map a failed gateway response to an error, using its JSON body when it has one
fn gateway_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<GatewayErrorBody>(body) {
        Ok(parsed) => Error::EmailGateway {
            status: Some(status),
            code: parsed.code,
            message: parsed.message.unwrap_or_else(|| body.to_string()),
        },
        Err(_) => Error::EmailGateway {
            status: Some(status),
            code: None,
            message: body.to_string(),
        },
    }
}
