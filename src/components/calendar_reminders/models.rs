use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Read `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Calendar event document as the CRM stores it
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// Taken from the store key; an `id` inside the document is not required
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Calendar-local date, `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    /// Calendar-local time, `HH:MM` or `HH:MM:SS`
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, rename = "type")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reminders: Vec<Reminder>,
}

impl CalendarEvent {
    /// Parse a stored document, keyed by `id` in the store
    pub fn from_document(id: &str, json: &str) -> serde_json::Result<Self> {
        let mut event: CalendarEvent = serde_json::from_str(json)?;
        event.id = id.to_string();
        Ok(event)
    }

    /// Whether any reminder still waits to be fired
    pub fn has_unsent_reminders(&self) -> bool {
        self.reminders.iter().any(|r| !r.is_sent())
    }

    /// Human-readable start, e.g. `2024-06-01 14:00`
    pub fn display_start(&self) -> String {
        match (&self.start_date, &self.start_time) {
            (Some(date), Some(time)) => format!("{} {}", date, time),
            (Some(date), None) => date.clone(),
            (None, Some(time)) => time.clone(),
            (None, None) => "unknown time".to_string(),
        }
    }
}

/// Reminder time as stored: free-form text or a raw number of milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReminderTime {
    Number(serde_json::Number),
    Text(String),
}

impl ReminderTime {
    /// The descriptor coerced to text
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            ReminderTime::Number(n) => Cow::Owned(n.to_string()),
            ReminderTime::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }
}

impl From<&str> for ReminderTime {
    fn from(s: &str) -> Self {
        ReminderTime::Text(s.to_string())
    }
}

/// A reminder embedded in an event document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<ReminderTime>,
    /// Informational only; channel choice comes from dispatcher configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<bool>,
    /// Fields the calendar UI keeps on a reminder (`id`, `note`, ...), written back as read
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reminder {
    pub fn new(time: impl Into<ReminderTime>) -> Self {
        Self {
            time: Some(time.into()),
            method: None,
            sent: None,
            extra: Map::new(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.sent.unwrap_or(false)
    }

    pub fn descriptor(&self) -> Option<Cow<'_, str>> {
        self.time.as_ref().map(ReminderTime::as_text)
    }
}

/// Someone who receives reminder emails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_crm_document() {
        let doc = json!({
            "id": "evt-1",
            "title": "Site visit",
            "startDate": "2024-06-01",
            "startTime": "14:00",
            "endDate": "2024-06-01",
            "endTime": "15:00",
            "type": "meeting",
            "customerId": "cust-9",
            "reminders": [
                { "time": "30 minutes", "method": "email", "sent": false },
                { "time": 300000 },
                { "method": "email", "sent": true }
            ]
        });

        let event: CalendarEvent = serde_json::from_value(doc).unwrap();
        assert_eq!(event.category.as_deref(), Some("meeting"));
        assert_eq!(event.reminders.len(), 3);
        assert_eq!(event.reminders[0].descriptor().as_deref(), Some("30 minutes"));
        assert_eq!(event.reminders[1].descriptor().as_deref(), Some("300000"));
        assert!(!event.reminders[1].is_sent());
        assert!(event.reminders[2].descriptor().is_none());
        assert!(event.reminders[2].is_sent());
        assert!(event.has_unsent_reminders());
    }

    #[test]
    fn absent_sent_flag_stays_absent_on_write() {
        let reminder = Reminder::new("15 minutes");
        let value = serde_json::to_value(&reminder).unwrap();
        assert_eq!(value, json!({ "time": "15 minutes" }));
    }

    #[test]
    fn store_key_supplies_the_event_id() {
        let event = CalendarEvent::from_document(
            "evt-7",
            r#"{ "title": null, "startDate": "2024-06-01", "reminders": [{ "time": "1 hour" }] }"#,
        )
        .unwrap();
        assert_eq!(event.id, "evt-7");
        assert_eq!(event.title, "");
        assert_eq!(event.reminders.len(), 1);

        let renamed =
            CalendarEvent::from_document("evt-8", r#"{ "id": "stale", "reminders": null }"#).unwrap();
        assert_eq!(renamed.id, "evt-8");
        assert!(renamed.reminders.is_empty());
    }

    #[test]
    fn reminder_keeps_fields_it_does_not_model() {
        let doc = json!({ "createdBy": "alice", "id": "r1", "method": "email" });
        let reminder: Reminder = serde_json::from_value(doc.clone()).unwrap();
        assert!(reminder.time.is_none());
        assert_eq!(reminder.extra["createdBy"], "alice");
        assert_eq!(serde_json::to_value(&reminder).unwrap(), doc);
    }

    #[test]
    fn display_start_handles_partial_fields() {
        let mut event = CalendarEvent {
            start_date: Some("2024-06-01".into()),
            start_time: Some("14:00".into()),
            ..Default::default()
        };
        assert_eq!(event.display_start(), "2024-06-01 14:00");
        event.start_time = None;
        assert_eq!(event.display_start(), "2024-06-01");
    }
}
