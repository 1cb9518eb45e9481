//! Integration message envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const HEADER_SOURCE: &str = "source";
pub const HEADER_CORRELATION_ID: &str = "correlation-id";

/// A typed event that crosses service boundaries.
///
/// `NAME` is the routing key; subscribers bind to it.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync {
    const NAME: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationMessage {
    pub id: Uuid,
    pub name: String,
    /// Consumer group the message was delivered to. Unset when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub content: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub sent_at: DateTime<Utc>,
}

impl IntegrationMessage {
    pub fn from_event<E: IntegrationEvent>(event: &E, source: &str) -> Result<Self, serde_json::Error> {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_SOURCE.to_string(), source.to_string());
        Ok(Self {
            id: Uuid::new_v4(),
            name: E::NAME.to_string(),
            group: None,
            content: serde_json::to_value(event)?,
            headers,
            sent_at: Utc::now(),
        })
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_string(), value.into());
        self
    }

    /// Decode the payload as a typed event.
    pub fn decode<E: IntegrationEvent>(&self) -> Result<E, serde_json::Error> {
        E::deserialize(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pinged {
        n: u32,
    }

    impl IntegrationEvent for Pinged {
        const NAME: &'static str = "test.pinged";
    }

    #[test]
    fn test_envelope_carries_name_and_source() {
        let msg = IntegrationMessage::from_event(&Pinged { n: 7 }, "svc").unwrap();
        assert_eq!(msg.name, "test.pinged");
        assert_eq!(msg.headers.get(HEADER_SOURCE).map(String::as_str), Some("svc"));
        assert_eq!(msg.decode::<Pinged>().unwrap(), Pinged { n: 7 });
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let msg = IntegrationMessage::from_event(&Pinged { n: 1 }, "svc").unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("sentAt").is_some());
        assert!(json.get("group").is_none());
    }
}
