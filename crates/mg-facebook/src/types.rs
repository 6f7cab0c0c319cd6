//! Facebook Messenger Platform wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Webhook (inbound)
// =============================================================================

/// Top-level webhook delivery
///
/// Only the outer shape is typed. Entries are kept as raw values and read
/// one by one, so one odd entry cannot poison the whole delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: Option<Value>,
    pub entry: Option<Vec<Value>>,
}

impl WebhookPayload {
    /// Deliveries for a page subscription carry `"object": "page"`
    pub fn is_page(&self) -> bool {
        self.object.as_ref().and_then(Value::as_str) == Some("page")
    }
}

/// One entry of a (possibly batched) delivery
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEntry {
    pub id: Option<String>,
    pub time: Option<i64>,
    /// Kept untyped so one odd item cannot poison the rest of the entry
    pub messaging: Vec<Value>,
}

impl WebhookEntry {
    /// Read an entry leniently.
    ///
    /// Only a non-object entry or a `messaging` that is not an array makes the
    /// entry unusable; mistyped `id` or `time` just come back as `None`.
    pub fn from_value(entry: Value) -> std::result::Result<Self, String> {
        let mut fields = match entry {
            Value::Object(fields) => fields,
            other => return Err(format!("entry is not an object: {}", other)),
        };

        let messaging = match fields.remove("messaging") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => return Err(format!("messaging is not an array: {}", other)),
        };

        Ok(Self {
            id: fields.get("id").and_then(id_string),
            time: fields.get("time").and_then(Value::as_i64),
            messaging,
        })
    }
}

/// Facebook sends ids as strings; numbers are accepted too
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

// =============================================================================
// Send API (outbound)
// =============================================================================

/// Body of a Send API call
#[derive(Debug, Serialize)]
pub struct SendMessagePayload {
    pub recipient: Recipient,
    pub message: MessageText,
}

#[derive(Debug, Serialize)]
pub struct Recipient {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct MessageText {
    pub text: String,
}

/// Successful Send API response
#[derive(Debug, Default, Deserialize)]
pub struct MessageResponse {
    pub recipient_id: Option<String>,
    pub message_id: Option<String>,
}

// =============================================================================
// Push send endpoint
// =============================================================================

/// Body accepted by the push-style send endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSendRequest {
    pub recipient_id: String,
    pub message_text: String,
    pub page_access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_webhook_payload_parsing() {
        let payload = r#"{
            "object": "page",
            "entry": [{
                "id": "123456789",
                "time": 1458692752478,
                "messaging": [{
                    "sender": {"id": "user123"},
                    "recipient": {"id": "page123"},
                    "timestamp": 1234567890,
                    "message": {"mid": "mid.123", "text": "Hello"}
                }]
            }]
        }"#;

        let parsed: WebhookPayload = serde_json::from_str(payload).unwrap();
        assert!(parsed.is_page());
        let entries = parsed.entry.unwrap();
        assert_eq!(entries.len(), 1);

        let entry = WebhookEntry::from_value(entries[0].clone()).unwrap();
        assert_eq!(entry.id.as_deref(), Some("123456789"));
        assert_eq!(entry.time, Some(1458692752478));
        assert_eq!(entry.messaging.len(), 1);
    }

    #[test]
    fn test_non_page_object() {
        let parsed: WebhookPayload = serde_json::from_str(r#"{"object":"user"}"#).unwrap();
        assert!(!parsed.is_page());
        let parsed: WebhookPayload = serde_json::from_str("{}").unwrap();
        assert!(!parsed.is_page());
        let parsed: WebhookPayload = serde_json::from_str(r#"{"object":7}"#).unwrap();
        assert!(!parsed.is_page());
    }

    #[test]
    fn test_entry_with_mistyped_fields_is_still_read() {
        let entry = WebhookEntry::from_value(json!({
            "id": 123456789,
            "time": "yesterday",
            "messaging": [{"sender": {"id": "u"}}]
        }))
        .unwrap();
        assert_eq!(entry.id.as_deref(), Some("123456789"));
        assert_eq!(entry.time, None);
        assert_eq!(entry.messaging.len(), 1);

        let entry = WebhookEntry::from_value(json!({"id": "p"})).unwrap();
        assert!(entry.messaging.is_empty());
    }

    #[test]
    fn test_unusable_entries() {
        assert!(WebhookEntry::from_value(json!({"id": "p", "messaging": "oops"})).is_err());
        assert!(WebhookEntry::from_value(json!("not an entry")).is_err());
    }

    #[test]
    fn test_send_payload_shape() {
        let payload = SendMessagePayload {
            recipient: Recipient {
                id: "user123".to_string(),
            },
            message: MessageText {
                text: "hi".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({"recipient": {"id": "user123"}, "message": {"text": "hi"}})
        );
    }

    #[test]
    fn test_push_send_request_camel_case() {
        let req: PushSendRequest = serde_json::from_str(
            r#"{"recipientId":"u1","messageText":"hey","pageAccessToken":"tok"}"#,
        )
        .unwrap();
        assert_eq!(req.recipient_id, "u1");
        assert_eq!(req.message_text, "hey");
        assert_eq!(req.page_access_token, "tok");
    }
}
