//! Messaging event classification
//!
//! Every item of `entry[].messaging[]` falls into exactly one
//! [`EventCategory`], decided by the first non-null field found in the order
//! `optin`, `message`, `delivery`, `postback`. Anything else is unknown.

use serde_json::Value;
use std::fmt;

use crate::types::id_string;

/// The five kinds of messaging items the adapter distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Authentication,
    Message,
    DeliveryConfirmation,
    Postback,
    Unknown,
}

impl EventCategory {
    /// Fields probed during classification, highest priority first
    const PRIORITY: [(&'static str, EventCategory); 4] = [
        ("optin", EventCategory::Authentication),
        ("message", EventCategory::Message),
        ("delivery", EventCategory::DeliveryConfirmation),
        ("postback", EventCategory::Postback),
    ];

    /// Classify a raw messaging item
    pub fn of(item: &Value) -> Self {
        Self::PRIORITY
            .iter()
            .find(|(field, _)| item.get(field).is_some_and(|v| !v.is_null()))
            .map(|(_, category)| *category)
            .unwrap_or(EventCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Authentication => "authentication",
            EventCategory::Message => "message",
            EventCategory::DeliveryConfirmation => "delivery confirmation",
            EventCategory::Postback => "postback",
            EventCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A messaging item that was classified but lacks required fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEvent {
    pub category: EventCategory,
    pub reason: String,
}

impl MalformedEvent {
    fn new(category: EventCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed {} event: {}", self.category, self.reason)
    }
}

/// "Send to Messenger" authentication callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationEvent {
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub timestamp: Option<i64>,
    /// `optin.ref`, an arbitrary correlation token set by the plugin
    pub pass_through_param: Option<String>,
}

/// What a received message carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text { text: String, message_id: String },
    Attachment,
    /// Neither text nor attachment
    Empty,
}

/// A message sent to the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: i64,
    pub payload: MessagePayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub mids: Vec<String>,
    pub watermark: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostbackEvent {
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub timestamp: Option<i64>,
    pub payload: Option<String>,
    pub title: Option<String>,
}

/// A classified messaging item
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Authentication(AuthenticationEvent),
    Message(MessageEvent),
    DeliveryConfirmation(DeliveryEvent),
    Postback(PostbackEvent),
    Unknown(Value),
}

impl WebhookEvent {
    /// Classify and parse one messaging item.
    ///
    /// Classification never fails. Fields are read one at a time: a missing
    /// or mistyped optional field is `None`, and only the required fields of
    /// the item's category can make it a [`MalformedEvent`].
    pub fn parse(item: Value) -> Result<Self, MalformedEvent> {
        match EventCategory::of(&item) {
            EventCategory::Authentication => parse_authentication(&item),
            EventCategory::Message => parse_message(&item),
            EventCategory::DeliveryConfirmation => Ok(parse_delivery(&item)),
            EventCategory::Postback => Ok(parse_postback(&item)),
            EventCategory::Unknown => Ok(WebhookEvent::Unknown(item)),
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            WebhookEvent::Authentication(_) => EventCategory::Authentication,
            WebhookEvent::Message(_) => EventCategory::Message,
            WebhookEvent::DeliveryConfirmation(_) => EventCategory::DeliveryConfirmation,
            WebhookEvent::Postback(_) => EventCategory::Postback,
            WebhookEvent::Unknown(_) => EventCategory::Unknown,
        }
    }
}

/// `sender.id` or `recipient.id`
fn party_id(item: &Value, party: &str) -> Option<String> {
    item.get(party).and_then(|p| p.get("id")).and_then(id_string)
}

fn timestamp(item: &Value) -> Option<i64> {
    item.get("timestamp").and_then(Value::as_i64)
}

/// A string field of one of the item's bodies (`optin`, `message`, ...)
fn body_str(item: &Value, body: &str, field: &str) -> Option<String> {
    item.get(body)
        .and_then(|b| b.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_authentication(item: &Value) -> Result<WebhookEvent, MalformedEvent> {
    let sender_id = party_id(item, "sender").ok_or_else(|| {
        MalformedEvent::new(EventCategory::Authentication, "missing sender id")
    })?;

    Ok(WebhookEvent::Authentication(AuthenticationEvent {
        sender_id,
        recipient_id: party_id(item, "recipient"),
        timestamp: timestamp(item),
        pass_through_param: body_str(item, "optin", "ref"),
    }))
}

fn parse_message(item: &Value) -> Result<WebhookEvent, MalformedEvent> {
    let malformed = |reason: &str| MalformedEvent::new(EventCategory::Message, reason);

    let sender_id = party_id(item, "sender").ok_or_else(|| malformed("missing sender id"))?;
    let recipient_id =
        party_id(item, "recipient").ok_or_else(|| malformed("missing recipient id"))?;
    let timestamp = timestamp(item).ok_or_else(|| malformed("missing timestamp"))?;

    // A message carries text or attachments, never both; text wins if it does
    let payload = match (body_str(item, "message", "text"), body_str(item, "message", "mid")) {
        (Some(text), Some(message_id)) => MessagePayload::Text { text, message_id },
        (Some(_), None) => return Err(malformed("text message without mid")),
        (None, _) if has_attachments(item) => MessagePayload::Attachment,
        (None, _) => MessagePayload::Empty,
    };

    Ok(WebhookEvent::Message(MessageEvent {
        sender_id,
        recipient_id,
        timestamp,
        payload,
    }))
}

fn has_attachments(item: &Value) -> bool {
    item.get("message")
        .and_then(|m| m.get("attachments"))
        .is_some_and(|a| !a.is_null())
}

fn parse_delivery(item: &Value) -> WebhookEvent {
    let delivery = item.get("delivery");
    WebhookEvent::DeliveryConfirmation(DeliveryEvent {
        sender_id: party_id(item, "sender"),
        recipient_id: party_id(item, "recipient"),
        mids: delivery
            .and_then(|d| d.get("mids"))
            .and_then(Value::as_array)
            .map(|mids| mids.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        watermark: delivery.and_then(|d| d.get("watermark")).and_then(Value::as_i64),
    })
}

fn parse_postback(item: &Value) -> WebhookEvent {
    WebhookEvent::Postback(PostbackEvent {
        sender_id: party_id(item, "sender"),
        recipient_id: party_id(item, "recipient"),
        timestamp: timestamp(item),
        payload: body_str(item, "postback", "payload"),
        title: body_str(item, "postback", "title"),
    })
}

/// Keywords that select a structured reply instead of the notification handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKeyword {
    Image,
    Button,
    Generic,
    Receipt,
}

impl MessageKeyword {
    /// Exact, case-sensitive match on the whole message text
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "image" => Some(MessageKeyword::Image),
            "button" => Some(MessageKeyword::Button),
            "generic" => Some(MessageKeyword::Generic),
            "receipt" => Some(MessageKeyword::Receipt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKeyword::Image => "image",
            MessageKeyword::Button => "button",
            MessageKeyword::Generic => "generic",
            MessageKeyword::Receipt => "receipt",
        }
    }
}
