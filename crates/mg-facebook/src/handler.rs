//! Inbound event dispatch for Facebook Messenger
//!
//! All callbacks for Messenger are POSTed to the same webhook. A delivery may
//! batch several entries, each with several messaging items. Every item is
//! classified and routed independently; nothing an item does can change how
//! the delivery as a whole is acknowledged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mg_core::{AdapterConfig, MessageNotification, NotificationRequest};

use crate::api::OutboundTextMessage;
use crate::error::{FacebookError, Result};
use crate::event::{
    AuthenticationEvent, DeliveryEvent, MalformedEvent, MessageEvent, MessageKeyword,
    MessagePayload, PostbackEvent, WebhookEvent,
};
use crate::relay::OutboundRelay;
use crate::signature::verify_signature;
use crate::types::{PushSendRequest, WebhookEntry, WebhookPayload};

pub const AUTHENTICATION_REPLY: &str = "Authentication successful";
pub const ATTACHMENT_REPLY: &str = "Message with attachment received";
pub const UNEXPECTED_MESSAGE_REPLY: &str = "Message unexpected received";

/// How long a webhook delivery waits on the host bot for one message
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Features recognised on the wire but not implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    Keyword(MessageKeyword),
    DeliveryConfirmation,
    Postback,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsupported::Keyword(keyword) => write!(f, "{} message", keyword.as_str()),
            Unsupported::DeliveryConfirmation => f.write_str("delivery confirmation"),
            Unsupported::Postback => f.write_str("postback"),
        }
    }
}

/// What happened to a single messaging item
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// A reply was handed to the relay
    Replied(OutboundTextMessage),
    /// The notification handler had nothing to say
    NoReply,
    Unsupported(Unsupported),
    /// Required fields were missing
    Dropped(MalformedEvent),
    /// The notification handler failed
    Failed(String),
    /// Unknown item kind
    Ignored,
}

/// Why a whole delivery produced no dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyBody,
    InvalidJson,
    NotPage,
    BadSignature,
}

/// Result of ingesting one webhook delivery.
///
/// Sends started while dispatching keep running after the report is dropped.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub rejection: Option<Rejection>,
    pub outcomes: Vec<EventOutcome>,
    /// Entries that could not be read at all
    pub skipped_entries: usize,
    pending: Vec<JoinHandle<()>>,
}

impl IngestReport {
    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            rejection: Some(rejection),
            ..Self::default()
        }
    }

    /// Number of sends started for this delivery
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every send started for this delivery
    pub async fn settle(self) -> Vec<EventOutcome> {
        for handle in self.pending {
            if let Err(e) = handle.await {
                error!("Send task failed: {}", e);
            }
        }
        self.outcomes
    }
}

/// Routes Messenger events to the host bot and relays replies
pub struct MessengerHandler {
    config: Arc<AdapterConfig>,
    relay: OutboundRelay,
    notification: Arc<dyn MessageNotification>,
    notification_timeout: Duration,
}

impl MessengerHandler {
    pub fn new(
        config: Arc<AdapterConfig>,
        relay: OutboundRelay,
        notification: Arc<dyn MessageNotification>,
    ) -> Self {
        Self {
            config,
            relay,
            notification,
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
        }
    }

    /// Bound the time spent waiting on the host bot per message
    pub fn with_notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn relay(&self) -> &OutboundRelay {
        &self.relay
    }

    /// Check the payload signature (when enabled) before processing
    pub async fn process_signed_webhook(&self, signature: Option<&str>, body: &[u8]) -> IngestReport {
        if self.config.verify_signature {
            let valid = signature
                .is_some_and(|sig| verify_signature(&self.config.app_secret, body, sig));
            if !valid {
                warn!("Dropping webhook delivery with missing or invalid signature");
                return IngestReport::rejected(Rejection::BadSignature);
            }
        }

        self.process_webhook(body).await
    }

    /// Process a raw webhook body.
    ///
    /// Never fails: an empty, unparseable, or non-page body is reported as a
    /// rejection and dispatches nothing.
    pub async fn process_webhook(&self, body: &[u8]) -> IngestReport {
        if body.is_empty() {
            debug!("Webhook received no body");
            return IngestReport::rejected(Rejection::EmptyBody);
        }

        let payload: WebhookPayload = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Webhook received invalid JSON: {}", e);
                return IngestReport::rejected(Rejection::InvalidJson);
            }
        };

        if !payload.is_page() {
            debug!("Webhook received non-page object: {:?}", payload.object);
            return IngestReport::rejected(Rejection::NotPage);
        }

        let mut report = IngestReport::default();
        for raw_entry in payload.entry.unwrap_or_default() {
            let entry = match WebhookEntry::from_value(raw_entry) {
                Ok(entry) => entry,
                Err(reason) => {
                    warn!("Skipping webhook entry: {}", reason);
                    report.skipped_entries += 1;
                    continue;
                }
            };

            debug!("Processing entry {:?} at {:?}", entry.id, entry.time);
            for item in entry.messaging {
                let (outcome, pending) = self.dispatch(item).await;
                report.outcomes.push(outcome);
                report.pending.extend(pending);
            }
        }

        report
    }

    /// Relay a message pushed by the host bot.
    ///
    /// The request must repeat the configured page access token.
    pub fn push_send(&self, body: &[u8]) -> Result<JoinHandle<()>> {
        if body.is_empty() {
            debug!("Send message received no body");
            return Err(FacebookError::InvalidSendRequest("empty body".to_string()));
        }

        let request: PushSendRequest = serde_json::from_slice(body).map_err(|e| {
            debug!("Send message received invalid JSON: {}", e);
            FacebookError::InvalidSendRequest(e.to_string())
        })?;

        if request.page_access_token != self.config.page_access_token {
            warn!("Passed page access token does not match");
            return Err(FacebookError::TokenMismatch);
        }

        info!("Pushing message to {}", request.recipient_id);
        Ok(self.relay.send_text(&request.recipient_id, &request.message_text))
    }

    /// Classify one messaging item and run its handler
    async fn dispatch(&self, item: serde_json::Value) -> (EventOutcome, Option<JoinHandle<()>>) {
        let event = match WebhookEvent::parse(item) {
            Ok(event) => event,
            Err(malformed) => {
                warn!("Dropping {}", malformed);
                return (EventOutcome::Dropped(malformed), None);
            }
        };

        match event {
            WebhookEvent::Authentication(auth) => self.received_authentication(auth),
            WebhookEvent::Message(message) => self.received_message(message).await,
            WebhookEvent::DeliveryConfirmation(delivery) => {
                (received_delivery_confirmation(&delivery), None)
            }
            WebhookEvent::Postback(postback) => (received_postback(&postback), None),
            WebhookEvent::Unknown(raw) => {
                debug!("Webhook received unknown messaging event: {}", raw);
                (EventOutcome::Ignored, None)
            }
        }
    }

    fn reply(&self, recipient_id: &str, text: &str) -> (EventOutcome, Option<JoinHandle<()>>) {
        let message = OutboundTextMessage::new(recipient_id, text);
        let handle = self.relay.send(message.clone());
        (EventOutcome::Replied(message), Some(handle))
    }

    fn received_authentication(
        &self,
        auth: AuthenticationEvent,
    ) -> (EventOutcome, Option<JoinHandle<()>>) {
        info!(
            "Received authentication for user {} and page {:?} with pass through param {:?} at {:?}",
            auth.sender_id, auth.recipient_id, auth.pass_through_param, auth.timestamp
        );

        self.reply(&auth.sender_id, AUTHENTICATION_REPLY)
    }

    async fn received_message(&self, message: MessageEvent) -> (EventOutcome, Option<JoinHandle<()>>) {
        let MessageEvent {
            sender_id,
            recipient_id,
            timestamp,
            payload,
        } = message;

        match payload {
            MessagePayload::Text { text, message_id } => {
                info!(
                    "Received message {} for user {} and page {} at {}: {}",
                    message_id, sender_id, recipient_id, timestamp, text
                );

                if let Some(keyword) = MessageKeyword::parse(&text) {
                    let unsupported = Unsupported::Keyword(keyword);
                    warn!("Not supported yet: {} for {}", unsupported, sender_id);
                    return (EventOutcome::Unsupported(unsupported), None);
                }

                self.notify(&sender_id, &text).await
            }
            MessagePayload::Attachment => {
                info!("Received attachment from user {}", sender_id);
                self.reply(&sender_id, ATTACHMENT_REPLY)
            }
            MessagePayload::Empty => {
                warn!(
                    "Received a message with neither text nor attachment from {}",
                    sender_id
                );
                self.reply(&sender_id, UNEXPECTED_MESSAGE_REPLY)
            }
        }
    }

    /// Forward a text to the host bot and relay its reply
    async fn notify(&self, sender_id: &str, text: &str) -> (EventOutcome, Option<JoinHandle<()>>) {
        let request = NotificationRequest::new(&self.config.channel_name, sender_id, text);

        let notified =
            tokio::time::timeout(self.notification_timeout, self.notification.notify(request)).await;

        match notified {
            Ok(Ok(Some(reply))) if !reply.text.is_empty() => self.reply(sender_id, &reply.text),
            Ok(Ok(_)) => {
                debug!("No reply for message from {}", sender_id);
                (EventOutcome::NoReply, None)
            }
            Ok(Err(e)) => {
                error!("Notification handler failed for {}: {}", sender_id, e);
                (EventOutcome::Failed(e.to_string()), None)
            }
            Err(_) => {
                error!(
                    "Notification handler timed out after {:?} for {}",
                    self.notification_timeout, sender_id
                );
                (
                    EventOutcome::Failed(format!(
                        "timed out after {:?}",
                        self.notification_timeout
                    )),
                    None,
                )
            }
        }
    }
}

fn received_delivery_confirmation(delivery: &DeliveryEvent) -> EventOutcome {
    debug!(
        "Delivery confirmation from {:?} for {} message(s), watermark {:?}",
        delivery.sender_id,
        delivery.mids.len(),
        delivery.watermark
    );
    EventOutcome::Unsupported(Unsupported::DeliveryConfirmation)
}

fn received_postback(postback: &PostbackEvent) -> EventOutcome {
    debug!(
        "Postback from {:?} to {:?} at {:?}: payload {:?}, title {:?}",
        postback.sender_id, postback.recipient_id, postback.timestamp, postback.payload, postback.title
    );
    EventOutcome::Unsupported(Unsupported::Postback)
}
