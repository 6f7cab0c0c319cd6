//! Host bot interface
//!
//! The adapter knows nothing about bot logic. It hands every plain text
//! message to a [`MessageNotification`] and relays whatever reply comes back.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A text message forwarded to the host bot
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    /// Channel the message arrived on
    pub channel: String,
    /// Page-scoped id of the sender
    pub sender_id: String,
    /// Message text as typed by the user
    pub text: String,
    /// Opaque conversation context, if the channel carries one
    pub context: Option<Value>,
}

impl NotificationRequest {
    pub fn new(channel: &str, sender_id: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            context: None,
        }
    }
}

/// The host bot's answer
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationReply {
    /// Text to send back to the sender
    pub text: String,
    /// Updated conversation context
    pub context: Option<Value>,
}

impl NotificationReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
        }
    }
}

/// Callback invoked for every plain text message
#[async_trait]
pub trait MessageNotification: Send + Sync {
    /// Handle a message; `Ok(None)` means "no reply"
    async fn notify(&self, request: NotificationRequest) -> Result<Option<NotificationReply>>;
}

#[async_trait]
impl<F> MessageNotification for F
where
    F: Fn(NotificationRequest) -> Option<NotificationReply> + Send + Sync,
{
    async fn notify(&self, request: NotificationRequest) -> Result<Option<NotificationReply>> {
        Ok(self(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_closure_notification() {
        let handler: Arc<dyn MessageNotification> = Arc::new(|req: NotificationRequest| {
            Some(NotificationReply::text(format!("{}:{}", req.channel, req.text)))
        });

        let reply = handler
            .notify(NotificationRequest::new("fb", "user-1", "ping"))
            .await
            .unwrap();
        assert_eq!(reply, Some(NotificationReply::text("fb:ping")));
    }

    #[tokio::test]
    async fn test_closure_without_reply() {
        let handler = |_req: NotificationRequest| -> Option<NotificationReply> { None };
        let reply = handler
            .notify(NotificationRequest::new("fb", "user-1", "ping"))
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[test]
    fn test_request_has_no_context() {
        let req = NotificationRequest::new("fb", "user-1", "hello");
        assert_eq!(req.sender_id, "user-1");
        assert!(req.context.is_none());
    }
}
