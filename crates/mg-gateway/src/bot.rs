//! Built-in echo bot
//!
//! Stands in for a real host bot so the gateway can be run against a page
//! right away.

use async_trait::async_trait;
use mg_core::{MessageNotification, NotificationReply, NotificationRequest, Result};
use tracing::info;

/// Replies with the text it received
pub struct EchoBot;

#[async_trait]
impl MessageNotification for EchoBot {
    async fn notify(&self, request: NotificationRequest) -> Result<Option<NotificationReply>> {
        info!(
            "[{}] message from {}: {}",
            request.channel, request.sender_id, request.text
        );

        // 空白だけのメッセージには返信しない
        if request.text.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(NotificationReply::text(request.text)))
    }
}
