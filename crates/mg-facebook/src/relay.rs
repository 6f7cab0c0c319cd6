//! Fire-and-forget delivery of outbound messages

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::api::{OutboundTextMessage, SendApi};

/// Sends text messages on a background task.
///
/// The outcome of a send is only logged. Callers never wait for it unless
/// they hold on to the returned handle.
#[derive(Clone)]
pub struct OutboundRelay {
    api: Arc<dyn SendApi>,
}

impl OutboundRelay {
    pub fn new(api: Arc<dyn SendApi>) -> Self {
        Self { api }
    }

    /// Queue `text` for `recipient_id`
    pub fn send_text(&self, recipient_id: &str, text: &str) -> JoinHandle<()> {
        self.send(OutboundTextMessage::new(recipient_id, text))
    }

    pub fn send(&self, message: OutboundTextMessage) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            match api.send_text(&message).await {
                Ok(response) => debug!(
                    "Successfully sent message to {} ({:?})",
                    message.recipient_id, response.message_id
                ),
                Err(e) => error!("Unable to send message to {}: {}", message.recipient_id, e),
            }
        })
    }
}
