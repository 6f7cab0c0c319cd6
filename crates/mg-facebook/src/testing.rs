//! In-memory doubles for the Send API and the host bot

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mg_core::{CoreError, MessageNotification, NotificationReply, NotificationRequest};

use crate::api::{OutboundTextMessage, SendApi};
use crate::error::{FacebookError, Result};
use crate::types::MessageResponse;

/// Records every message instead of calling Facebook
#[derive(Default)]
pub struct RecordingSendApi {
    sent: Mutex<Vec<OutboundTextMessage>>,
    fail: bool,
}

impl RecordingSendApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<OutboundTextMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Yield to spawned sends until `count` messages were recorded
    pub async fn wait_for(&self, count: usize) -> Vec<OutboundTextMessage> {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while self.sent.lock().unwrap().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {} sent messages", count);
        self.sent()
    }
}

#[async_trait]
impl SendApi for RecordingSendApi {
    async fn send_text(&self, message: &OutboundTextMessage) -> Result<MessageResponse> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(FacebookError::Api("500 - simulated failure".to_string()));
        }
        Ok(MessageResponse {
            recipient_id: Some(message.recipient_id.clone()),
            message_id: Some("mid.test".to_string()),
        })
    }
}

/// Host bot double answering with a fixed reply
pub struct RecordingNotification {
    reply: Option<String>,
    fail: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<NotificationRequest>>,
}

impl RecordingNotification {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            fail: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            fail: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            fail: true,
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Replies only after `delay`
    pub fn stalled(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            fail: false,
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<NotificationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageNotification for RecordingNotification {
    async fn notify(
        &self,
        request: NotificationRequest,
    ) -> mg_core::Result<Option<NotificationReply>> {
        self.calls.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(CoreError::Notification("bot unavailable".to_string()));
        }
        Ok(self.reply.as_deref().map(NotificationReply::text))
    }
}
