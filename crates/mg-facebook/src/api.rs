//! Facebook Send API client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

use mg_core::AdapterConfig;

use crate::error::{FacebookError, Result};
use crate::types::{MessageResponse, MessageText, Recipient, SendMessagePayload};

/// A text message addressed to a Messenger user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTextMessage {
    pub recipient_id: String,
    pub text: String,
}

impl OutboundTextMessage {
    pub fn new(recipient_id: &str, text: &str) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            text: text.to_string(),
        }
    }
}

impl From<&OutboundTextMessage> for SendMessagePayload {
    fn from(message: &OutboundTextMessage) -> Self {
        SendMessagePayload {
            recipient: Recipient {
                id: message.recipient_id.clone(),
            },
            message: MessageText {
                text: message.text.clone(),
            },
        }
    }
}

/// Anything that can deliver a text message to Messenger
#[async_trait]
pub trait SendApi: Send + Sync {
    async fn send_text(&self, message: &OutboundTextMessage) -> Result<MessageResponse>;
}

/// Graph API client for the Send API
#[derive(Clone)]
pub struct FacebookApi {
    client: Client,
    messages_url: String,
    access_token: String,
}

impl FacebookApi {
    /// Create a new Facebook API client
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            messages_url: config.messages_url(),
            access_token: config.page_access_token.clone(),
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }
}

#[async_trait]
impl SendApi for FacebookApi {
    async fn send_text(&self, message: &OutboundTextMessage) -> Result<MessageResponse> {
        let payload = SendMessagePayload::from(message);

        debug!("Sending message to {}: {}", message.recipient_id, message.text);

        let response = self
            .client
            .post(&self.messages_url)
            .query(&[("access_token", &self.access_token)])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Facebook API error: {} - {}", status, body);
            return Err(FacebookError::Api(format!("{} - {}", status, body)));
        }

        // The body is informational only; an unexpected shape is not a failed send
        let message_response: MessageResponse = response.json().await.unwrap_or_default();
        info!(
            "Message sent to {}: {:?}",
            message.recipient_id, message_response.message_id
        );

        Ok(message_response)
    }
}
