//! Facebook Messenger webhook adapter
//!
//! Wires configuration, the Send API client, the relay and the event handler
//! together and serves them over HTTP.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tracing::info;

use mg_core::{AdapterConfig, MessageNotification};

use crate::api::{FacebookApi, SendApi};
use crate::error::{FacebookError, Result};
use crate::handler::MessengerHandler;
use crate::relay::OutboundRelay;
use crate::webhook::{create_webhook_router, WebhookState};

/// Bridges a Facebook page to a host bot
pub struct MessengerWebhookAdapter {
    handler: Arc<MessengerHandler>,
}

impl MessengerWebhookAdapter {
    /// Create an adapter that talks to the real Graph API
    pub fn new(config: AdapterConfig, notification: Arc<dyn MessageNotification>) -> Result<Self> {
        let api = FacebookApi::new(&config)?;
        Self::with_send_api(config, Arc::new(api), notification)
    }

    /// Create an adapter with a custom Send API implementation
    pub fn with_send_api(
        config: AdapterConfig,
        api: Arc<dyn SendApi>,
        notification: Arc<dyn MessageNotification>,
    ) -> Result<Self> {
        config.validate()?;

        let handler = MessengerHandler::new(Arc::new(config), OutboundRelay::new(api), notification);

        Ok(Self {
            handler: Arc::new(handler),
        })
    }

    pub fn handler(&self) -> &Arc<MessengerHandler> {
        &self.handler
    }

    /// Router serving the webhook (and the send endpoint, if configured)
    pub fn router(&self) -> Router {
        create_webhook_router(WebhookState {
            handler: Arc::clone(&self.handler),
        })
    }

    /// Serve on `addr` until `shutdown` resolves
    pub async fn serve<F>(&self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| FacebookError::Server(e.to_string()))?;

        let config = self.handler.config();
        info!("Facebook Messenger webhook listening on {}{}", addr, config.webhook_path);
        if let Some(path) = &config.send_api_path {
            info!("Send API endpoint enabled at {}", path);
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| FacebookError::Server(e.to_string()))?;

        info!("Facebook Messenger webhook stopped");
        Ok(())
    }
}
