//! mg-facebook: Facebook Messenger webhook adapter for mg-gateway
//!
//! Answers the webhook handshake, classifies inbound messaging events,
//! forwards text messages to the host bot and relays replies through the
//! Send API.

pub mod adapter;
pub mod api;
pub mod error;
pub mod event;
pub mod handler;
pub mod relay;
pub mod signature;
pub mod types;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use adapter::MessengerWebhookAdapter;
pub use api::{FacebookApi, OutboundTextMessage, SendApi};
pub use error::{FacebookError, Result};
pub use event::{EventCategory, MalformedEvent, MessageKeyword, WebhookEvent};
pub use handler::{EventOutcome, IngestReport, MessengerHandler, Rejection, Unsupported};
pub use relay::OutboundRelay;
