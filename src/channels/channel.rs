//! The `Channel` trait and the messages that flow through it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// A message received from a contact.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Local id, used to correlate log lines.
    pub id: Uuid,
    /// Channel that received the message.
    pub channel: String,
    /// Sender identity, used as the user key.
    pub identity: String,
    /// Message body as received.
    pub content: String,
    /// Transport-assigned message id, when the transport provides one.
    pub external_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, identity: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            identity: identity.to_string(),
            content: content.to_string(),
            external_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// A reply to send back to a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Everything a channel reports to the runtime.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Pairing credential (QR code payload) that must be scanned.
    CredentialReady { code: String },
    /// The transport accepted our session.
    Authenticated,
    /// The transport is ready to deliver and send messages.
    Ready,
    /// An inbound message.
    Message(IncomingMessage),
    /// The transport went away; no more events will follow.
    Disconnected { reason: String },
}

/// Stream of events produced by [`Channel::start`].
pub type EventStream = Pin<Box<dyn Stream<Item = ChannelEvent> + Send>>;

/// A messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Connect and start producing events. Called once.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver a reply to `identity`.
    async fn send_reply(
        &self,
        identity: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Check that the transport is still usable.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop the transport.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
