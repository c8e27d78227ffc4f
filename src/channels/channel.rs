//! Channel trait and the message types that flow through it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;

/// A message received from a chat platform.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Local id, assigned on receipt.
    pub id: Uuid,
    /// Name of the channel implementation ("discord", "cli").
    pub channel: String,
    /// Platform conversation the message was posted in.
    pub channel_id: String,
    /// Stable platform id of the sender.
    pub user_id: String,
    /// Display name of the sender, if the platform provides one.
    pub user_name: Option<String>,
    /// Raw message text.
    pub content: String,
    /// Whether the sender is an automated account.
    pub is_bot: bool,
    /// Platform-specific data needed to reply (message id, etc.).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// Create a human message. `channel_id` defaults to the channel name.
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            channel_id: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            content: content.to_string(),
            is_bot: false,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn with_bot(mut self, is_bot: bool) -> Self {
        self.is_bot = is_bot;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A reply to send back on the channel.
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

/// Transient status signals shown to the user while a reply is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// "Bot is typing..."
    Typing,
}

/// Stream of inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A bidirectional chat surface.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, matches `IncomingMessage::channel`.
    fn name(&self) -> &str;

    /// Connect and start yielding inbound messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply to `msg`.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Show a status indicator in the conversation `msg` came from.
    async fn send_status(
        &self,
        status: StatusUpdate,
        msg: &IncomingMessage,
    ) -> Result<(), ChannelError>;

    /// Verify credentials / connectivity.
    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
