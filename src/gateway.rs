//! Outbound messaging port.
//!
//! Core operations notify users and admins through [`MessagingGateway`] so they never depend on
//! a concrete chat transport. The Discord adapter lives in `bot::gateway`; tests use a recording
//! fake.

use async_trait::async_trait;
use thiserror::Error;

/// Destination of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatId {
    /// Direct conversation with a user
    User(u64),
    /// Shared channel, e.g. the admin channel
    Channel(u64),
}

/// Handle to a message that was already sent, used for later edits, deletes, and copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Channel the message lives in
    pub channel_id: u64,
    /// Message id within the channel
    pub message_id: u64,
}

/// Visual style of an action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStyle {
    /// Positive action (approve, confirm)
    Success,
    /// Negative action (reject, cancel)
    Danger,
    /// Neutral action
    Primary,
}

/// A button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Callback button; `id` comes back through the interaction handler
    Callback {
        /// Callback payload
        id: String,
        /// Button label
        label: String,
        /// Button style
        style: ActionStyle,
    },
    /// Button opening an external URL
    Link {
        /// Target URL
        url: String,
        /// Button label
        label: String,
    },
}

impl Action {
    /// Builds a callback button.
    pub fn callback(id: impl Into<String>, label: impl Into<String>, style: ActionStyle) -> Self {
        Self::Callback {
            id: id.into(),
            label: label.into(),
            style,
        }
    }

    /// Builds a link button.
    pub fn link(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Link {
            url: url.into(),
            label: label.into(),
        }
    }
}

/// Delivery failure reported by the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Recipient blocked the bot, left, or was deactivated
    #[error("recipient {recipient} is unreachable")]
    Unreachable {
        /// Recipient id
        recipient: u64,
    },
    /// Any other transport failure
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Operations the core needs from a chat platform.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Sends a plain text message.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageRef, GatewayError>;

    /// Sends text with action buttons.
    async fn send_with_actions(
        &self,
        chat: ChatId,
        text: &str,
        actions: &[Action],
    ) -> Result<MessageRef, GatewayError>;

    /// Sends an image (by handle/URL) with a caption and action buttons.
    async fn send_photo(
        &self,
        chat: ChatId,
        photo: &str,
        caption: &str,
        actions: &[Action],
    ) -> Result<MessageRef, GatewayError>;

    /// Uploads a file.
    async fn send_document(
        &self,
        chat: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<MessageRef, GatewayError>;

    /// Replaces the text of a sent message and removes its buttons.
    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), GatewayError>;

    /// Deletes a sent message.
    async fn delete(&self, message: MessageRef) -> Result<(), GatewayError>;

    /// Re-posts an existing message to another chat without re-uploading it.
    async fn copy_message(&self, to: ChatId, source: MessageRef)
    -> Result<MessageRef, GatewayError>;
}
