//! Chat platform abstraction.
//!
//! The bot core talks to the platform only through [`ChatPlatform`]; every
//! method is one independent network call that can fail on its own.

pub mod telegram;
pub mod updates;

pub use telegram::TelegramChannel;
pub use updates::{InboundEvent, decode_update};

use async_trait::async_trait;

use crate::error::ChannelError;

/// One button on an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    /// Opens a URL.
    Url { label: String, url: String },
    /// Sends `data` back as a callback query.
    Callback { label: String, data: String },
}

impl Button {
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Url {
            label: label.into(),
            url: url.into(),
        }
    }

    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Callback {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Controls attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Buttons under the message, rows of buttons.
    Inline(Vec<Vec<Button>>),
    /// The standing reply-keyboard menu, rows of labels.
    Menu(Vec<Vec<String>>),
}

/// How a media payload is carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A platform file id or a public URL.
    Reference(String),
    /// Raw bytes uploaded with the send.
    Bytes { data: Vec<u8>, file_name: String },
}

/// Which media send to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

/// Outbound half of the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Send text, optionally with controls. Returns the platform message id
    /// of the last message sent.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, ChannelError>;

    async fn send_media(
        &self,
        chat_id: &str,
        kind: MediaKind,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Replace a message's inline controls; `None` removes them.
    async fn edit_message_controls(
        &self,
        chat_id: &str,
        message_id: i64,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError>;

    /// Point the chat's menu button at a web app.
    async fn set_menu_button(
        &self,
        chat_id: &str,
        label: &str,
        web_app_url: &str,
    ) -> Result<(), ChannelError>;

    /// Acknowledge a button press, optionally with a toast.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError>;
}
