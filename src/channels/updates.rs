//! Decoding of Telegram `Update` objects into inbound events.

use serde::Deserialize;

use crate::contacts::ContactProfile;
use crate::error::ChannelError;

/// One inbound conversational event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text message (commands included).
    Message {
        sender: ContactProfile,
        chat_id: String,
        text: String,
    },
    /// A press on an inline button.
    Callback {
        sender: ContactProfile,
        chat_id: String,
        message_id: i64,
        callback_id: String,
        data: String,
    },
}

impl InboundEvent {
    pub fn sender(&self) -> &ContactProfile {
        match self {
            Self::Message { sender, .. } | Self::Callback { sender, .. } => sender,
        }
    }

    pub fn chat_id(&self) -> &str {
        match self {
            Self::Message { chat_id, .. } | Self::Callback { chat_id, .. } => chat_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl From<User> for ContactProfile {
    fn from(user: User) -> Self {
        ContactProfile {
            id: user.id.to_string(),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<Message>,
    data: Option<String>,
}

/// Decode one raw update. Updates the bot does not handle (edits, stickers,
/// channel posts, callbacks without data) decode to `None`.
pub fn decode_update(raw: &serde_json::Value) -> Result<Option<InboundEvent>, ChannelError> {
    let update = Update::deserialize(raw).map_err(|e| ChannelError::InvalidUpdate(e.to_string()))?;

    if let Some(message) = update.message {
        let (Some(from), Some(text)) = (message.from, message.text) else {
            return Ok(None);
        };
        return Ok(Some(InboundEvent::Message {
            sender: from.into(),
            chat_id: message.chat.id.to_string(),
            text,
        }));
    }

    if let Some(query) = update.callback_query {
        let (Some(message), Some(data)) = (query.message, query.data) else {
            return Ok(None);
        };
        return Ok(Some(InboundEvent::Callback {
            sender: query.from.into(),
            chat_id: message.chat.id.to_string(),
            message_id: message.message_id,
            callback_id: query.id,
            data,
        }));
    }

    Ok(None)
}
