//! Inbound webhook payloads.
//!
//! Only the fields the bot reads are modeled; everything else in the Bot API
//! update is ignored so new Telegram fields never break parsing.

use serde::Deserialize;
use tracing::debug;

use crate::conversation::command::Command;
use crate::conversation::types::Event;

#[derive(Debug, Deserialize)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub message: Option<InboundMessage>,
    pub callback_query: Option<InboundCallback>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub chat: InboundChat,
    pub from: Option<InboundUser>,
    /// Captions on photos are ignored.
    pub text: Option<String>,
    /// Sizes ascend; the last entry is the largest.
    pub photo: Option<Vec<InboundPhotoSize>>,
    pub document: Option<InboundDocument>,
}

#[derive(Debug, Deserialize)]
pub struct InboundChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct InboundUser {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct InboundPhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct InboundDocument {
    pub file_id: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundCallback {
    pub id: String,
    pub from: InboundUser,
    pub message: Option<InboundMessage>,
    pub data: Option<String>,
}

/// Who sent the update and where replies go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub actor_id: i64,
    pub chat_id: i64,
    pub callback_id: Option<String>,
}

fn bot_command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    Some(command.split('@').next().unwrap_or(command))
}

impl InboundMessage {
    fn image_file_id(&self) -> Option<&str> {
        if let Some(largest) = self.photo.as_ref().and_then(|sizes| sizes.last()) {
            return Some(largest.file_id.as_str());
        }
        self.document
            .as_ref()
            .filter(|document| {
                document
                    .mime_type
                    .as_deref()
                    .is_some_and(|mime| mime.starts_with("image/"))
            })
            .map(|document| document.file_id.as_str())
    }

    fn event(&self) -> Event {
        if let Some(file_id) = self.image_file_id() {
            return Event::Image {
                file_id: file_id.to_string(),
            };
        }
        let Some(text) = self.text.as_deref() else {
            return Event::Unsupported;
        };
        match bot_command(text) {
            Some("start") => Event::Start,
            Some("status") => Event::Status,
            Some("help") => Event::Help,
            _ => Event::Text(text.to_string()),
        }
    }
}

impl InboundUpdate {
    /// `None` for updates without an identifiable sender.
    pub fn envelope(&self) -> Option<Envelope> {
        if let Some(callback) = &self.callback_query {
            let chat_id = callback
                .message
                .as_ref()
                .map(|message| message.chat.id)
                .unwrap_or(callback.from.id);
            return Some(Envelope {
                actor_id: callback.from.id,
                chat_id,
                callback_id: Some(callback.id.clone()),
            });
        }

        let message = self.message.as_ref()?;
        let actor = message.from.as_ref()?;
        Some(Envelope {
            actor_id: actor.id,
            chat_id: message.chat.id,
            callback_id: None,
        })
    }

    pub fn event(&self) -> Event {
        if let Some(callback) = &self.callback_query {
            let Some(data) = callback.data.as_deref() else {
                return Event::Unsupported;
            };
            return match data.parse::<Command>() {
                Ok(command) => Event::Command(command),
                Err(err) => {
                    debug!("Ignoring callback {}: {}", callback.id, err);
                    Event::Unsupported
                }
            };
        }
        self.message
            .as_ref()
            .map(InboundMessage::event)
            .unwrap_or(Event::Unsupported)
    }
}
