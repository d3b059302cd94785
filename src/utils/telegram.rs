use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{CallbackQueryId, FileId, InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::RequestError;
use tracing::debug;

use crate::config::CONFIG;
use crate::conversation::ports::{Gateway, GatewayError};
use crate::conversation::types::Keyboard;
use crate::llm::media::download_media;
use crate::utils::http::redact_secrets;

const TELEGRAM_FILE_BASE: &str = "https://api.telegram.org/file/bot";

/// Bot API client with a bounded request timeout.
pub fn build_bot(token: &str, timeout: Duration) -> anyhow::Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(timeout)
        .build()?;
    Ok(Bot::with_client(token, client))
}

pub fn to_markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.into_iter().map(|row| {
        row.into_iter()
            .map(|button| InlineKeyboardButton::callback(button.label, button.command.to_string()))
            .collect::<Vec<_>>()
    }))
}

pub fn with_prefix(prefix: &str, text: &str) -> String {
    if prefix.is_empty() {
        text.to_string()
    } else {
        format!("{prefix} {text}")
    }
}

fn request_error(err: RequestError) -> GatewayError {
    GatewayError::Request(redact_secrets(&err.to_string(), &CONFIG.secrets()))
}

pub struct TelegramGateway {
    bot: Bot,
    token: String,
    message_prefix: String,
}

impl TelegramGateway {
    pub fn new(bot: Bot, token: &str, message_prefix: &str) -> Self {
        TelegramGateway {
            bot,
            token: token.to_string(),
            message_prefix: message_prefix.to_string(),
        }
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), GatewayError> {
        let request = self
            .bot
            .send_message(ChatId(chat_id), with_prefix(&self.message_prefix, text));
        let result = match keyboard {
            Some(keyboard) => request.reply_markup(to_markup(keyboard)).await,
            None => request.await,
        };
        result.map(|_| ()).map_err(request_error)
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), GatewayError> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await
            .map(|_| ())
            .map_err(request_error)
    }

    async fn resolve_file_url(&self, file_id: &str) -> Result<Option<String>, GatewayError> {
        match self.bot.get_file(FileId(file_id.to_string())).await {
            Ok(file) => Ok(Some(format!(
                "{TELEGRAM_FILE_BASE}{}/{}",
                self.token, file.path
            ))),
            Err(RequestError::Api(err)) => {
                debug!("Telegram does not know file {}: {}", file_id, err);
                Ok(None)
            }
            Err(err) => Err(request_error(err)),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        download_media(url)
            .await
            .map_err(|err| GatewayError::Download(redact_secrets(&err.to_string(), &CONFIG.secrets())))
    }
}
