//! Outbound side of the chat platform, on top of teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, Me, MessageId, ReplyParameters};

use crate::config;

/// Telegram caps the text of a callback query answer.
pub const ANSWER_TEXT_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// teloxide redacts the bot token from the URLs in these errors.
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),

    #[error("invalid Bot API URL {url:?}: {source}")]
    ApiUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A message the bot has sent, as far as later edits need to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<SentMessage, TelegramError>;

    async fn edit_message_text(
        &self,
        message: SentMessage,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError>;

    /// An empty `text` only stops the button's progress indicator.
    async fn answer_callback_query(&self, id: &str, text: &str) -> Result<(), TelegramError>;
}

#[derive(Clone)]
pub struct Telegram {
    bot: Bot,
}

impl Telegram {
    pub fn from_config(conf: &config::TelegramConfig) -> Result<Self, TelegramError> {
        let mut client = teloxide::net::default_reqwest_settings();
        if let Some(proxy) = &conf.proxy {
            tracing::info!("Using HTTP proxy for Telegram");
            client = client.proxy(reqwest::Proxy::all(proxy)?);
        }
        let api_url =
            reqwest::Url::parse(&conf.api_url).map_err(|source| TelegramError::ApiUrl {
                url: conf.api_url.clone(),
                source,
            })?;

        let bot = Bot::with_client(conf.bot_token.clone(), client.build()?).set_api_url(api_url);
        Ok(Self { bot })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Identifies the bot; fails when the token is wrong.
    pub async fn get_me(&self) -> Result<Me, TelegramError> {
        Ok(self.bot.get_me().await?)
    }
}

#[async_trait]
impl ChatApi for Telegram {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<SentMessage, TelegramError> {
        let mut req = self.bot.send_message(chat_id, text);
        if let Some(message_id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(message_id));
        }
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard);
        }

        let sent = req.await?;
        Ok(SentMessage {
            chat_id: sent.chat.id,
            message_id: sent.id,
        })
    }

    async fn edit_message_text(
        &self,
        message: SentMessage,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut req = self
            .bot
            .edit_message_text(message.chat_id, message.message_id, text);
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard);
        }
        req.await?;
        Ok(())
    }

    async fn answer_callback_query(&self, id: &str, text: &str) -> Result<(), TelegramError> {
        let mut req = self.bot.answer_callback_query(teloxide::types::CallbackQueryId(id.to_string()));
        if !text.is_empty() {
            req = req.text(text);
        }
        req.await?;
        Ok(())
    }
}
