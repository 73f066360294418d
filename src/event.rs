use chrono::{DateTime, Utc};
use teloxide::types::{CallbackQuery, ChatId, Message, MessageId, UserId};
use teloxide::utils::command::{BotCommands, ParseError};

/// Commands the bot answers to.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "show the help text")]
    Start,

    #[command(description = "list the virtual machines")]
    List,

    #[command(description = "reboot a virtual machine: /restart <name>")]
    Restart(String),
}

/// Where a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub sender: UserId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command {
        origin: Origin,
        command: Command,
    },
    /// Looks like a command, but not one of ours.
    UnknownCommand {
        origin: Origin,
        name: String,
    },
    Text {
        origin: Origin,
    },
    /// An inline keyboard button press.
    Callback {
        id: String,
        sender: UserId,
        chat_id: ChatId,
        data: String,
    },
}

impl InboundEvent {
    /// Anonymous messages and commands addressed to another bot yield `None`.
    pub fn from_message(message: &Message, bot_name: &str) -> Option<Self> {
        let origin = Origin {
            sender: message.from.as_ref()?.id,
            chat_id: message.chat.id,
            message_id: message.id,
            sent_at: message.date,
        };

        let Some(text) = message.text().filter(|t| t.starts_with('/')) else {
            return Some(Self::Text { origin });
        };
        match Command::parse(text, bot_name) {
            Ok(command) => Some(Self::Command { origin, command }),
            Err(ParseError::WrongBotName(name)) => {
                tracing::debug!("Skipping command for @{}", name);
                None
            }
            Err(_) => {
                let head = text.split_whitespace().next().unwrap_or(text);
                let name = head[1..].split('@').next().unwrap_or_default();
                Some(Self::UnknownCommand {
                    origin,
                    name: name.to_string(),
                })
            }
        }
    }

    /// Presses without callback data yield `None`.
    pub fn from_callback(query: &CallbackQuery) -> Option<Self> {
        Some(Self::Callback {
            id: query.id.to_string(),
            sender: query.from.id,
            chat_id: query
                .message
                .as_ref()
                .map(|m| m.chat().id)
                .unwrap_or_else(|| query.from.id.into()),
            data: query.data.clone()?,
        })
    }

    pub fn sender(&self) -> UserId {
        match self {
            Self::Command { origin, .. }
            | Self::UnknownCommand { origin, .. }
            | Self::Text { origin } => origin.sender,
            Self::Callback { sender, .. } => *sender,
        }
    }
}
