use teloxide::types::{ChatId, UserId};

use crate::api::{self, Hypervisor};
use crate::auth::Authorizer;
use crate::event::{Command, InboundEvent, Origin};
use crate::format;
use crate::messages::Messages;
use crate::telegram::{ChatApi, TelegramError};

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Attach a keyboard of restart buttons to the VM list.
    pub inline_keyboard: bool,
    /// Answer unauthorized senders instead of ignoring them.
    pub deny_reply: bool,
}

/// Turns one inbound event into host calls and chat replies.
///
/// Host failures end up in the chat; only failures to talk to the chat
/// platform itself are returned.
pub struct Dispatcher<H, C> {
    hypervisor: H,
    chat: C,
    authorizer: Box<dyn Authorizer>,
    messages: &'static Messages,
    options: DispatchOptions,
}

impl<H: Hypervisor, C: ChatApi> Dispatcher<H, C> {
    pub fn new(
        hypervisor: H,
        chat: C,
        authorizer: Box<dyn Authorizer>,
        messages: &'static Messages,
        options: DispatchOptions,
    ) -> Self {
        Self {
            hypervisor,
            chat,
            authorizer,
            messages,
            options,
        }
    }

    pub async fn handle(&self, event: InboundEvent) -> Result<(), TelegramError> {
        if !self.authorizer.is_permitted(event.sender()) {
            return self.reject(event).await;
        }

        match event {
            InboundEvent::Text { origin } => {
                self.reply(&origin, self.messages.not_a_command).await?;
            }
            InboundEvent::Command { origin, command } => match command {
                Command::Start => {
                    self.chat
                        .send_message(origin.chat_id, self.messages.help, None, None)
                        .await?;
                }
                Command::List => self.list(&origin).await?,
                Command::Restart(name) => self.restart(&origin, name.trim()).await?,
            },
            InboundEvent::UnknownCommand { name, .. } => {
                tracing::debug!("Ignoring unknown command /{}", name);
            }
            InboundEvent::Callback {
                id,
                sender,
                chat_id,
                data,
            } => self.callback(&id, sender, chat_id, &data).await?,
        }
        Ok(())
    }

    async fn reject(&self, event: InboundEvent) -> Result<(), TelegramError> {
        let reason = self.messages.failed(self.messages.not_authorized);
        match event {
            InboundEvent::Command { origin, .. }
            | InboundEvent::UnknownCommand { origin, .. }
            | InboundEvent::Text { origin } => {
                tracing::warn!(
                    "Ignoring message {} from unauthorized user {} in chat {} (sent {})",
                    origin.message_id,
                    origin.sender,
                    origin.chat_id,
                    origin.sent_at
                );
                if self.options.deny_reply {
                    self.reply(&origin, &reason).await?;
                }
            }
            InboundEvent::Callback { id, sender, .. } => {
                tracing::warn!("Ignoring button press from unauthorized user {}", sender);
                // Unanswered presses keep spinning on the client.
                let text = if self.options.deny_reply { reason.as_str() } else { "" };
                self.chat.answer_callback_query(&id, text).await?;
            }
        }
        Ok(())
    }

    async fn reply(&self, origin: &Origin, text: &str) -> Result<(), TelegramError> {
        self.chat
            .send_message(origin.chat_id, text, Some(origin.message_id), None)
            .await?;
        Ok(())
    }

    async fn list(&self, origin: &Origin) -> Result<(), TelegramError> {
        tracing::info!("Listing VMs for user {}", origin.sender);
        let placeholder = self
            .chat
            .send_message(
                origin.chat_id,
                self.messages.fetching,
                Some(origin.message_id),
                None,
            )
            .await?;

        let vms = match api::list_all(&self.hypervisor).await {
            Ok(vms) => vms,
            Err(why) => {
                tracing::error!("Listing VMs failed: {}", why);
                return self
                    .chat
                    .edit_message_text(placeholder, &self.messages.failed(why), None)
                    .await;
            }
        };

        let mut text = format::vm_list(self.messages, &vms);
        let keyboard = if self.options.inline_keyboard {
            format::restart_keyboard(&vms)
        } else {
            None
        };
        if keyboard.is_some() {
            text.push('\n');
            text.push_str(self.messages.pick_vm);
        }
        self.chat.edit_message_text(placeholder, &text, keyboard).await
    }

    async fn restart(&self, origin: &Origin, name: &str) -> Result<(), TelegramError> {
        if name.is_empty() {
            return self.reply(origin, self.messages.restart_needs_name).await;
        }

        let placeholder = self
            .chat
            .send_message(
                origin.chat_id,
                self.messages.restarting,
                Some(origin.message_id),
                None,
            )
            .await?;
        let text = self.reboot(origin.sender, name).await;
        self.chat.edit_message_text(placeholder, &text, None).await
    }

    async fn callback(
        &self,
        id: &str,
        sender: UserId,
        chat_id: ChatId,
        data: &str,
    ) -> Result<(), TelegramError> {
        let Some(name) = data.strip_prefix(format::RESTART_PREFIX) else {
            tracing::debug!("Ignoring callback data {:?}", data);
            return Ok(());
        };

        let text = if name.is_empty() {
            self.messages.restart_needs_name.to_string()
        } else {
            self.reboot(sender, name).await
        };
        // The press may have expired during a slow reboot; the chat still gets the outcome.
        if let Err(why) = self
            .chat
            .answer_callback_query(id, format::callback_answer(&text))
            .await
        {
            tracing::warn!("Failed to answer button press {}: {}", id, why);
        }
        self.chat.send_message(chat_id, &text, None, None).await?;
        Ok(())
    }

    /// Reboots `name` and describes the outcome for the chat.
    async fn reboot(&self, requested_by: UserId, name: &str) -> String {
        tracing::info!("Rebooting {:?} for {}", name, requested_by);
        match api::reboot(&self.hypervisor, name).await {
            Ok(rebooted) => {
                tracing::info!("Rebooted {:?}", rebooted);
                self.messages.restarted(name)
            }
            Err(why) => {
                tracing::error!("Rebooting {:?} failed: {}", name, why);
                self.messages.failed(why)
            }
        }
    }
}
