use std::sync::Arc;

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::Me;

use crate::api::Hypervisor;
use crate::dispatcher::Dispatcher;
use crate::event::InboundEvent;
use crate::telegram::{ChatApi, Telegram};

/// Consumes the update stream one event at a time until Ctrl-C.
pub async fn run<H, C>(telegram: &Telegram, dispatcher: Arc<Dispatcher<H, C>>)
where
    H: Hypervisor + 'static,
    C: ChatApi + 'static,
{
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(
            |msg: Message, me: Me, dispatcher: Arc<Dispatcher<H, C>>| async move {
                deliver(&dispatcher, InboundEvent::from_message(&msg, me.username())).await;
                respond(())
            },
        ))
        .branch(Update::filter_callback_query().endpoint(
            |q: CallbackQuery, dispatcher: Arc<Dispatcher<H, C>>| async move {
                deliver(&dispatcher, InboundEvent::from_callback(&q)).await;
                respond(())
            },
        ));

    teloxide::dispatching::Dispatcher::builder(telegram.bot().clone(), handler)
        .dependencies(dptree::deps![dispatcher])
        // One queue for every chat: updates are handled strictly in arrival order.
        .distribution_function(|_| Some(()))
        .default_handler(|update| async move {
            tracing::debug!("Skipping update {:?}", update.id);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Update stream closed, shutting down");
}

/// Hands one event to the dispatcher. Failed replies are logged and the
/// stream moves on.
pub async fn deliver<H: Hypervisor, C: ChatApi>(
    dispatcher: &Dispatcher<H, C>,
    event: Option<InboundEvent>,
) {
    let Some(event) = event else {
        return;
    };
    if let Err(why) = dispatcher.handle(event).await {
        tracing::error!("Failed to reply: {}", why);
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::api::{PowerState, VmRecord};
    use crate::auth::AllowList;
    use crate::config::TelegramConfig;
    use crate::dispatcher::DispatchOptions;
    use crate::messages::{Language, Messages};
    use crate::testing::FakeHypervisor;

    const BOT: &str = "esxi_bot";

    fn telegram_for(server: &mockito::ServerGuard) -> Telegram {
        Telegram::from_config(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_url: server.url(),
            proxy: None,
        })
        .unwrap()
    }

    fn dispatcher_for(telegram: &Telegram) -> Dispatcher<FakeHypervisor, Telegram> {
        Dispatcher::new(
            FakeHypervisor::with_vms(vec![VmRecord::new("web1", PowerState::PoweredOn)]),
            telegram.clone(),
            Box::new(AllowList::new([42])),
            Messages::for_language(Language::En),
            DispatchOptions {
                inline_keyboard: true,
                deny_reply: false,
            },
        )
    }

    fn method(name: &str) -> Matcher {
        Matcher::Regex(format!("^/bot123:abc/(?i:{name})$"))
    }

    fn message(id: i32, text: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "message_id": id,
            "date": 1700000000,
            "from": {"id": 42, "is_bot": false, "first_name": "Op"},
            "chat": {"id": 42, "type": "private", "first_name": "Op"},
            "text": text,
        }))
        .unwrap()
    }

    fn sent(id: i32) -> String {
        format!(
            r#"{{"ok": true, "result": {{"message_id": {id}, "date": 1700000001,
                "chat": {{"id": 42, "type": "private", "first_name": "Op"}}, "text": "..."}}}}"#
        )
    }

    #[tokio::test]
    async fn restart_command_round_trips_through_telegram() {
        let mut server = mockito::Server::new_async().await;
        let placeholder = server
            .mock("POST", method("sendMessage"))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "chat_id": 42,
                "text": "Restarting, please wait...",
                "reply_parameters": {"message_id": 2},
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sent(3))
            .expect(1)
            .create_async()
            .await;
        let edit = server
            .mock("POST", method("editMessageText"))
            .match_body(Matcher::PartialJson(serde_json::json!({
                "chat_id": 42,
                "message_id": 3,
                "text": "web1 restarted",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sent(3))
            .expect(1)
            .create_async()
            .await;
        let telegram = telegram_for(&server);
        let dispatcher = dispatcher_for(&telegram);

        let event = InboundEvent::from_message(&message(2, "/restart@esxi_bot web1"), BOT);
        deliver(&dispatcher, event).await;

        placeholder.assert_async().await;
        edit.assert_async().await;
    }

    #[tokio::test]
    async fn reply_failures_are_logged_not_raised() {
        let mut server = mockito::Server::new_async().await;
        let replies = server
            .mock("POST", method("sendMessage"))
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#)
            .expect(2)
            .create_async()
            .await;
        let telegram = telegram_for(&server);
        let dispatcher = dispatcher_for(&telegram);

        for (id, text) in [(2, "hi"), (3, "hello")] {
            deliver(&dispatcher, InboundEvent::from_message(&message(id, text), BOT)).await;
        }

        replies.assert_async().await;
    }

    #[tokio::test]
    async fn skipped_updates_send_nothing() {
        let mut server = mockito::Server::new_async().await;
        let nothing = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let telegram = telegram_for(&server);
        let dispatcher = dispatcher_for(&telegram);

        deliver(&dispatcher, None).await;
        deliver(
            &dispatcher,
            InboundEvent::from_message(&message(4, "/list@other_bot"), BOT),
        )
        .await;

        nothing.assert_async().await;
    }
}
