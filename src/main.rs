mod api;
mod auth;
mod bot;
mod config;
mod dispatcher;
mod event;
mod format;
mod messages;
mod telegram;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Before the subscriber, so RUST_LOG may come from .env too.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("esxi_reboot_bot=info")),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("Loaded {}", path.display()),
        Err(why) => tracing::debug!("No .env file loaded: {}", why),
    }

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(why) => {
            tracing::error!("Cannot load configuration: {}", why);
            std::process::exit(1);
        }
    };
    tracing::debug!("{:#?}", config);

    let api = match api::Api::from_config(&config.vsphere_auth) {
        Ok(api) => api,
        Err(why) => {
            tracing::error!("Cannot build vSphere client: {}", why);
            std::process::exit(1);
        }
    };
    let telegram = match telegram::Telegram::from_config(&config.telegram) {
        Ok(telegram) => telegram,
        Err(why) => {
            tracing::error!("Cannot build Telegram client: {}", why);
            std::process::exit(1);
        }
    };

    match telegram.get_me().await {
        Ok(me) => tracing::info!("Authorized on account {}", me.username()),
        Err(why) => {
            tracing::error!("Cannot authorize bot token: {}", why);
            std::process::exit(1);
        }
    }

    let dispatcher = Arc::new(dispatcher::Dispatcher::new(
        api,
        telegram.clone(),
        Box::new(auth::AllowList::new(config.bot.operator_ids.iter().copied())),
        messages::Messages::for_language(config.bot.language),
        dispatcher::DispatchOptions {
            inline_keyboard: config.bot.inline_keyboard,
            deny_reply: config.bot.deny_reply,
        },
    ));

    tracing::info!(
        "Serving {} operator(s) against {}",
        config.bot.operator_ids.len(),
        config.vsphere_auth.url
    );
    bot::run(&telegram, dispatcher).await;
}
