mod api;
mod bot;
mod config;
mod discord_log;
mod restrictions;

use std::sync::Arc;
use std::time::Duration;

use serenity::all::{
    ActivityData, Context, EventHandler, GatewayError, GatewayIntents, Message, OnlineStatus, Ready,
};
use serenity::async_trait;
use serenity::http::Http;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use api::{ModerationApi, RestClient};
use bot::{friends, DiscordClient, Dispatcher, DispatcherConfig, IncomingMessage};
use config::{Config, Presence};
use restrictions::RestrictionStore;

struct Handler {
    dispatcher: Arc<Dispatcher>,
    presence: Presence,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Logged in as {} ({})", ready.user.name, ready.user.id);

        let name = self.presence.name.clone();
        let activity = match &self.presence.url {
            Some(url) => ActivityData::streaming(name.clone(), url.as_str()).unwrap_or_else(|e| {
                warn!("Invalid presence URL {url}: {e}");
                ActivityData::playing(name)
            }),
            None => ActivityData::playing(name),
        };
        ctx.set_presence(Some(activity), OnlineStatus::Online);
        info!("Presence set successfully.");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let incoming = IncomingMessage {
            message_id: msg.id.get(),
            channel_id: msg.channel_id.get(),
            author_id: msg.author.id.get(),
            content: msg.content,
        };
        self.dispatcher.handle_message(&incoming).await;
    }
}

fn log_filter(debug_mode: bool) -> EnvFilter {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if !debug_mode {
        return filter;
    }
    match format!("{}=debug", env!("CARGO_PKG_NAME")).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "groupwarden.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let authorization = config.authorization();
    let http = Arc::new(Http::new(&authorization));

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
    }
    let file_appender = tracing_appender::rolling::never(&log_dir, "groupwarden.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(log_filter(config.debug_mode)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(log_filter(config.debug_mode)),
        );

    if let Some(log_channel_id) = config.log_channel_id {
        let discord_layer = discord_log::DiscordLogLayer::new(http.clone(), log_channel_id);
        registry.with(discord_layer).init();
    } else {
        registry.init();
    }

    info!("⁎ Starting groupwarden...");
    info!("Loaded config from {config_path}");
    info!("Owner: {}, protected: {:?}", config.owner_id, config.protected_ids);
    if config.debug_mode {
        info!("Debug logging enabled");
    }

    let restrictions = match RestrictionStore::open(
        &config.data_dir.join("restrictions.db"),
        Some(&config.data_dir.join("restricted_users")),
    ) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let api: Arc<dyn ModerationApi> =
        Arc::new(RestClient::new(authorization.clone(), config.api_base.clone()));
    let chat = Arc::new(DiscordClient::new(http.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        DispatcherConfig::from(&config),
        chat,
        api.clone(),
        restrictions,
    ));

    if config.accept_friend_requests {
        info!("Accepting friend requests every {}s", config.friend_poll_seconds);
        friends::spawn_poller(api, Duration::from_secs(config.friend_poll_seconds));
    }

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGE_REACTIONS;

    let handler = Handler {
        dispatcher,
        presence: config.presence.clone(),
    };

    let mut client = match serenity::Client::builder(&authorization, intents)
        .event_handler(handler)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build client: {e}");
            std::process::exit(1);
        }
    };

    info!("Client created, connecting to the gateway");
    if let Err(e) = client.start().await {
        match e {
            serenity::Error::Gateway(GatewayError::InvalidAuthentication) => {
                error!("The provided token is invalid! Check your config");
            }
            e => error!("Failed to login: {e}"),
        }
    }
}
