use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use adventurer_agent::Adventurer;
use adventurer_core::config::DiscordConfig;
use adventurer_core::{LogHub, LogLevel, Reporter};

use crate::error::DiscordError;
use crate::handler::{AdventurerHandler, LOG_NAME};
use crate::outlet::{ChannelLog, ChannelOutlet};

/// Discord binding for one adventurer in one channel.
///
/// Wraps a serenity `Client` and reconnects whenever the gateway drops. The
/// event handler is shared across reconnects so the persona survives them.
pub struct DiscordAdapter {
    config: DiscordConfig,
    handler: Arc<AdventurerHandler>,
}

impl DiscordAdapter {
    /// Wire the channel in: replies go to the channel, and so do Info and
    /// Error entries from the hub.
    pub fn new(config: &DiscordConfig, adventurer: Arc<Adventurer>, hub: Arc<LogHub>) -> Self {
        let outlet = Arc::new(ChannelOutlet::new(config.channel_id));
        adventurer.register_response_handler(outlet.clone());

        let channel_log = Arc::new(ChannelLog::new(Arc::clone(&outlet)));
        hub.subscribe(LogLevel::Error, channel_log.clone());
        hub.subscribe(LogLevel::Info, channel_log);

        let handler = AdventurerHandler::new(
            adventurer,
            outlet,
            config.clone(),
            Reporter::new(hub, LOG_NAME),
        );
        Self {
            config: config.clone(),
            handler: Arc::new(handler),
        }
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Only returns early when no token is configured.
    pub async fn run(self) -> Result<(), DiscordError> {
        if self.config.bot_token.is_empty() {
            return Err(DiscordError::NoToken);
        }

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        loop {
            let mut client = self.connect(intents).await;
            info!("Discord: gateway connecting");

            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }

            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    /// Build a client, retrying until serenity accepts the configuration.
    async fn connect(&self, intents: GatewayIntents) -> Client {
        loop {
            match self.build_client(intents).await {
                Ok(c) => return c,
                Err(e) => {
                    error!("Discord: client build failed ({e}), retrying in 30s");
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        }
    }

    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, serenity::Error> {
        Client::builder(&self.config.bot_token, intents)
            .event_handler_arc(Arc::clone(&self.handler))
            .await
    }
}
