//! Everything the bot posts to its channel goes through a [`ChannelOutlet`].

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tracing::debug;

use adventurer_agent::{HandlerError, ResponseHandler};
use adventurer_core::log::subscriber_failure;
use adventurer_core::{LogLevel, LogMessage, LogSubscriber};

use crate::error::DiscordError;
use crate::send;

/// Posted after every Error entry so users know what to do next.
pub const ERROR_NOTICE: &str = "**[Info]** (Bot) It seems like something went wrong. \
Wait a few seconds and try again. Use the command '/refresh' if the error persists";

/// The bot's one channel. Posts are dropped until the gateway is ready and
/// a REST client has been attached.
pub struct ChannelOutlet {
    channel_id: ChannelId,
    http: OnceLock<Arc<Http>>,
}

impl ChannelOutlet {
    pub fn new(channel_id: u64) -> Self {
        Self {
            // serenity ids are non-zero; an unset channel maps to 1 and never matches
            channel_id: ChannelId::new(channel_id.max(1)),
            http: OnceLock::new(),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// First caller wins. `Http` is a REST client, so it stays valid across
    /// gateway reconnects.
    pub fn attach(&self, http: Arc<Http>) {
        self.http.set(http).ok();
    }

    pub fn is_attached(&self) -> bool {
        self.http.get().is_some()
    }

    pub async fn post(&self, text: &str) -> Result<(), DiscordError> {
        let Some(http) = self.http.get() else {
            debug!(len = text.len(), "channel not ready, dropping post");
            return Ok(());
        };
        send::send_chunked(http, self.channel_id, text).await?;
        Ok(())
    }
}

#[async_trait]
impl ResponseHandler for ChannelOutlet {
    async fn on_response(&self, reply: &str) -> Result<(), HandlerError> {
        self.post(reply)
            .await
            .map_err(|e| HandlerError::new("discord", e))
    }
}

/// `**[Level]** (sender) content`
pub fn format_log_line(message: &LogMessage) -> String {
    format!(
        "**[{}]** ({}) {}",
        message.level.name(),
        message.sender,
        message.content
    )
}

/// Hub subscriber mirroring log entries into the channel.
pub struct ChannelLog {
    outlet: Arc<ChannelOutlet>,
}

impl ChannelLog {
    pub fn new(outlet: Arc<ChannelOutlet>) -> Self {
        Self { outlet }
    }
}

#[async_trait]
impl LogSubscriber for ChannelLog {
    fn name(&self) -> &str {
        "discord"
    }

    async fn deliver(&self, message: &LogMessage) -> adventurer_core::Result<()> {
        self.outlet
            .post(&format_log_line(message))
            .await
            .map_err(|e| subscriber_failure(self.name(), e))?;

        if message.level == LogLevel::Error {
            self.outlet
                .post(ERROR_NOTICE)
                .await
                .map_err(|e| subscriber_failure(self.name(), e))?;
        }
        Ok(())
    }
}
