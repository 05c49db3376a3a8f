use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::{Context, EventHandler};
use tracing::{info, warn};

use adventurer_agent::Adventurer;
use adventurer_core::config::DiscordConfig;
use adventurer_core::Reporter;

use crate::outlet::ChannelOutlet;

pub const LOG_NAME: &str = "Bot";

const ONLINE: &str = "Online";
const GREETING: &str = "Chat to the adventurer once they are ready. \
Use the '/refresh' command to create a new adventurer";

/// Text commands understood in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Unknown(String),
}

/// `Some` when `content` starts with `prefix`; the command name is the first
/// word after it.
pub fn parse_command(content: &str, prefix: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix(prefix)?;
    let name = rest.split_whitespace().next().unwrap_or_default();
    Some(match name {
        "refresh" => Command::Refresh,
        other => Command::Unknown(other.to_string()),
    })
}

/// Serenity event handler wired to the adventurer.
pub struct AdventurerHandler {
    pub adventurer: Arc<Adventurer>,
    pub outlet: Arc<ChannelOutlet>,
    pub config: DiscordConfig,
    pub log: Reporter,
    pub bot_id: OnceLock<UserId>,
    /// Set on the first `ready`; reconnects keep the current persona.
    pub initialized: AtomicBool,
}

impl AdventurerHandler {
    pub fn new(
        adventurer: Arc<Adventurer>,
        outlet: Arc<ChannelOutlet>,
        config: DiscordConfig,
        log: Reporter,
    ) -> Self {
        Self {
            adventurer,
            outlet,
            config,
            log,
            bot_id: OnceLock::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// True for messages the bot must not react to.
    fn should_ignore(&self, msg: &Message) -> bool {
        if msg.author.bot || Some(&msg.author.id) == self.bot_id.get() {
            return true;
        }
        msg.channel_id.get() != self.config.channel_id
    }

    async fn start_adventurer(&self) {
        if let Err(e) = self.adventurer.initialize().await {
            // allow the next ready to try again
            self.initialized.store(false, Ordering::SeqCst);
            self.note_failure("Failed to create the adventurer", &e).await;
            return;
        }
        if let Err(e) = self.adventurer.intro().await {
            warn!(error = %e, "adventurer intro failed");
        }
    }

    async fn run_command(&self, command: Command, content: &str) {
        match command {
            Command::Refresh => {
                let result = match self.adventurer.refresh().await {
                    Ok(()) => self.adventurer.intro().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    let what = format!("Failed to execute the following command: '{content}'");
                    self.note_failure(&what, &e).await;
                }
            }
            Command::Unknown(name) => {
                self.note(self.log.debug(format!("Unknown command '{name}'")).await);
            }
        }
    }

    async fn note_failure<E>(&self, content: &str, error: &E)
    where
        E: std::error::Error + Sync,
    {
        self.note(self.log.failure(content, error).await);
    }

    /// Hub failures here have nowhere better to go than the process log.
    fn note(&self, result: adventurer_core::Result<()>) {
        if let Err(e) = result {
            warn!(error = %e, "bot log entry was not delivered");
        }
    }
}

#[async_trait]
impl EventHandler for AdventurerHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        self.outlet.attach(Arc::clone(&ctx.http));
        info!(name = %ready.user.name, channel_id = self.config.channel_id, "Discord bot connected");

        self.note(self.log.info(ONLINE).await);

        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.note(self.log.info(GREETING).await);
        self.start_adventurer().await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if self.should_ignore(&msg) {
            return;
        }

        let content = msg.content.trim();
        if let Some(command) = parse_command(content, &self.config.command_prefix) {
            self.note(
                self.log
                    .debug(format!("User issued command: '{content}'"))
                    .await,
            );
            self.run_command(command, content).await;
            return;
        }

        if content.is_empty() {
            return;
        }
        self.note(
            self.log
                .debug(format!("User issued message: '{content}'"))
                .await,
        );
        self.adventurer.enqueue(msg.author.name.as_str(), content);
    }
}
