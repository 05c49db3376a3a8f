use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use adventurer_agent::{Adventurer, BackendFactory, ChatBackend, EchoBackend, HuggingChat};
use adventurer_core::config::{AppConfig, BackendKind};
use adventurer_core::{LogHub, PromptTemplates, Reporter};
use adventurer_discord::DiscordAdapter;

#[derive(Parser, Debug)]
#[command(name = "adventurer-bot", version, about = "Role-playing adventurer for a Discord channel")]
struct Cli {
    /// Path to the TOML config (defaults to $ADVENTURER_CONFIG, then ./adventurer.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // before the filter reads RUST_LOG
    let env_loaded = load_env_file(".env");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "adventurer_bot=info,adventurer_agent=info,adventurer_discord=info,adventurer=info"
                    .into()
            }),
        )
        .init();

    if env_loaded {
        info!(".env loaded");
    }

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    if !config.discord.is_complete() {
        warn!(
            channel_id = config.discord.channel_id,
            "Discord token or channel id missing; set DISCORD_TOKEN and CHANNEL_ID"
        );
    }

    let templates = PromptTemplates::load(&config.adventurer.templates_dir)?;
    info!(dir = %config.adventurer.templates_dir, "templates loaded");

    let hub = Arc::new(LogHub::new());
    let factory = backend_factory(&config, &templates, &hub);
    let adventurer = Adventurer::new(
        factory,
        templates,
        Duration::from_millis(config.adventurer.tick_ms),
        Arc::clone(&hub),
    );

    let discord = DiscordAdapter::new(&config.discord, Arc::clone(&adventurer), hub);
    info!(backend = ?config.backend.kind, "starting adventurer bot");

    tokio::select! {
        result = discord.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    adventurer.shutdown().await;
    Ok(())
}

/// Export the variables in `path` unless the process already has them.
/// A missing or unreadable file is not an error.
fn load_env_file(path: impl AsRef<Path>) -> bool {
    dotenvy::from_path(path).is_ok()
}

/// Every session the adventurer opens comes from here, long-lived and
/// bootstrap alike.
fn backend_factory(
    config: &AppConfig,
    templates: &PromptTemplates,
    hub: &Arc<LogHub>,
) -> BackendFactory {
    match config.backend.kind {
        BackendKind::Huggingchat => {
            let hc = config.huggingchat.clone();
            let default_preprompt = templates.backend_default.clone();
            let hub = Arc::clone(hub);
            Arc::new(move || {
                Box::new(HuggingChat::new(
                    hc.clone(),
                    default_preprompt.clone(),
                    Reporter::new(Arc::clone(&hub), adventurer_agent::huggingchat::LOG_NAME),
                )) as Box<dyn ChatBackend>
            })
        }
        BackendKind::Echo => Arc::new(|| Box::new(EchoBackend::new()) as Box<dyn ChatBackend>),
    }
}
