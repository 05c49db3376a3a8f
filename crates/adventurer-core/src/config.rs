use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TICK_MS: u64 = 5_000;
pub const DEFAULT_THROTTLE_MS: u64 = 500;
pub const DEFAULT_WINDOW_WORDS: usize = 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_NEW_CHAT_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONFIG_PATH: &str = "adventurer.toml";

/// Top-level config (adventurer.toml + ADVENTURER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub adventurer: AdventurerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub huggingchat: HuggingChatConfig,
}

/// Chat-platform binding. Missing credentials fall back to an empty token
/// and channel `0` instead of failing at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// The only channel the bot listens and speaks in.
    #[serde(default)]
    pub channel_id: u64,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: 0,
            command_prefix: default_command_prefix(),
        }
    }
}

impl DiscordConfig {
    /// True when both the token and the channel look usable.
    pub fn is_complete(&self) -> bool {
        !self.bot_token.is_empty() && self.channel_id != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdventurerConfig {
    /// Interval between queue drains.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Root folder holding the `adventurer/` and `huggingchat/` templates.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
}

impl Default for AdventurerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            templates_dir: default_templates_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Huggingchat,
    /// Offline stub that echoes every turn back.
    Echo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingChatConfig {
    #[serde(default = "default_huggingchat_base_url")]
    pub base_url: String,
    #[serde(default = "default_huggingchat_model")]
    pub model: String,
    /// Minimum gap between consecutive outbound requests.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Number of most recent history words replayed in every prompt.
    #[serde(default = "default_window_words")]
    pub window_words: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_new_chat_attempts")]
    pub new_chat_attempts: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub parameters: GenerationParameters,
}

impl Default for HuggingChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_huggingchat_base_url(),
            model: default_huggingchat_model(),
            throttle_ms: DEFAULT_THROTTLE_MS,
            window_words: DEFAULT_WINDOW_WORDS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            new_chat_attempts: DEFAULT_NEW_CHAT_ATTEMPTS,
            user_agent: default_user_agent(),
            parameters: GenerationParameters::default(),
        }
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub repetition_penalty: f32,
    pub return_full_text: bool,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub truncate: u32,
    pub watermark: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 1024,
            repetition_penalty: 1.2,
            return_full_text: false,
            temperature: 0.9,
            top_k: 50,
            top_p: 0.95,
            truncate: 1024,
            watermark: false,
        }
    }
}

fn default_command_prefix() -> String {
    "/".to_string()
}
fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}
fn default_templates_dir() -> String {
    "preprompts".to_string()
}
fn default_huggingchat_base_url() -> String {
    "https://huggingface.co/chat".to_string()
}
fn default_huggingchat_model() -> String {
    "OpenAssistant/oasst-sft-6-llama-30b-xor".to_string()
}
fn default_throttle_ms() -> u64 {
    DEFAULT_THROTTLE_MS
}
fn default_window_words() -> usize {
    DEFAULT_WINDOW_WORDS
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_new_chat_attempts() -> u32 {
    DEFAULT_NEW_CHAT_ATTEMPTS
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/112.0.0.0 Safari/537.36"
        .to_string()
}

impl AppConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Layers, later wins:
    ///   1. built-in defaults
    ///   2. `config_path`, else `ADVENTURER_CONFIG`, else ./adventurer.toml
    ///      (a missing file is not an error)
    ///   3. `ADVENTURER_*` vars, nested with `__`
    ///      (e.g. `ADVENTURER_HUGGINGCHAT__THROTTLE_MS=750`)
    ///   4. legacy `DISCORD_TOKEN` / `CHANNEL_ID`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("ADVENTURER_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::AdventurerError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ADVENTURER_").split("__"))
            .merge(Env::raw().filter_map(|key| {
                if key.as_str().eq_ignore_ascii_case("DISCORD_TOKEN") {
                    Some("discord.bot_token".into())
                } else if key.as_str().eq_ignore_ascii_case("CHANNEL_ID") {
                    Some("discord.channel_id".into())
                } else {
                    None
                }
            }))
    }
}
