//! Process-wide log hub.
//!
//! Components publish [`LogMessage`]s to a shared [`LogHub`]; subscribers
//! register per [`LogLevel`] (or for every level via [`LogLevel::All`]) and are
//! awaited in registration order. A subscriber failure is returned to whoever
//! called [`LogHub::log`], it is never swallowed here.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AdventurerError, Result};

/// Frame placed around long content so multi-line bodies stand out in logs.
pub const LONG_CONTENT_SEP: &str = "\n|------------------------|\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Debug,
    Error,
    /// Wildcard: subscribers at this level receive every message.
    All,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Error => "Error",
            LogLevel::All => "All",
        }
    }
}

/// A single fire-and-forget log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: LogLevel,
    pub sender: String,
    pub content: String,
    /// Rendered error that caused this entry, if any.
    pub error: Option<String>,
    /// Multi-line payloads (prompts, replies) that should be framed when rendered.
    pub long_content: bool,
}

impl LogMessage {
    pub fn new(level: LogLevel, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            level,
            sender: sender.into(),
            content: content.into(),
            error: None,
            long_content: false,
        }
    }

    /// Attach `error` rendered as `<TypeName>: <message>`.
    pub fn with_error<E: std::error::Error + ?Sized>(mut self, error: &E) -> Self {
        self.error = Some(format!("{}: {error}", short_type_name::<E>()));
        self
    }

    pub fn long(mut self) -> Self {
        self.long_content = true;
        self
    }
}

/// `adventurer_agent::error::BackendError` -> `BackendError`.
fn short_type_name<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

/// Which parts of a [`LogMessage`] to include when rendering it as a line.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub timestamp: bool,
    pub level: bool,
    pub sender: bool,
    pub content: bool,
    pub error: bool,
    pub long_content_sep: &'static str,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            timestamp: true,
            level: true,
            sender: true,
            content: true,
            error: true,
            long_content_sep: LONG_CONTENT_SEP,
        }
    }
}

/// Render `message` as `<timestamp> [Level] (sender) content`, with the error
/// appended on its own tab-indented line.
pub fn render(message: &LogMessage, opts: &RenderOptions) -> String {
    let mut parts = Vec::with_capacity(4);
    if opts.timestamp {
        parts.push(chrono::Local::now().to_rfc3339());
    }
    if opts.level {
        parts.push(format!("[{}]", message.level.name()));
    }
    if opts.sender {
        parts.push(format!("({})", message.sender));
    }
    if opts.content {
        if message.long_content {
            parts.push(format!(
                "{sep}{}{sep}",
                message.content,
                sep = opts.long_content_sep
            ));
        } else {
            parts.push(message.content.clone());
        }
    }

    let mut line = parts.join(" ");
    if opts.error {
        if let Some(ref err) = message.error {
            line.push_str("\n\t");
            line.push_str(err);
        }
    }
    line
}

#[async_trait]
pub trait LogSubscriber: Send + Sync {
    /// Subscriber name used in error reports.
    fn name(&self) -> &str;

    async fn deliver(&self, message: &LogMessage) -> Result<()>;
}

/// Default wildcard subscriber: forwards every entry to `tracing`.
pub struct ConsoleSubscriber;

#[async_trait]
impl LogSubscriber for ConsoleSubscriber {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, message: &LogMessage) -> Result<()> {
        // tracing's formatter already stamps the time
        let opts = RenderOptions {
            timestamp: false,
            ..RenderOptions::default()
        };
        let line = render(message, &opts);
        match message.level {
            LogLevel::Error => tracing::error!(target: "adventurer", "{line}"),
            LogLevel::Debug => tracing::debug!(target: "adventurer", "{line}"),
            LogLevel::Info | LogLevel::All => tracing::info!(target: "adventurer", "{line}"),
        }
        Ok(())
    }
}

/// Publish/subscribe sink keyed by severity.
pub struct LogHub {
    subscribers: RwLock<Vec<(LogLevel, Arc<dyn LogSubscriber>)>>,
}

impl LogHub {
    /// A hub with the console subscriber registered at [`LogLevel::All`].
    pub fn new() -> Self {
        let hub = Self::empty();
        hub.subscribe(LogLevel::All, Arc::new(ConsoleSubscriber));
        hub
    }

    /// A hub with no subscribers at all.
    pub fn empty() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, level: LogLevel, subscriber: Arc<dyn LogSubscriber>) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.push((level, subscriber));
    }

    /// Deliver `message` to the union of its level's subscribers and the
    /// wildcard subscribers. A subscriber registered under both is called once.
    pub async fn log(&self, message: LogMessage) -> Result<()> {
        let targets = self.targets(message.level);
        for sub in targets {
            sub.deliver(&message).await?;
        }
        Ok(())
    }

    fn targets(&self, level: LogLevel) -> Vec<Arc<dyn LogSubscriber>> {
        let subs = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut out: Vec<Arc<dyn LogSubscriber>> = Vec::new();
        for (sub_level, sub) in subs.iter() {
            if *sub_level != level && *sub_level != LogLevel::All {
                continue;
            }
            if out.iter().any(|seen| same_subscriber(seen, sub)) {
                continue;
            }
            out.push(Arc::clone(sub));
        }
        out
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new()
    }
}

fn same_subscriber(a: &Arc<dyn LogSubscriber>, b: &Arc<dyn LogSubscriber>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Per-component handle that stamps every entry with a fixed sender name.
#[derive(Clone)]
pub struct Reporter {
    hub: Arc<LogHub>,
    sender: &'static str,
}

impl Reporter {
    pub fn new(hub: Arc<LogHub>, sender: &'static str) -> Self {
        Self { hub, sender }
    }

    pub fn hub(&self) -> &Arc<LogHub> {
        &self.hub
    }

    pub async fn debug(&self, content: impl Into<String>) -> Result<()> {
        self.emit(LogMessage::new(LogLevel::Debug, self.sender, content))
            .await
    }

    pub async fn info(&self, content: impl Into<String>) -> Result<()> {
        self.emit(LogMessage::new(LogLevel::Info, self.sender, content))
            .await
    }

    /// Debug entry framed as long content.
    pub async fn debug_long(&self, content: impl Into<String>) -> Result<()> {
        self.emit(LogMessage::new(LogLevel::Debug, self.sender, content).long())
            .await
    }

    pub async fn error(&self, content: impl Into<String>) -> Result<()> {
        self.emit(LogMessage::new(LogLevel::Error, self.sender, content))
            .await
    }

    /// Error entry carrying the failure that caused it.
    pub async fn failure<E>(&self, content: impl Into<String>, error: &E) -> Result<()>
    where
        E: std::error::Error + Sync,
    {
        self.emit(LogMessage::new(LogLevel::Error, self.sender, content).with_error(error))
            .await
    }

    pub async fn emit(&self, message: LogMessage) -> Result<()> {
        self.hub.log(message).await
    }
}

/// Build the error a subscriber returns when its sink rejects a message.
pub fn subscriber_failure(subscriber: &str, reason: impl ToString) -> AdventurerError {
    AdventurerError::Log {
        subscriber: subscriber.to_string(),
        reason: reason.to_string(),
    }
}
