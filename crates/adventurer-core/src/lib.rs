//! `adventurer-core` — types shared by every adventurer crate.
//!
//! Holds the [`Turn`] unit of conversation, the process-wide [`LogHub`],
//! layered configuration and the prompt templates.

pub mod config;
pub mod error;
pub mod log;
pub mod templates;
pub mod types;

pub use config::AppConfig;
pub use error::{AdventurerError, Result};
pub use log::{LogHub, LogLevel, LogMessage, LogSubscriber, Reporter};
pub use templates::PromptTemplates;
pub use types::{AuthorClass, Turn};
