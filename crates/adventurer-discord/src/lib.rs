//! `adventurer-discord` — puts an adventurer in a single Discord channel.
//!
//! Channel messages are queued on the adventurer under the sender's name,
//! `/refresh` rebuilds the persona, and replies plus Info/Error log entries
//! are posted back to the channel.

pub mod adapter;
pub mod error;
pub mod handler;
pub mod outlet;
pub mod send;

pub use adapter::DiscordAdapter;
pub use error::DiscordError;
pub use outlet::{ChannelLog, ChannelOutlet};
