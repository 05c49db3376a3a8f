//! `adventurer-agent` — chat backends and the adventurer that drives them.
//!
//! # Overview
//!
//! An [`Adventurer`] owns one long-lived [`ChatBackend`] session. Messages
//! queue up between ticks; each tick the whole batch is sent as one request
//! and the reply is fanned out to every [`ResponseHandler`].
//!
//! # Backends
//!
//! | Backend          | Behaviour                                              |
//! |------------------|--------------------------------------------------------|
//! | [`HuggingChat`]  | Streams completions from a HuggingChat-style service   |
//! | [`EchoBackend`]  | Offline; answers with a rendering of the turns it got  |

pub mod adventurer;
pub mod backend;
pub mod echo;
pub mod error;
pub mod history;
pub mod huggingchat;
pub mod stream;
pub mod throttle;

pub use adventurer::{Adventurer, DrainOutcome, ResponseHandler};
pub use backend::{BackendFactory, ChatBackend, ScopedSession};
pub use echo::EchoBackend;
pub use error::{BackendError, DispatchError, HandlerError};
pub use huggingchat::HuggingChat;
