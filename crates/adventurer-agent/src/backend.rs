use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use adventurer_core::Turn;

use crate::error::BackendError;

/// A chat session with a language-model backend.
///
/// One value is one session: `start` opens it, `send` advances it, `stop`
/// releases the transport. Sessions are not shared; the owner drives them
/// through `&mut self`.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logging and error messages.
    fn name(&self) -> &str;

    /// Open a usable session. Resets any history from a previous session.
    async fn start(&mut self) -> Result<(), BackendError>;

    /// System-level instruction applied to every later exchange. No I/O.
    fn set_preprompt(&mut self, preprompt: &str);

    /// Append `turns` to the session history and return the backend's single
    /// continuation. On success the reply is recorded as an assistant turn;
    /// on failure history keeps only the submitted turns.
    async fn send(&mut self, turns: &[Turn]) -> Result<String, BackendError>;

    /// Release transport resources. Safe to call more than once.
    async fn stop(&mut self);
}

/// Produces fresh, unstarted sessions.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn ChatBackend> + Send + Sync>;

/// A short-lived session that is always stopped once it has been opened.
///
/// Call [`ScopedSession::close`] on every path. If the value is dropped
/// instead (early return, cancelled future), the stop runs on a spawned task.
pub struct ScopedSession {
    session: Option<Box<dyn ChatBackend>>,
}

impl ScopedSession {
    /// Start `session`. A failed start still stops it before returning.
    pub async fn open(mut session: Box<dyn ChatBackend>) -> Result<Self, BackendError> {
        debug!(backend = %session.name(), "opening scoped session");
        if let Err(e) = session.start().await {
            session.stop().await;
            return Err(e);
        }
        Ok(Self {
            session: Some(session),
        })
    }

    /// Run one exchange on the scoped session.
    pub async fn exchange(&mut self, turns: &[Turn]) -> Result<String, BackendError> {
        match self.session.as_mut() {
            Some(session) => session.send(turns).await,
            None => Err(BackendError::NotStarted),
        }
    }

    pub async fn close(mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop().await;
            debug!(backend = %session.name(), "scoped session closed");
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        warn!(backend = %session.name(), "scoped session dropped before close, stopping in background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { session.stop().await });
            }
            Err(_) => warn!("no runtime available, scoped session transport leaked"),
        }
    }
}
