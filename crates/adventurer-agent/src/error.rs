use adventurer_core::AdventurerError;

/// Failures of a single backend session.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport unreachable. Fatal to session start.
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The backend reported an error inside the streamed body.
    #[error("Backend reported an error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No remote conversation is open")]
    NoConversation,

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Session not started")]
    NotStarted,
}

/// A response handler rejected a reply.
#[derive(Debug, thiserror::Error)]
#[error("Response handler '{handler}' failed: {reason}")]
pub struct HandlerError {
    pub handler: String,
    pub reason: String,
}

impl HandlerError {
    pub fn new(handler: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            handler: handler.into(),
            reason: reason.to_string(),
        }
    }
}

/// Anything an adventurer lifecycle call or drain cycle can surface.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Core(#[from] AdventurerError),
}
