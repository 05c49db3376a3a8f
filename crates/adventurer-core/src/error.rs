use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdventurerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template '{name}' unavailable: {reason}")]
    Template { name: String, reason: String },

    #[error("Log subscriber '{subscriber}' failed: {reason}")]
    Log { subscriber: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdventurerError {
    /// Short error code string, stable across releases for log filtering.
    pub fn code(&self) -> &'static str {
        match self {
            AdventurerError::Config(_) => "CONFIG_ERROR",
            AdventurerError::Template { .. } => "TEMPLATE_ERROR",
            AdventurerError::Log { .. } => "LOG_ERROR",
            AdventurerError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdventurerError>;
