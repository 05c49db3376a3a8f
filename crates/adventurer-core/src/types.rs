use serde::{Deserialize, Serialize};
use std::fmt;

/// Author name the backend treats as its own voice.
pub const ASSISTANT_AUTHOR: &str = "assistant";

/// Author name used for system-originated turns (intro, bootstrap prompts).
pub const DEFAULT_AUTHOR: &str = "user";

/// One `(author, content)` message unit submitted to the conversation.
///
/// Immutable once created; consumed exactly once when a drain picks it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    author: String,
    content: String,
}

impl Turn {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }

    /// A turn authored by the default user.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(DEFAULT_AUTHOR, content)
    }

    /// A turn authored by the backend itself.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ASSISTANT_AUTHOR, content)
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn class(&self) -> AuthorClass {
        AuthorClass::of(&self.author)
    }
}

/// Coarse role of a turn's author as far as a backend is concerned.
///
/// Only the literal author `assistant` maps to [`AuthorClass::Assistant`];
/// every other name, known or not, is a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorClass {
    User,
    Assistant,
}

impl AuthorClass {
    pub fn of(author: &str) -> Self {
        if author == ASSISTANT_AUTHOR {
            AuthorClass::Assistant
        } else {
            AuthorClass::User
        }
    }
}

impl fmt::Display for AuthorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorClass::User => write!(f, "user"),
            AuthorClass::Assistant => write!(f, "assistant"),
        }
    }
}
