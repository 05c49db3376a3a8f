//! Token-formatted conversation history with a word-level sliding window.

use std::collections::VecDeque;

use adventurer_core::{AuthorClass, Turn};

pub const USER_TOKEN: &str = "<|user|>";
pub const ASSISTANT_TOKEN: &str = "<|assistant|>";
pub const END_TOKEN: &str = "</s>";
pub const PREPROMPT_SEP: &str = "\n-----\n";

/// Wrap a turn in its author's start token and the shared end token.
pub fn format_turn(turn: &Turn) -> String {
    let token = match turn.class() {
        AuthorClass::Assistant => ASSISTANT_TOKEN,
        AuthorClass::User => USER_TOKEN,
    };
    format!("{token}{}{END_TOKEN}", turn.content())
}

/// Recover the author class from a formatted turn's start token.
pub fn author_of(formatted: &str) -> Option<AuthorClass> {
    if formatted.starts_with(ASSISTANT_TOKEN) {
        Some(AuthorClass::Assistant)
    } else if formatted.starts_with(USER_TOKEN) {
        Some(AuthorClass::User)
    } else {
        None
    }
}

/// Session history in three views: raw turns, formatted turns, and the
/// most recent `window_words` words of the formatted text.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    raw: Vec<Turn>,
    formatted: Vec<String>,
    window: VecDeque<String>,
    window_words: usize,
}

impl ConversationHistory {
    pub fn new(window_words: usize) -> Self {
        Self {
            raw: Vec::new(),
            formatted: Vec::new(),
            window: VecDeque::new(),
            window_words,
        }
    }

    pub fn push(&mut self, turns: &[Turn]) {
        for turn in turns {
            let line = format_turn(turn);
            // single-space split keeps newlines inside words, so joining
            // with a space reproduces the original text
            self.window.extend(line.split(' ').map(str::to_string));
            self.formatted.push(line);
            self.raw.push(turn.clone());
        }
        while self.window.len() > self.window_words {
            self.window.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.formatted.clear();
        self.window.clear();
    }

    pub fn raw(&self) -> &[Turn] {
        &self.raw
    }

    pub fn formatted(&self) -> &[String] {
        &self.formatted
    }

    /// Number of words currently in the window (never above the budget).
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Outbound prompt: preprompt, separator, windowed history, then the
    /// assistant start token the backend continues from.
    pub fn build_prompt(&self, preprompt: &str) -> String {
        let body = self
            .window
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{preprompt}{PREPROMPT_SEP}{body}{ASSISTANT_TOKEN}")
    }
}
