use async_trait::async_trait;

use adventurer_core::Turn;

use crate::backend::ChatBackend;
use crate::error::BackendError;

/// Offline backend that answers every exchange with a rendering of the
/// turns it was given. Keeps history like a real session would.
#[derive(Debug, Default)]
pub struct EchoBackend {
    preprompt: String,
    history: Vec<Turn>,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preprompt(&self) -> &str {
        &self.preprompt
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

/// `author = "<author>"\ncontent = "<content>"` per turn, blank-line separated.
pub fn echo_reply(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("author = {:?}\ncontent = {:?}", t.author(), t.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ChatBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        self.history.clear();
        Ok(())
    }

    fn set_preprompt(&mut self, preprompt: &str) {
        self.preprompt = preprompt.to_string();
    }

    async fn send(&mut self, turns: &[Turn]) -> Result<String, BackendError> {
        self.history.extend_from_slice(turns);
        let reply = echo_reply(turns);
        self.history.push(Turn::assistant(reply.as_str()));
        Ok(reply)
    }

    async fn stop(&mut self) {}
}
