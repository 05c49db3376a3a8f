use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use adventurer_core::config::{GenerationParameters, HuggingChatConfig};
use adventurer_core::{LogLevel, LogMessage, Reporter, Turn};

use crate::backend::ChatBackend;
use crate::error::BackendError;
use crate::history::{ConversationHistory, END_TOKEN};
use crate::stream::StreamAccumulator;
use crate::throttle::Throttle;

pub const LOG_NAME: &str = "HuggingChat";

const POST_FAILED: &str = "Failed to post request to HuggingChat";
const CONN_FAILED: &str = "Failed to establish connection to HuggingChat";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote conversation opened by `start`.
#[derive(Debug, Clone)]
struct Conversation {
    id: String,
    url: String,
}

/// HuggingChat session: keeps its own rolling context and replays the most
/// recent window of it with every request.
pub struct HuggingChat {
    config: HuggingChatConfig,
    default_preprompt: String,
    preprompt: String,
    history: ConversationHistory,
    client: Option<reqwest::Client>,
    origin: String,
    conversation: Option<Conversation>,
    throttle: Throttle,
    log: Reporter,
}

impl HuggingChat {
    pub fn new(config: HuggingChatConfig, default_preprompt: String, log: Reporter) -> Self {
        let throttle = Throttle::new(Duration::from_millis(config.throttle_ms));
        let history = ConversationHistory::new(config.window_words);
        Self {
            preprompt: default_preprompt.clone(),
            default_preprompt,
            history,
            client: None,
            origin: String::new(),
            conversation: None,
            throttle,
            log,
            config,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn preprompt(&self) -> &str {
        &self.preprompt
    }

    fn api_route(&self) -> String {
        format!("{}/conversation", self.config.base_url.trim_end_matches('/'))
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    fn reset(&mut self) {
        self.history.clear();
        self.preprompt = self.default_preprompt.clone();
        self.conversation = None;
    }

    /// Build the HTTP client and check the service answers at all.
    async fn connect(&mut self) -> Result<reqwest::Client, BackendError> {
        let origin = reqwest::Url::parse(&self.config.base_url)
            .map_err(|e| BackendError::Connection(format!("invalid base url: {e}")))?
            .origin()
            .ascii_serialization();

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(self.config.user_agent.as_str())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        client
            .get(&self.config.base_url)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        self.origin = origin;
        Ok(client)
    }

    /// Ask for a fresh remote conversation, retrying a bounded number of times.
    /// Exhausting every attempt is logged, not raised.
    async fn open_conversation(&mut self, client: &reqwest::Client) {
        let attempts = self.config.new_chat_attempts.max(1);
        for attempt in 1..=attempts {
            self.throttle.ready().await;
            let result = self.request_conversation(client).await;
            self.throttle.mark();

            match result {
                Ok(conversation) => {
                    info!(conversation_id = %conversation.id, attempt, "HuggingChat conversation opened");
                    self.conversation = Some(conversation);
                    return;
                }
                Err(e) => {
                    let message = format!("Failed to create new chat ({attempt}/{attempts})");
                    self.report(LogLevel::Error, &message, &e).await;
                }
            }
        }
        warn!(attempts, "no HuggingChat conversation, every send will fail until restart");
    }

    async fn request_conversation(
        &self,
        client: &reqwest::Client,
    ) -> Result<Conversation, BackendError> {
        let route = self.api_route();
        let resp = client
            .post(&route)
            .json(&NewConversationRequest {
                model: &self.config.model,
            })
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status,
                message: text,
            });
        }

        let body: NewConversationResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(Conversation {
            url: format!("{route}/{}", body.conversation_id),
            id: body.conversation_id,
        })
    }

    async fn exchange(&self, prompt: &str) -> Result<String, BackendError> {
        let client = self.client.as_ref().ok_or(BackendError::NotStarted)?;
        let conversation = self
            .conversation
            .as_ref()
            .ok_or(BackendError::NoConversation)?;

        let body = build_request_body(prompt, &self.config.parameters);
        debug!(conversation_id = %conversation.id, prompt_len = prompt.len(), "posting prompt to HuggingChat");

        let resp = client
            .post(&conversation.url)
            .header("Origin", &self.origin)
            .header("Referer", &conversation.url)
            .header("Accept", "*/*")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .json(&body)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "HuggingChat API error");
            return Err(BackendError::Api {
                status,
                message: text,
            });
        }

        let mut acc = StreamAccumulator::new();
        let mut byte_stream = resp.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            acc.push(&chunk?)?;
        }
        acc.finish()
    }

    /// Log a failure on the hub; a rejecting hub is only worth a warning here.
    ///
    /// Failures that are also returned to the caller go out at Debug: the
    /// caller owns the Error entry for them.
    async fn report(&self, level: LogLevel, message: &str, error: &BackendError) {
        let entry = LogMessage::new(level, LOG_NAME, message).with_error(error);
        if let Err(e) = self.log.emit(entry).await {
            warn!(error = %e, "log hub rejected HuggingChat failure report");
        }
    }
}

#[async_trait]
impl ChatBackend for HuggingChat {
    fn name(&self) -> &str {
        "huggingchat"
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        self.reset();

        let client = match self.connect().await {
            Ok(client) => client,
            Err(e) => {
                self.report(LogLevel::Debug, CONN_FAILED, &e).await;
                return Err(e);
            }
        };

        self.open_conversation(&client).await;
        self.client = Some(client);
        Ok(())
    }

    fn set_preprompt(&mut self, preprompt: &str) {
        self.preprompt = preprompt.to_string();
    }

    async fn send(&mut self, turns: &[Turn]) -> Result<String, BackendError> {
        self.history.push(turns);
        let prompt = self.history.build_prompt(&self.preprompt);

        self.throttle.ready().await;
        let timeout = self.request_timeout();
        let result = match tokio::time::timeout(timeout, self.exchange(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        };
        self.throttle.mark();

        match result {
            Ok(reply) => {
                self.history.push(&[Turn::assistant(reply.as_str())]);
                Ok(reply)
            }
            Err(e) => {
                self.report(LogLevel::Debug, POST_FAILED, &e).await;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) {
        if self.client.take().is_some() {
            debug!("HuggingChat session closed");
        }
    }
}

fn classify(e: reqwest::Error) -> BackendError {
    if e.is_connect() {
        BackendError::Connection(e.to_string())
    } else {
        BackendError::Http(e)
    }
}

fn build_request_body<'a>(
    prompt: &'a str,
    parameters: &'a GenerationParameters,
) -> GenerateRequest<'a> {
    GenerateRequest {
        inputs: prompt,
        parameters: RequestParameters {
            generation: parameters,
            stop: [END_TOKEN],
            stream: true,
        },
        options: RequestOptions {
            id: uuid::Uuid::new_v4().to_string(),
            is_retry: false,
            use_cache: false,
        },
    }
}

// HuggingChat wire types (private)

#[derive(Serialize)]
struct NewConversationRequest<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewConversationResponse {
    conversation_id: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: RequestParameters<'a>,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestParameters<'a> {
    #[serde(flatten)]
    generation: &'a GenerationParameters,
    stop: [&'static str; 1],
    stream: bool,
}

#[derive(Serialize)]
struct RequestOptions {
    id: String,
    is_retry: bool,
    use_cache: bool,
}
