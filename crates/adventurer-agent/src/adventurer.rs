//! The adventurer: a persona that batches inbound messages into turns.
//!
//! Callers [`Adventurer::enqueue`] messages at any time. A background loop
//! wakes every tick, drains the queue, sends the whole batch to the one
//! long-lived backend session, and hands the reply to every registered
//! [`ResponseHandler`]. Backend failures are logged and the loop carries on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use adventurer_core::types::DEFAULT_AUTHOR;
use adventurer_core::{LogHub, PromptTemplates, Reporter, Turn};

use crate::backend::{BackendFactory, ChatBackend, ScopedSession};
use crate::error::{BackendError, DispatchError, HandlerError};

pub const LOG_NAME: &str = "Adventurer";

/// Prompt queued by [`Adventurer::intro`].
pub const INTRO_PROMPT: &str = "Introduce yourself.";

/// Receives every reply the backend produces, in registration order.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn on_response(&self, reply: &str) -> Result<(), HandlerError>;
}

/// What one drain cycle did.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Queue was empty; the backend was not called.
    Empty,
    /// The backend call failed; nothing was broadcast.
    Failed(BackendError),
    /// `turns` entries were sent and `reply` reached every handler.
    Delivered { turns: usize, reply: String },
}

/// Logs every reply on the hub. Registered first on every adventurer.
struct ReplyLog {
    log: Reporter,
}

#[async_trait]
impl ResponseHandler for ReplyLog {
    async fn on_response(&self, reply: &str) -> Result<(), HandlerError> {
        self.log
            .debug_long(format!("Response received:\n{reply}"))
            .await
            .map_err(|e| HandlerError::new("reply-log", e))
    }
}

pub struct Adventurer {
    factory: BackendFactory,
    templates: PromptTemplates,
    tick: Duration,
    /// The long-lived session. Only the adventurer sends on it.
    session: tokio::sync::Mutex<Box<dyn ChatBackend>>,
    /// Pending turns. Never locked across an await.
    queue: Mutex<Vec<Turn>>,
    handlers: RwLock<Vec<Arc<dyn ResponseHandler>>>,
    preprompt: RwLock<Option<String>>,
    /// Cancels the running drain loop, if any.
    worker: tokio::sync::Mutex<Option<CancellationToken>>,
    draining: AtomicBool,
    log: Reporter,
}

impl Adventurer {
    /// Build an adventurer around a fresh session from `factory`. Nothing
    /// is started until [`Adventurer::initialize`].
    pub fn new(
        factory: BackendFactory,
        templates: PromptTemplates,
        tick: Duration,
        hub: Arc<LogHub>,
    ) -> Arc<Self> {
        let log = Reporter::new(hub, LOG_NAME);
        let session = factory();
        let reply_log: Arc<dyn ResponseHandler> = Arc::new(ReplyLog { log: log.clone() });
        Arc::new(Self {
            factory,
            templates,
            tick,
            session: tokio::sync::Mutex::new(session),
            queue: Mutex::new(Vec::new()),
            handlers: RwLock::new(vec![reply_log]),
            preprompt: RwLock::new(None),
            worker: tokio::sync::Mutex::new(None),
            draining: AtomicBool::new(false),
            log,
        })
    }

    /// Start the session, synthesize and apply the persona preprompt, then
    /// start the periodic drain loop. Bootstrap failures propagate.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), DispatchError> {
        self.log.info("Creating new adventurer").await?;

        self.session.lock().await.start().await?;

        let preprompt = self.build_preprompt().await?;
        self.session.lock().await.set_preprompt(&preprompt);
        *self
            .preprompt
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(preprompt);

        self.spawn_worker().await;
        Ok(())
    }

    /// Stop the session and cancel the drain loop. The queue is kept.
    ///
    /// An exchange already in flight finishes first; the loop exits at its
    /// next wait.
    pub async fn shutdown(&self) {
        if let Some(cancel) = self.worker.lock().await.take() {
            cancel.cancel();
        }
        self.session.lock().await.stop().await;
        info!("adventurer shut down");
    }

    /// Start over with a brand-new persona and an empty queue.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), DispatchError> {
        self.shutdown().await;
        self.lock_queue().clear();
        self.initialize().await
    }

    /// Queue a message for the next drain. Never blocks, never fails.
    pub fn enqueue(&self, author: impl Into<String>, content: impl Into<String>) {
        let turn = Turn::new(author, content);
        debug!(author = %turn.author(), len = turn.content().len(), "message queued");
        self.lock_queue().push(turn);
    }

    /// Queue the fixed prompt asking the persona to introduce itself.
    pub async fn intro(&self) -> Result<(), DispatchError> {
        self.log
            .info("New adventurer ready, wait for their introduction")
            .await?;
        self.enqueue(DEFAULT_AUTHOR, INTRO_PROMPT);
        Ok(())
    }

    pub fn register_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handler);
    }

    pub fn pending_len(&self) -> usize {
        self.lock_queue().len()
    }

    /// The preprompt applied by the last successful `initialize`.
    pub fn preprompt(&self) -> Option<String> {
        self.preprompt
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Run one dispatch cycle now.
    ///
    /// The queue is snapshotted and cleared in one step before the backend
    /// is called, so anything enqueued meanwhile lands in the next cycle. A
    /// backend failure is logged and reported as [`DrainOutcome::Failed`].
    /// Handler failures are returned. A hub that rejects an entry is only
    /// warned about, so the batch still reaches the backend.
    pub async fn drain_once(&self) -> Result<DrainOutcome, DispatchError> {
        let batch = std::mem::take(&mut *self.lock_queue());
        if batch.is_empty() {
            return Ok(DrainOutcome::Empty);
        }

        self.draining.store(true, Ordering::SeqCst);
        let outcome = self.dispatch(batch).await;
        self.draining.store(false, Ordering::SeqCst);
        outcome
    }

    async fn dispatch(&self, batch: Vec<Turn>) -> Result<DrainOutcome, DispatchError> {
        let turns = batch.len();
        // the batch is already out of the queue; a hub failure must not drop it
        let found = self
            .log
            .debug(format!(
                "Found {turns} new messages. Sending them to the assistant"
            ))
            .await;
        note_rejected(found);

        let result = self.session.lock().await.send(&batch).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                note_rejected(
                    self.log
                        .failure("Error while talking to the assistant", &e)
                        .await,
                );
                return Ok(DrainOutcome::Failed(e));
            }
        };

        for handler in self.handlers_snapshot() {
            handler.on_response(&reply).await?;
        }
        Ok(DrainOutcome::Delivered { turns, reply })
    }

    async fn build_preprompt(&self) -> Result<String, DispatchError> {
        self.log.debug("Creating character preprompt").await?;

        let mut scoped = ScopedSession::open((self.factory)()).await?;
        let persona = self.bootstrap_persona(&mut scoped).await;
        scoped.close().await;
        let (description, attributes) = persona?;

        let preprompt = self.templates.render_persona(&description, &attributes);
        self.log
            .debug_long(format!("Preprompt created:\n{preprompt}"))
            .await?;
        Ok(preprompt)
    }

    /// Two bootstrap exchanges on the same short-lived session, so the
    /// attributes are generated with the description in context.
    async fn bootstrap_persona(
        &self,
        scoped: &mut ScopedSession,
    ) -> Result<(String, String), DispatchError> {
        self.log.debug("Creating character description").await?;
        let description = scoped
            .exchange(&[Turn::user(self.templates.description.as_str())])
            .await?;

        self.log.debug("Creating character attributes").await?;
        let attributes = scoped
            .exchange(&[Turn::user(self.templates.attributes.as_str())])
            .await?;

        Ok((description, attributes))
    }

    async fn spawn_worker(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        tokio::spawn(Arc::clone(self).run(cancel.clone()));

        if let Some(previous) = self.worker.lock().await.replace(cancel) {
            previous.cancel();
        }
    }

    /// Drain loop. Every cycle ends by waiting for the next tick, however
    /// the cycle went.
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(tick_ms = self.tick.as_millis() as u64, "adventurer loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.tick) => {}
            }

            match self.drain_once().await {
                Ok(DrainOutcome::Delivered { turns, .. }) => {
                    debug!(turns, "drain cycle delivered a reply");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "drain cycle failed"),
            }
        }
        info!("adventurer loop stopped");
    }

    fn handlers_snapshot(&self) -> Vec<Arc<dyn ResponseHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Vec<Turn>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn note_rejected(result: adventurer_core::Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "log hub rejected adventurer entry");
    }
}
