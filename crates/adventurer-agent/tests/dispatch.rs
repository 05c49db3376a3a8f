//! Drain-cycle behaviour of the adventurer against a scripted backend.
//!
//! Session 0 from the factory is always the adventurer's long-lived
//! session; every later session is a bootstrap session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use adventurer_agent::{
    Adventurer, BackendError, BackendFactory, ChatBackend, DispatchError, DrainOutcome,
    HandlerError, ResponseHandler,
};
use adventurer_core::{LogHub, LogLevel, LogMessage, LogSubscriber, PromptTemplates, Turn};

const IDLE_TICK: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct Script {
    created: AtomicUsize,
    starts: Mutex<Vec<usize>>,
    stops: Mutex<Vec<usize>>,
    sends: Mutex<Vec<(usize, Vec<Turn>)>>,
    preprompts: Mutex<Vec<(usize, String)>>,
    failures: Mutex<VecDeque<BackendError>>,
    fail_bootstrap: Mutex<bool>,
    gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl Script {
    fn fail_next(&self, error: BackendError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Returns `(entered, release)`. Session 0 sends notify `entered` and
    /// then wait for `release`.
    fn gate(&self) -> (Arc<Notify>, Arc<Notify>) {
        let pair = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        *self.gate.lock().unwrap() = Some(pair.clone());
        pair
    }

    fn sends_on(&self, session: usize) -> Vec<Vec<Turn>> {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(idx, _)| *idx == session)
            .map(|(_, turns)| turns.clone())
            .collect()
    }

    fn bootstrap_sends(&self) -> usize {
        self.sends
            .lock()
            .unwrap()
            .iter()
            .filter(|(idx, _)| *idx > 0)
            .count()
    }
}

struct ScriptedBackend {
    index: usize,
    exchanges: usize,
    script: Arc<Script>,
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        self.script.starts.lock().unwrap().push(self.index);
        self.exchanges = 0;
        Ok(())
    }

    fn set_preprompt(&mut self, preprompt: &str) {
        self.script
            .preprompts
            .lock()
            .unwrap()
            .push((self.index, preprompt.to_string()));
    }

    async fn send(&mut self, turns: &[Turn]) -> Result<String, BackendError> {
        self.script
            .sends
            .lock()
            .unwrap()
            .push((self.index, turns.to_vec()));
        self.exchanges += 1;

        if self.index > 0 {
            if *self.script.fail_bootstrap.lock().unwrap() {
                return Err(BackendError::Protocol("bootstrap refused".into()));
            }
            return Ok(match self.exchanges {
                1 => format!("a knight from session {}", self.index),
                _ => "STR 10".to_string(),
            });
        }

        let gate = self.script.gate.lock().unwrap().clone();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }

        if let Some(e) = self.script.failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(format!("reply to {} turns", turns.len()))
    }

    async fn stop(&mut self) {
        self.script.stops.lock().unwrap().push(self.index);
    }
}

fn factory(script: &Arc<Script>) -> BackendFactory {
    let script = Arc::clone(script);
    Arc::new(move || {
        let index = script.created.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedBackend {
            index,
            exchanges: 0,
            script: Arc::clone(&script),
        }) as Box<dyn ChatBackend>
    })
}

fn templates() -> PromptTemplates {
    PromptTemplates {
        adventurer: "You are $description. Stats: $attributes".into(),
        attributes: "List your attributes".into(),
        description: "Describe yourself".into(),
        backend_default: "default".into(),
    }
}

#[derive(Default)]
struct Collector {
    replies: Mutex<Vec<String>>,
}

impl Collector {
    fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseHandler for Collector {
    async fn on_response(&self, reply: &str) -> Result<(), HandlerError> {
        self.replies.lock().unwrap().push(reply.to_string());
        Ok(())
    }
}

struct Rejecting;

#[async_trait]
impl ResponseHandler for Rejecting {
    async fn on_response(&self, _reply: &str) -> Result<(), HandlerError> {
        Err(HandlerError::new("rejecting", "channel gone"))
    }
}

/// Rejects the first entry it sees, accepts the rest.
#[derive(Default)]
struct FlakyOnce {
    tripped: AtomicBool,
}

#[async_trait]
impl LogSubscriber for FlakyOnce {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn deliver(&self, _message: &LogMessage) -> adventurer_core::Result<()> {
        if self.tripped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        Err(adventurer_core::log::subscriber_failure("flaky", "sink down"))
    }
}

#[derive(Default)]
struct LogRecorder {
    entries: Mutex<Vec<LogMessage>>,
}

impl LogRecorder {
    fn entries(&self) -> Vec<LogMessage> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSubscriber for LogRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn deliver(&self, message: &LogMessage) -> adventurer_core::Result<()> {
        self.entries.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Fixture {
    script: Arc<Script>,
    hub: Arc<LogHub>,
    adventurer: Arc<Adventurer>,
    collector: Arc<Collector>,
    errors: Arc<LogRecorder>,
    everything: Arc<LogRecorder>,
}

fn fixture(tick: Duration) -> Fixture {
    let script = Arc::new(Script::default());
    let hub = Arc::new(LogHub::empty());
    let errors = Arc::new(LogRecorder::default());
    let everything = Arc::new(LogRecorder::default());
    hub.subscribe(LogLevel::Error, errors.clone());
    hub.subscribe(LogLevel::All, everything.clone());

    let adventurer = Adventurer::new(factory(&script), templates(), tick, Arc::clone(&hub));
    let collector = Arc::new(Collector::default());
    adventurer.register_response_handler(collector.clone());

    Fixture {
        script,
        hub,
        adventurer,
        collector,
        errors,
        everything,
    }
}

#[tokio::test]
async fn initialize_bootstraps_persona_on_a_scoped_session() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();

    let expected = "You are a knight from session 1. Stats: STR 10";
    assert_eq!(f.adventurer.preprompt().as_deref(), Some(expected));
    assert_eq!(
        *f.script.preprompts.lock().unwrap(),
        vec![(0, expected.to_string())]
    );

    // description then attributes, on the same bootstrap session
    assert_eq!(
        f.script.sends_on(1),
        vec![
            vec![Turn::user("Describe yourself")],
            vec![Turn::user("List your attributes")],
        ]
    );
    assert_eq!(*f.script.starts.lock().unwrap(), vec![0, 1]);
    assert_eq!(*f.script.stops.lock().unwrap(), vec![1]);

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn batch_is_sent_in_order_and_broadcast_once() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();

    f.adventurer.enqueue("user", "hello");
    f.adventurer.enqueue("user", "again");
    let outcome = f.adventurer.drain_once().await.unwrap();

    assert!(matches!(outcome, DrainOutcome::Delivered { turns: 2, ref reply } if reply == "reply to 2 turns"));
    assert_eq!(
        f.script.sends_on(0),
        vec![vec![Turn::user("hello"), Turn::user("again")]]
    );
    assert_eq!(f.collector.replies(), vec!["reply to 2 turns"]);
    assert_eq!(f.adventurer.pending_len(), 0);

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn backend_failure_logs_one_error_and_broadcasts_nothing() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();
    f.script.fail_next(BackendError::Protocol("overloaded".into()));

    f.adventurer.enqueue("ann", "hi");
    let outcome = f.adventurer.drain_once().await.unwrap();

    assert!(matches!(outcome, DrainOutcome::Failed(BackendError::Protocol(_))));
    assert!(f.collector.replies().is_empty());

    let errors = f.errors.entries();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].sender, "Adventurer");
    assert_eq!(errors[0].content, "Error while talking to the assistant");
    assert!(errors[0].error.as_deref().unwrap().contains("overloaded"));

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn empty_queue_skips_backend_and_logs_nothing() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();
    let logged_before = f.everything.entries().len();
    let sends_before = f.script.sends_on(0).len();

    let outcome = f.adventurer.drain_once().await.unwrap();

    assert!(matches!(outcome, DrainOutcome::Empty));
    assert_eq!(f.script.sends_on(0).len(), sends_before);
    assert_eq!(f.everything.entries().len(), logged_before);
    assert!(f.collector.replies().is_empty());

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn refresh_clears_queue_and_bootstraps_again() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();
    f.adventurer.enqueue("ann", "stale");
    f.adventurer.enqueue("bob", "also stale");

    f.adventurer.refresh().await.unwrap();

    assert_eq!(f.adventurer.pending_len(), 0);
    assert_eq!(f.script.bootstrap_sends(), 4);
    assert_eq!(
        f.adventurer.preprompt().as_deref(),
        Some("You are a knight from session 2. Stats: STR 10")
    );
    // long-lived session restarted, both bootstrap sessions closed
    assert_eq!(*f.script.starts.lock().unwrap(), vec![0, 1, 0, 2]);
    assert_eq!(*f.script.stops.lock().unwrap(), vec![1, 0, 2]);

    assert!(matches!(
        f.adventurer.drain_once().await.unwrap(),
        DrainOutcome::Empty
    ));
    assert!(f.script.sends_on(0).is_empty());

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn messages_queued_mid_exchange_wait_for_the_next_cycle() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();
    let (entered, release) = f.script.gate();

    f.adventurer.enqueue("ann", "first");
    let adventurer = Arc::clone(&f.adventurer);
    let inflight = tokio::spawn(async move { adventurer.drain_once().await });

    entered.notified().await;
    assert!(f.adventurer.is_draining());
    f.adventurer.enqueue("bob", "second");
    assert_eq!(f.adventurer.pending_len(), 1);

    release.notify_one();
    let first = inflight.await.unwrap().unwrap();
    assert!(matches!(first, DrainOutcome::Delivered { turns: 1, .. }));
    assert!(!f.adventurer.is_draining());

    release.notify_one();
    let second = f.adventurer.drain_once().await.unwrap();
    assert!(matches!(second, DrainOutcome::Delivered { turns: 1, .. }));
    assert_eq!(
        f.script.sends_on(0),
        vec![vec![Turn::new("ann", "first")], vec![Turn::new("bob", "second")]]
    );

    f.adventurer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn loop_keeps_ticking_after_a_failed_cycle() {
    let f = fixture(Duration::from_millis(100));
    f.adventurer.initialize().await.unwrap();
    f.script.fail_next(BackendError::Timeout { ms: 10 });

    f.adventurer.enqueue("ann", "lost");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(f.errors.entries().len(), 1);
    assert!(f.collector.replies().is_empty());

    f.adventurer.enqueue("ann", "kept");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.collector.replies(), vec!["reply to 1 turns"]);

    f.adventurer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_loop() {
    let f = fixture(Duration::from_millis(100));
    f.adventurer.initialize().await.unwrap();
    f.adventurer.shutdown().await;

    f.adventurer.enqueue("ann", "nobody home");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(f.adventurer.pending_len(), 1);
    assert!(f.script.sends_on(0).is_empty());
}

#[tokio::test]
async fn intro_queues_the_introduction_prompt() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();

    f.adventurer.intro().await.unwrap();
    assert_eq!(f.adventurer.pending_len(), 1);
    f.adventurer.drain_once().await.unwrap();

    assert_eq!(
        f.script.sends_on(0),
        vec![vec![Turn::user("Introduce yourself.")]]
    );
    assert!(f
        .everything
        .entries()
        .iter()
        .any(|m| m.level == LogLevel::Info
            && m.content == "New adventurer ready, wait for their introduction"));

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn handler_failure_surfaces_from_drain() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();
    f.adventurer.register_response_handler(Arc::new(Rejecting));

    f.adventurer.enqueue("ann", "hi");
    let err = f.adventurer.drain_once().await.unwrap_err();

    assert!(matches!(err, DispatchError::Handler(ref h) if h.handler == "rejecting"));
    // handlers registered earlier still saw the reply
    assert_eq!(f.collector.replies(), vec!["reply to 1 turns"]);

    f.adventurer.shutdown().await;
}

#[tokio::test]
async fn failed_bootstrap_propagates_and_closes_the_scoped_session() {
    let f = fixture(IDLE_TICK);
    *f.script.fail_bootstrap.lock().unwrap() = true;

    let err = f.adventurer.initialize().await.unwrap_err();

    assert!(matches!(err, DispatchError::Backend(BackendError::Protocol(_))));
    assert!(f.adventurer.preprompt().is_none());
    assert_eq!(*f.script.stops.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn rejected_log_entry_does_not_lose_the_batch() {
    let f = fixture(IDLE_TICK);
    f.adventurer.initialize().await.unwrap();
    let flaky = Arc::new(FlakyOnce::default());
    f.hub.subscribe(LogLevel::Debug, flaky.clone());

    f.adventurer.enqueue("ann", "hello");
    f.adventurer.enqueue("bob", "hi");
    let outcome = f.adventurer.drain_once().await.unwrap();

    assert!(flaky.tripped.load(Ordering::SeqCst));
    assert!(matches!(outcome, DrainOutcome::Delivered { turns: 2, .. }));
    assert_eq!(
        f.script.sends_on(0),
        vec![vec![Turn::new("ann", "hello"), Turn::new("bob", "hi")]]
    );
    assert_eq!(f.collector.replies(), vec!["reply to 2 turns"]);
    assert_eq!(f.adventurer.pending_len(), 0);

    f.adventurer.shutdown().await;
}
