//! End-to-end behavior of the dispatch loop over an in-memory session.

use std::future::Ready;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_test::{assert_err, assert_ok};

use courier_core::{
    BoxedSession, ChatCategory, ChatId, Event, EventKind, MediaRef, RawEvent, Session,
    SessionChannels, SessionError, SessionResult, channel_session,
};
use courier_framework::{
    Dispatcher, DispatcherOptions, DispatcherState, HistoryQuery, Rule, on_any, on_kind,
};

const SELF_ID: &str = "bot_self";

fn text(from: &str, body: &str) -> RawEvent {
    RawEvent::text(from, body).category(ChatCategory::Direct)
}

fn counting(counter: &Arc<AtomicUsize>) -> impl Fn(Arc<Event>) -> Ready<()> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    }
}

/// Runs the loop until every queued event has been consumed.
async fn drain(dispatcher: &Dispatcher, channels: SessionChannels, events: Vec<RawEvent>) {
    for event in events {
        assert_ok!(channels.inbound.push(event).await);
    }
    drop(channels);
    assert_ok!(dispatcher.run().await);
}

fn new_dispatcher(options: DispatcherOptions) -> (Dispatcher, SessionChannels) {
    let (session, channels) = channel_session(SELF_ID, 64);
    (Dispatcher::with_options(Arc::new(session), options), channels)
}

#[tokio::test]
async fn disabled_newest_registration_blocks_older_ones() {
    let (dispatcher, channels) = new_dispatcher(DispatcherOptions::default());
    let older = Arc::new(AtomicUsize::new(0));
    let newer = Arc::new(AtomicUsize::new(0));

    dispatcher.register(on_kind(EventKind::Text).concurrent(false).handler(counting(&older)));
    let b = dispatcher.register(on_kind(EventKind::Text).concurrent(false).handler(counting(&newer)));
    assert_ok!(dispatcher.disable(Some(b)));

    drain(&dispatcher, channels, vec![text("friend", "hello")]).await;

    assert_eq!(older.load(Ordering::SeqCst), 0);
    assert_eq!(newer.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn system_events_never_match_rules_without_kinds() {
    let (dispatcher, channels) = new_dispatcher(DispatcherOptions::default());
    let counter = Arc::new(AtomicUsize::new(0));
    dispatcher.register(on_any().concurrent(false).handler(counting(&counter)));

    drain(&dispatcher, channels, vec![RawEvent::system("friend")]).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(dispatcher.history().is_empty());
}

#[tokio::test]
async fn self_origin_halts_matching() {
    let (dispatcher, channels) = new_dispatcher(DispatcherOptions::default());
    let fallback = Arc::new(AtomicUsize::new(0));
    let counter = Arc::new(AtomicUsize::new(0));

    dispatcher.register(Rule::new().except_self(false).concurrent(false).handler(counting(&fallback)));
    dispatcher.register(Rule::new().concurrent(false).handler(counting(&counter)));

    drain(
        &dispatcher,
        channels,
        vec![text(SELF_ID, "from my phone"), text("friend", "hello")],
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_inline_handler_keeps_the_loop_running() {
    let (session, channels) = channel_session(SELF_ID, 8);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(session)));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    dispatcher.register(Rule::new().concurrent(false).handler(move |event: Arc<Event>| {
        let seen_tx = seen_tx.clone();
        async move {
            let _ = seen_tx.send(event.text().unwrap_or_default().to_string());
            Err::<(), _>(anyhow::anyhow!("always fails"))
        }
    }));

    let handle = assert_ok!(dispatcher.spawn());
    assert_ok!(channels.inbound.push(text("friend", "first")).await);
    assert_ok!(channels.inbound.push(text("friend", "second")).await);

    assert_eq!(seen_rx.recv().await.as_deref(), Some("first"));
    assert_eq!(seen_rx.recv().await.as_deref(), Some("second"));
    assert_eq!(dispatcher.state(), DispatcherState::Running);

    dispatcher.stop();
    assert_ok!(handle.await);
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}

#[tokio::test]
async fn concurrent_handlers_do_not_block_the_loop() {
    let (session, mut channels) = channel_session(SELF_ID, 8);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(session)));
    let release = Arc::new(Notify::new());

    let gate = Arc::clone(&release);
    dispatcher.register(on_kind(EventKind::Text).handler(move |event: Arc<Event>| {
        let gate = Arc::clone(&gate);
        async move {
            match event.text().unwrap_or_default() {
                "block" => {
                    gate.notified().await;
                    "unblocked".to_string()
                }
                "boom" => panic!("handler exploded"),
                other => format!("next: {other}"),
            }
        }
    }));

    let handle = assert_ok!(dispatcher.spawn());
    assert_ok!(channels.inbound.push(text("friend", "block")).await);
    assert_ok!(channels.inbound.push(text("friend", "second")).await);

    let sent = channels.outbound.recv().await.unwrap();
    assert_eq!(sent.text, "next: second");

    assert_ok!(channels.inbound.push(text("friend", "boom")).await);
    assert_ok!(channels.inbound.push(text("friend", "fourth")).await);
    let sent = channels.outbound.recv().await.unwrap();
    assert_eq!(sent.text, "next: fourth");
    assert_eq!(dispatcher.state(), DispatcherState::Running);

    release.notify_one();
    let sent = channels.outbound.recv().await.unwrap();
    assert_eq!(sent.text, "unblocked");
    assert_eq!(dispatcher.state(), DispatcherState::Running);

    dispatcher.stop();
    assert_ok!(handle.await);
}

#[tokio::test]
async fn tuple_reply_is_sent_once() {
    let (session, mut channels) = channel_session(SELF_ID, 8);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(session)));
    dispatcher.register(on_kind(EventKind::Text).handler(|_event: Arc<Event>| async {
        ("here you go", MediaRef::new("media_42"))
    }));

    let handle = assert_ok!(dispatcher.spawn());
    assert_ok!(channels.inbound.push(text("friend", "picture please")).await);

    let sent = channels.outbound.recv().await.unwrap();
    assert_eq!(sent.target, ChatId::new("friend"));
    assert_eq!(sent.text, "here you go");
    assert_eq!(sent.media, Some(MediaRef::new("media_42")));

    dispatcher.stop();
    assert_ok!(handle.await);
    assert!(channels.outbound.try_recv().is_err());
}

#[tokio::test]
async fn history_keeps_the_latest_window() {
    let options = DispatcherOptions {
        max_history: 5,
        ..Default::default()
    };
    let (dispatcher, channels) = new_dispatcher(options);

    let events = (0..8).map(|i| text("friend", &format!("msg {i}"))).collect();
    drain(&dispatcher, channels, events).await;

    let kept: Vec<_> = dispatcher
        .history()
        .snapshot()
        .iter()
        .map(|e| e.text().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kept, vec!["msg 3", "msg 4", "msg 5", "msg 6", "msg 7"]);
}

#[tokio::test]
async fn search_preserves_arrival_order() {
    let (dispatcher, channels) = new_dispatcher(DispatcherOptions::default());
    let events = vec![
        text("alice", "Lunch today?"),
        RawEvent::text("team", "lunch at noon")
            .category(ChatCategory::Group)
            .sender("bob"),
        text("carol", "meeting notes"),
        text("alice", "LUNCH moved"),
    ];
    drain(&dispatcher, channels, events).await;

    let lunch = dispatcher.search(&HistoryQuery::new().text("lunch"));
    let chats: Vec<_> = lunch.iter().map(|e| e.chat().id.as_str()).collect();
    assert_eq!(chats, vec!["alice", "team", "alice"]);

    let from_bob = dispatcher.search(&HistoryQuery::new().sender("bob"));
    assert_eq!(from_bob.len(), 1);
    assert_eq!(from_bob[0].member(), Some(&ChatId::new("bob")));

    assert_eq!(dispatcher.search(&HistoryQuery::new()).len(), 4);
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let (dispatcher, channels) = new_dispatcher(DispatcherOptions::default());
    drain(&dispatcher, channels, Vec::new()).await;
    assert_err!(dispatcher.run().await);
}

/// A session whose first poll fails before it starts delivering events.
struct FlakySession {
    self_id: ChatId,
    script: Mutex<Vec<SessionResult<RawEvent>>>,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Session for FlakySession {
    fn self_id(&self) -> &ChatId {
        &self.self_id
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn poll_next_event(&self) -> SessionResult<RawEvent> {
        let mut script = self.script.lock();
        if script.is_empty() {
            Err(SessionError::Terminated)
        } else {
            script.remove(0)
        }
    }

    async fn send(&self, _target: &ChatId, text: &str, _media: Option<&MediaRef>) -> SessionResult<()> {
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    async fn persist_state(&self) -> SessionResult<()> {
        Err(SessionError::Persist("read-only storage".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn poll_errors_are_retried() {
    let session = Arc::new(FlakySession {
        self_id: ChatId::new(SELF_ID),
        script: Mutex::new(vec![
            Err(SessionError::Poll("connection reset".to_string())),
            Ok(text("friend", "ping")),
        ]),
        sent: Mutex::new(Vec::new()),
    });
    let options = DispatcherOptions {
        poll_retry_delay: Duration::from_millis(50),
        ..Default::default()
    };
    let dispatcher = Dispatcher::with_options(Arc::clone(&session) as BoxedSession, options);
    dispatcher.register(Rule::new().concurrent(false).handler(|_event: Arc<Event>| async { "pong" }));

    assert_ok!(dispatcher.run().await);

    assert_eq!(*session.sent.lock(), vec!["pong".to_string()]);
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}
