//! Event dispatcher for the Courier framework.
//!
//! The [`Dispatcher`] owns the control loop: it polls the session, normalizes
//! each raw payload into an [`Event`], records it in the [`HistoryLog`], asks
//! the [`RegistrationTable`] for a handler and runs it.
//!
//! # Per-event flow
//!
//! 1. The raw payload is normalized into an `Arc<Event>`
//! 2. Non-system events are appended to the history
//! 3. Registrations are checked newest first (see [`RegistrationTable::match_event`])
//! 4. The matched handler runs inline or on its own task
//! 5. A reply returned by the handler is sent to the event's origin chat
//!
//! Handler errors and panics are logged and never reach the loop. Inline
//! handlers are not timed out: a handler that never returns stalls the loop.
//!
//! ```rust,ignore
//! use courier_framework::{Dispatcher, Rule};
//!
//! let dispatcher = Arc::new(Dispatcher::new(session));
//! dispatcher.register(Rule::new().kind(EventKind::Text).handler(echo));
//!
//! let handle = dispatcher.spawn()?;
//! // ...
//! dispatcher.stop();
//! handle.await?;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use crate::error::{DispatchError, DispatchResult, HandlerError};
use crate::history::{DEFAULT_MAX_HISTORY, HistoryLog, HistoryQuery};
use crate::registration::{HandlerId, HandlerRegistration};
use crate::table::{Matched, RegistrationTable};
use courier_core::{BoxedSession, Event, RawEvent, SessionError};

// ============================================================================
// Options and state
// ============================================================================

/// Tunables of a [`Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Number of events kept in the history log.
    pub max_history: usize,
    /// Whether the session state is persisted when the loop exits.
    pub persist_on_exit: bool,
    /// Number of characters of a handler error logged at warning level.
    pub error_summary_len: usize,
    /// Pause after a failed poll before polling again.
    pub poll_retry_delay: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            persist_on_exit: true,
            error_summary_len: 120,
            poll_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Lifecycle state of a [`Dispatcher`].
///
/// `Idle -> Running -> Stopped`; a stopped dispatcher cannot be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherState {
    /// Created, not started.
    Idle,
    /// The control loop is running.
    Running,
    /// The control loop has exited or was asked to.
    Stopped,
}

impl DispatcherState {
    /// Returns the lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a single dispatched event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No registration took the event.
    Unmatched,
    /// An inline handler ran to completion.
    Completed,
    /// A concurrent handler was started on its own task.
    Spawned(JoinHandle<()>),
}

impl DispatchOutcome {
    /// Returns `true` if a handler was selected.
    pub fn is_matched(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }

    /// Waits for a spawned handler to finish. Returns immediately otherwise.
    pub async fn join(self) {
        if let Self::Spawned(handle) = self {
            if let Err(err) = handle.await {
                warn!(error = %err, "Handler task did not complete");
            }
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The central event dispatcher.
///
/// Shared between the loop and callers through `Arc`; every method takes
/// `&self`.
pub struct Dispatcher {
    session: BoxedSession,
    table: Arc<RegistrationTable>,
    history: Arc<HistoryLog>,
    options: DispatcherOptions,
    state: Mutex<DispatcherState>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Creates a dispatcher with default options.
    pub fn new(session: BoxedSession) -> Self {
        Self::with_options(session, DispatcherOptions::default())
    }

    /// Creates a dispatcher with the given options.
    pub fn with_options(session: BoxedSession, options: DispatcherOptions) -> Self {
        Self {
            session,
            table: Arc::new(RegistrationTable::new()),
            history: Arc::new(HistoryLog::new(options.max_history)),
            options,
            state: Mutex::new(DispatcherState::Idle),
            shutdown: CancellationToken::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Registration API
    // ------------------------------------------------------------------------

    /// Adds a registration. Later registrations take priority.
    pub fn register(&self, registration: HandlerRegistration) -> HandlerId {
        self.table.register(registration)
    }

    /// Enables one registration, or all of them with `None`.
    pub fn enable(&self, id: Option<HandlerId>) -> DispatchResult<()> {
        match id {
            Some(id) => self.table.enable(id),
            None => {
                self.table.enable_all();
                Ok(())
            }
        }
    }

    /// Disables one registration, or all of them with `None`.
    pub fn disable(&self, id: Option<HandlerId>) -> DispatchResult<()> {
        match id {
            Some(id) => self.table.disable(id),
            None => {
                self.table.disable_all();
                Ok(())
            }
        }
    }

    /// Returns the registration table.
    pub fn registrations(&self) -> &Arc<RegistrationTable> {
        &self.table
    }

    // ------------------------------------------------------------------------
    // History API
    // ------------------------------------------------------------------------

    /// Returns the history log.
    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    /// Searches the history log.
    pub fn search(&self, query: &HistoryQuery) -> Vec<Arc<Event>> {
        self.history.search(query)
    }

    // ------------------------------------------------------------------------
    // Lifecycle API
    // ------------------------------------------------------------------------

    /// Returns the session this dispatcher polls.
    pub fn session(&self) -> &BoxedSession {
        &self.session
    }

    /// Returns the options in effect.
    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> DispatcherState {
        *self.state.lock()
    }

    /// Runs the control loop on the current task until the session ends or
    /// [`stop`](Self::stop) is called.
    ///
    /// Fails with [`DispatchError::InvalidState`] unless the dispatcher is idle.
    pub async fn run(&self) -> DispatchResult<()> {
        self.begin()?;
        self.run_loop().await;
        Ok(())
    }

    /// Runs the control loop on a background task and returns immediately.
    pub fn spawn(self: &Arc<Self>) -> DispatchResult<JoinHandle<()>> {
        self.begin()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run_loop().await }))
    }

    /// Asks the control loop to exit.
    ///
    /// A pending poll is abandoned; a handler already running is not
    /// interrupted.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state != DispatcherState::Stopped {
            info!(from = %*state, "Stopping dispatcher");
            *state = DispatcherState::Stopped;
        }
        self.shutdown.cancel();
    }

    fn begin(&self) -> DispatchResult<()> {
        let mut state = self.state.lock();
        if *state != DispatcherState::Idle {
            return Err(DispatchError::InvalidState(*state));
        }
        *state = DispatcherState::Running;
        Ok(())
    }

    async fn run_loop(&self) {
        info!(
            self_id = %self.session.self_id(),
            registrations = self.table.len(),
            "Dispatcher running"
        );

        loop {
            if self.state() != DispatcherState::Running {
                break;
            }
            if !self.session.is_alive() {
                info!("Session is no longer alive");
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                polled = self.session.poll_next_event() => polled,
            };

            match polled {
                Ok(raw) => {
                    // Spawned handlers are detached; the loop does not wait for them.
                    let _ = self.dispatch(raw).await;
                }
                Err(SessionError::Terminated) => {
                    info!("Session terminated");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to poll session");
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.options.poll_retry_delay) => {}
                    }
                }
            }
        }

        self.finish().await;
    }

    async fn finish(&self) {
        if self.options.persist_on_exit {
            match self.session.persist_state().await {
                Ok(()) => debug!("Session state persisted"),
                Err(err) => warn!(error = %err, "Failed to persist session state"),
            }
        }
        *self.state.lock() = DispatcherState::Stopped;
        info!("Dispatcher stopped");
    }

    /// Processes one raw event outside the control loop.
    ///
    /// Records the event, selects a handler and runs it. Inline handlers are
    /// awaited; concurrent handlers are spawned and returned as a handle.
    pub async fn dispatch(&self, raw: RawEvent) -> DispatchOutcome {
        let event = Arc::new(Event::from_raw(raw));
        let span = debug_span!("dispatch", kind = %event.kind(), chat = %event.chat().id);

        async {
            debug!("{event}");

            if !event.kind().is_system() {
                self.history.append(Arc::clone(&event));
            }

            let Some(matched) = self.table.match_event(&event, self.session.self_id()) else {
                trace!("No registration matched");
                return DispatchOutcome::Unmatched;
            };

            let session = Arc::clone(&self.session);
            let summary_len = self.options.error_summary_len;
            if matched.concurrent {
                let task = execute(session, matched, event, summary_len).in_current_span();
                DispatchOutcome::Spawned(tokio::spawn(task))
            } else {
                execute(session, matched, event, summary_len).await;
                DispatchOutcome::Completed
            }
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state())
            .field("registrations", &self.table.len())
            .field("history", &self.history.len())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// Handler execution
// ============================================================================

/// Runs a matched handler and forwards its reply.
///
/// Errors and panics are logged: the summary at warning level, the full
/// detail at debug level.
async fn execute(session: BoxedSession, matched: Matched, event: Arc<Event>, summary_len: usize) {
    trace!(handler = %matched.name, concurrent = matched.concurrent, "Executing handler");

    let callback = Arc::clone(&matched.callback);
    let call_event = Arc::clone(&event);
    let result = AssertUnwindSafe(async move { callback.call(call_event).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)));

    match result {
        Ok(Some(reply)) => {
            let target = &event.chat().id;
            if let Err(err) = session
                .send(target, &reply.text, reply.media.as_ref())
                .await
            {
                warn!(handler = %matched.name, error = %err, "Failed to send reply");
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(
                handler = %matched.name,
                "Handler failed: {}",
                truncate(&err.to_string(), summary_len)
            );
            debug!(handler = %matched.name, detail = err.detail(), "Handler failure detail");
        }
    }
}

/// Cuts `text` to `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}…", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::Rule;
    use courier_core::{ChannelSession, ChatCategory, EventKind, Reply, channel_session};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher() -> (Dispatcher, courier_core::SessionChannels) {
        let (session, channels) = channel_session("bot_self", 16);
        (Dispatcher::new(Arc::new(session)), channels)
    }

    fn text(from: &str, body: &str) -> RawEvent {
        RawEvent::text(from, body).category(ChatCategory::Direct)
    }

    #[tokio::test]
    async fn test_dispatch_no_registrations() {
        let (dispatcher, _channels) = dispatcher();
        let outcome = dispatcher.dispatch(text("friend", "hi")).await;

        assert!(!outcome.is_matched());
        assert_eq!(dispatcher.history().len(), 1);
    }

    #[tokio::test]
    async fn test_system_events_skip_history() {
        let (dispatcher, _channels) = dispatcher();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        dispatcher.register(
            Rule::new()
                .kind(EventKind::System)
                .concurrent(false)
                .handler(move |_event: Arc<Event>| {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                    }
                }),
        );

        let outcome = dispatcher.dispatch(RawEvent::system("friend")).await;
        assert!(matches!(outcome, DispatchOutcome::Completed));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(dispatcher.history().is_empty());
    }

    #[tokio::test]
    async fn test_inline_reply_is_sent_to_origin() {
        let (dispatcher, mut channels) = dispatcher();
        dispatcher.register(
            Rule::new()
                .concurrent(false)
                .handler(|event: Arc<Event>| async move {
                    format!("echo: {}", event.text().unwrap_or_default())
                }),
        );

        dispatcher.dispatch(text("friend", "ping")).await;

        let sent = channels.outbound.try_recv().unwrap();
        assert_eq!(sent.target.as_str(), "friend");
        assert_eq!(sent.text, "echo: ping");
        assert_eq!(sent.media, None);
    }

    #[tokio::test]
    async fn test_concurrent_handler_is_spawned() {
        let (dispatcher, mut channels) = dispatcher();
        dispatcher.register(Rule::new().handler(|_event: Arc<Event>| async {
            Reply::with_media("photo", "media_1")
        }));

        let outcome = dispatcher.dispatch(text("friend", "send a photo")).await;
        assert!(matches!(outcome, DispatchOutcome::Spawned(_)));
        outcome.join().await;

        let sent = channels.outbound.recv().await.unwrap();
        assert_eq!(sent.text, "photo");
        assert_eq!(sent.media.unwrap().as_str(), "media_1");
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let (dispatcher, mut channels) = dispatcher();
        dispatcher.register(
            Rule::new()
                .concurrent(false)
                .handler(|_event: Arc<Event>| async {
                    if true {
                        panic!("handler bug");
                    }
                }),
        );

        let outcome = dispatcher.dispatch(text("friend", "hi")).await;
        assert!(matches!(outcome, DispatchOutcome::Completed));
        assert!(channels.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_failure_is_contained() {
        let (dispatcher, channels) = dispatcher();
        dispatcher.register(Rule::new().concurrent(false).handler(|_event: Arc<Event>| async { "reply" }));
        channels.inbound.reject_sends(true);

        let outcome = dispatcher.dispatch(text("friend", "hi")).await;
        assert!(matches!(outcome, DispatchOutcome::Completed));
    }

    #[tokio::test]
    async fn test_enable_disable_through_dispatcher() {
        let (dispatcher, _channels) = dispatcher();
        let id = dispatcher.register(Rule::new().handler(|_event: Arc<Event>| async {}));

        dispatcher.disable(None).unwrap();
        assert_eq!(dispatcher.registrations().is_enabled(id), Some(false));

        dispatcher.enable(Some(id)).unwrap();
        assert_eq!(dispatcher.registrations().is_enabled(id), Some(true));

        let foreign = RegistrationTable::new().register(Rule::new().handler(|_event: Arc<Event>| async {}));
        assert!(dispatcher.disable(Some(foreign)).is_err());
    }

    #[tokio::test]
    async fn test_run_requires_idle() {
        let (session, channels) = channel_session("bot_self", 4);
        let session = Arc::new(session);
        let dispatcher = Dispatcher::new(Arc::clone(&session) as BoxedSession);

        channels.inbound.terminate();
        dispatcher.run().await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(session.persist_count(), 1);

        let err = dispatcher.run().await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidState(DispatcherState::Stopped)));
    }

    #[tokio::test]
    async fn test_stop_wakes_pending_poll() {
        let (session, _channels) = channel_session("bot_self", 4);
        let session: Arc<ChannelSession> = Arc::new(session);
        let dispatcher = Arc::new(Dispatcher::with_options(
            Arc::clone(&session) as BoxedSession,
            DispatcherOptions {
                persist_on_exit: false,
                ..Default::default()
            },
        ));

        let handle = dispatcher.spawn().unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Running);
        assert!(dispatcher.spawn().is_err());

        dispatcher.stop();
        handle.await.unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(session.persist_count(), 0);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("héllo", 2), "hé…");
    }
}
