//! In-memory session backed by tokio channels.
//!
//! [`ChannelSession`] implements [`Session`] without any provider behind it:
//! raw events are pushed in through an [`EventFeeder`] and every delivered
//! reply comes out of an unbounded receiver. It drives tests, demos, and
//! bridges to providers that already expose a channel of decoded events.
//!
//! ```rust,ignore
//! let (session, mut channels) = channel_session("bot_self", 64);
//!
//! channels.inbound.push(RawEvent::text("friend_1", "ping")).await?;
//! // ... run a dispatcher over `session` ...
//! let reply = channels.outbound.recv().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::foundation::chat::ChatId;
use crate::foundation::error::{SessionError, SessionResult};
use crate::foundation::event::{ContentRef, RawEvent};
use crate::integration::session::{MediaRef, Session};

/// A message delivered through [`ChannelSession::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Target chat.
    pub target: ChatId,
    /// Text content.
    pub text: String,
    /// Attached media reference.
    pub media: Option<MediaRef>,
}

/// State shared between the session and its feeders.
struct Shared {
    closed: CancellationToken,
    reject_sends: AtomicBool,
    persist_count: AtomicUsize,
    contents: Mutex<HashMap<ContentRef, Vec<u8>>>,
}

/// A [`Session`] fed from memory.
pub struct ChannelSession {
    self_id: ChatId,
    inbound: AsyncMutex<mpsc::Receiver<RawEvent>>,
    outbound: mpsc::UnboundedSender<SentMessage>,
    shared: Arc<Shared>,
}

/// Producer side of a [`ChannelSession`].
#[derive(Clone)]
pub struct EventFeeder {
    tx: mpsc::Sender<RawEvent>,
    shared: Arc<Shared>,
}

/// Caller side of a [`ChannelSession`].
pub struct SessionChannels {
    /// Pushes raw events into the session.
    pub inbound: EventFeeder,
    /// Receives every message the session delivered.
    pub outbound: mpsc::UnboundedReceiver<SentMessage>,
}

/// Creates an in-memory session and the channels that drive it.
///
/// The session terminates once every [`EventFeeder`] has been dropped and the
/// queued events are drained, or immediately on [`EventFeeder::terminate`].
pub fn channel_session(
    self_id: impl Into<ChatId>,
    buffer_size: usize,
) -> (ChannelSession, SessionChannels) {
    let (in_tx, in_rx) = mpsc::channel(buffer_size);
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let shared = Arc::new(Shared {
        closed: CancellationToken::new(),
        reject_sends: AtomicBool::new(false),
        persist_count: AtomicUsize::new(0),
        contents: Mutex::new(HashMap::new()),
    });

    let session = ChannelSession {
        self_id: self_id.into(),
        inbound: AsyncMutex::new(in_rx),
        outbound: out_tx,
        shared: Arc::clone(&shared),
    };

    let channels = SessionChannels {
        inbound: EventFeeder { tx: in_tx, shared },
        outbound: out_rx,
    };

    (session, channels)
}

impl ChannelSession {
    /// Returns how many times the session state was persisted.
    pub fn persist_count(&self) -> usize {
        self.shared.persist_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ChannelSession {
    fn self_id(&self) -> &ChatId {
        &self.self_id
    }

    fn is_alive(&self) -> bool {
        !self.shared.closed.is_cancelled()
    }

    async fn poll_next_event(&self) -> SessionResult<RawEvent> {
        let mut inbound = self.inbound.lock().await;

        tokio::select! {
            biased;
            _ = self.shared.closed.cancelled() => Err(SessionError::Terminated),
            raw = inbound.recv() => match raw {
                Some(raw) => {
                    trace!(kind = %raw.kind, from = %raw.from, "Event received");
                    Ok(raw)
                }
                None => {
                    debug!("All feeders dropped, closing session");
                    self.shared.closed.cancel();
                    Err(SessionError::Terminated)
                }
            },
        }
    }

    async fn send(
        &self,
        target: &ChatId,
        text: &str,
        media: Option<&MediaRef>,
    ) -> SessionResult<()> {
        if !self.is_alive() {
            return Err(SessionError::send_failed(target.as_str(), "session closed"));
        }
        if self.shared.reject_sends.load(Ordering::SeqCst) {
            return Err(SessionError::send_failed(target.as_str(), "rejected"));
        }

        let message = SentMessage {
            target: target.clone(),
            text: text.to_string(),
            media: media.cloned(),
        };
        self.outbound
            .send(message)
            .map_err(|_| SessionError::send_failed(target.as_str(), "receiver dropped"))
    }

    async fn fetch_content(&self, content: &ContentRef) -> SessionResult<Vec<u8>> {
        self.shared
            .contents
            .lock()
            .get(content)
            .cloned()
            .ok_or_else(|| SessionError::ContentNotFound(content.as_str().to_string()))
    }

    async fn persist_state(&self) -> SessionResult<()> {
        self.shared.persist_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl EventFeeder {
    /// Queues a raw event, waiting for buffer space.
    ///
    /// Fails with [`SessionError::Terminated`] once the session has closed.
    pub async fn push(&self, raw: RawEvent) -> SessionResult<()> {
        if self.shared.closed.is_cancelled() {
            return Err(SessionError::Terminated);
        }
        self.tx
            .send(raw)
            .await
            .map_err(|_| SessionError::Terminated)
    }

    /// Ends the session immediately; queued events are discarded.
    pub fn terminate(&self) {
        self.shared.closed.cancel();
    }

    /// Makes every subsequent `send` fail (or succeed again).
    pub fn reject_sends(&self, reject: bool) {
        self.shared.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Registers bytes to be returned by `fetch_content`.
    pub fn insert_content(&self, content: ContentRef, bytes: Vec<u8>) {
        self.shared.contents.lock().insert(content, bytes);
    }
}
