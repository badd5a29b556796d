//! Handler system for the Courier framework.
//!
//! A handler is an async function taking the shared [`Event`] and returning
//! anything that implements [`IntoReply`]:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_core::{Event, Reply};
//!
//! // No reply
//! async fn log_it(event: Arc<Event>) {
//!     println!("{event}");
//! }
//!
//! // Text reply to the origin chat
//! async fn echo(event: Arc<Event>) -> Option<String> {
//!     event.text().map(|t| format!("received: {t} ({})", event.kind()))
//! }
//!
//! // Text plus an already-uploaded media item
//! async fn with_media(_event: Arc<Event>) -> (String, MediaRef) {
//!     ("look".to_string(), MediaRef::new("media_id"))
//! }
//!
//! // Fallible handler; errors are logged by the dispatcher
//! async fn fallible(event: Arc<Event>) -> anyhow::Result<String> {
//!     Ok(event.text().unwrap_or_default().to_uppercase())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{HandlerError, HandlerResult};
use courier_core::{Event, MediaRef, Reply};

// ============================================================================
// IntoReply - Handler return values
// ============================================================================

/// A trait for types that can be returned from handlers.
pub trait IntoReply: Send {
    /// Converts this value into an optional reply, or a handler failure.
    fn into_reply(self) -> HandlerResult;
}

/// `()` - no reply.
impl IntoReply for () {
    fn into_reply(self) -> HandlerResult {
        Ok(None)
    }
}

/// `String` - text reply.
impl IntoReply for String {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(Reply::text(self)))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(Reply::text(self)))
    }
}

impl IntoReply for Reply {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(self))
    }
}

/// `(text, media)` - text reply with an attached media reference.
impl<T, M> IntoReply for (T, M)
where
    T: Into<String> + Send,
    M: Into<MediaRef> + Send,
{
    fn into_reply(self) -> HandlerResult {
        Ok(Some(Reply::with_media(self.0, self.1)))
    }
}

/// `Option<T>` - the inner reply on `Some`, nothing on `None`.
impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> HandlerResult {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(None),
        }
    }
}

/// `Result<T, E>` - the inner reply on `Ok`, a [`HandlerError`] on `Err`.
impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: fmt::Display + fmt::Debug + Send,
{
    fn into_reply(self) -> HandlerResult {
        match self {
            Ok(inner) => inner.into_reply(),
            Err(err) => Err(HandlerError::from_error(&err)),
        }
    }
}

// ============================================================================
// Callback - Type-erased handler
// ============================================================================

/// A registered handler, callable any number of times.
///
/// Implemented for every `Fn(Arc<Event>) -> impl Future<Output = impl IntoReply>`.
/// Implement it by hand for handlers that carry their own state.
pub trait Callback: Send + Sync + 'static {
    /// Runs the handler for one event.
    fn call(&self, event: Arc<Event>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Callback for F
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    fn call(&self, event: Arc<Event>) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(event);
        Box::pin(async move { fut.await.into_reply() })
    }
}

/// A type-erased handler that can be stored in collections.
pub type BoxedCallback = Arc<dyn Callback>;

/// Converts a handler function into a boxed callback.
pub fn into_callback<F, Fut, R>(f: F) -> BoxedCallback
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::RawEvent;

    fn event() -> Arc<Event> {
        Arc::new(Event::from_raw(RawEvent::text("friend", "hello")))
    }

    #[test]
    fn test_unit_means_no_reply() {
        assert_eq!(().into_reply().unwrap(), None);
        assert_eq!(None::<String>.into_reply().unwrap(), None);
    }

    #[test]
    fn test_tuple_carries_media() {
        let reply = ("caption", "media_1").into_reply().unwrap().unwrap();
        assert_eq!(reply, Reply::with_media("caption", "media_1"));
    }

    #[test]
    fn test_result_err_becomes_handler_error() {
        let result: Result<String, std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let err = result.into_reply().unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[tokio::test]
    async fn test_closure_callback() {
        let callback = into_callback(|event: Arc<Event>| async move {
            event.text().map(|t| format!("echo: {t}"))
        });

        let reply = callback.call(event()).await.unwrap();
        assert_eq!(reply, Some(Reply::text("echo: hello")));
    }

    struct Counter(std::sync::atomic::AtomicUsize);

    impl Callback for Counter {
        fn call(&self, _event: Arc<Event>) -> BoxFuture<'static, HandlerResult> {
            let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async move { Ok(Some(Reply::text(n.to_string()))) })
        }
    }

    #[tokio::test]
    async fn test_stateful_callback() {
        let callback: BoxedCallback = Arc::new(Counter(Default::default()));
        callback.call(event()).await.unwrap();
        let reply = callback.call(event()).await.unwrap();
        assert_eq!(reply, Some(Reply::text("1")));
    }
}
