//! Minimal push/subscribe streams.
//!
//! Every stream fans each pushed value out to its subscribers in
//! registration order. Streams compose with [`EventSource::pipe`]:
//!
//! ```ignore
//! let source = EventStream::new();
//! let evens = source.pipe(Arc::new(FilterStream::new(|n: &u32| n % 2 == 0)));
//! evens.pipe(Arc::new(MapStream::new(|n: u32| n * 10)));
//! ```
//!
//! A panicking subscriber is not caught; the panic unwinds through `push`.

use std::sync::Arc;

use parking_lot::RwLock;

pub mod event_stream;
pub mod filter;
pub mod log;
pub mod map;

pub use event_stream::EventStream;
pub use filter::FilterStream;
pub use log::EventLog;
pub use map::{MapStream, Mapper};

/// A registered handler.
pub type Subscriber<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Anything values can be pushed into.
pub trait EventSink<E>: Send + Sync {
    fn push(&self, event: E);
}

/// Anything that fans values out to subscribers.
pub trait EventSource<E: Clone + Send + 'static> {
    fn add_subscriber(&self, subscriber: Subscriber<E>);

    /// Call `handler` for every value emitted after this point.
    fn subscribe<F>(&self, handler: F)
    where
        F: Fn(E) + Send + Sync + 'static,
        Self: Sized,
    {
        self.add_subscriber(Arc::new(handler));
    }

    /// Forward every emitted value into `next` and hand `next` back, so
    /// pipelines read `a.pipe(b).pipe(c)`.
    fn pipe<S>(&self, next: Arc<S>) -> Arc<S>
    where
        S: EventSink<E> + ?Sized + 'static,
        Self: Sized,
    {
        let sink = Arc::clone(&next);
        self.add_subscriber(Arc::new(move |event| sink.push(event)));
        next
    }
}

/// Subscriber list shared by the stream implementations.
pub(crate) struct Subscribers<E> {
    handlers: RwLock<Vec<Subscriber<E>>>,
}

impl<E: Clone> Subscribers<E> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, subscriber: Subscriber<E>) {
        self.handlers.write().push(subscriber);
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Snapshot first so handlers may subscribe or push re-entrantly.
    pub(crate) fn notify(&self, event: E) {
        let handlers = self.handlers.read().clone();
        if let Some((last, rest)) = handlers.split_last() {
            for handler in rest {
                handler(event.clone());
            }
            last(event);
        }
    }
}
