use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::error;

use super::{EventSink, EventSource, Subscriber, Subscribers};

/// How a [`MapStream`] transforms its input.
pub enum Mapper<I, O> {
    /// Fan out immediately, inside `push`.
    Sync(Arc<dyn Fn(I) -> O + Send + Sync>),
    /// Fan out from a spawned task once the future resolves. Completion
    /// order across overlapping pushes is not guaranteed.
    Async(Arc<dyn Fn(I) -> BoxFuture<'static, O> + Send + Sync>),
}

/// Transforms each pushed value before handing it to subscribers.
///
/// The mapper runs exactly once per pushed value, however many
/// subscribers there are.
pub struct MapStream<I, O> {
    mapper: Mapper<I, O>,
    subscribers: Arc<Subscribers<O>>,
}

impl<I, O: Clone> MapStream<I, O> {
    pub fn new<F>(mapper: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self {
            mapper: Mapper::Sync(Arc::new(mapper)),
            subscribers: Arc::new(Subscribers::new()),
        }
    }

    /// A stream whose mapper is asynchronous. Pushing requires a tokio
    /// runtime; outside one the value is dropped and an error is logged.
    pub fn new_async<F, Fut>(mapper: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        Self {
            mapper: Mapper::Async(Arc::new(move |input| mapper(input).boxed())),
            subscribers: Arc::new(Subscribers::new()),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mapper, Mapper::Async(_))
    }
}

impl<E: Clone + 'static> Default for MapStream<E, E> {
    fn default() -> Self {
        Self::new(|event| event)
    }
}

impl<I, O> EventSink<I> for MapStream<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    fn push(&self, event: I) {
        match &self.mapper {
            Mapper::Sync(map) => self.subscribers.notify(map(event)),
            Mapper::Async(map) => {
                let handle = match Handle::try_current() {
                    Ok(handle) => handle,
                    Err(e) => {
                        error!(error = %e, "Async map stream pushed outside a tokio runtime");
                        return;
                    }
                };
                let pending = map(event);
                let subscribers = Arc::clone(&self.subscribers);
                handle.spawn(async move {
                    let mapped = pending.await;
                    subscribers.notify(mapped);
                });
            }
        }
    }
}

impl<I, O> EventSource<O> for MapStream<I, O>
where
    O: Clone + Send + 'static,
{
    fn add_subscriber(&self, subscriber: Subscriber<O>) {
        self.subscribers.add(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::stream::EventStream;

    #[test]
    fn test_sync_map() {
        let stream = MapStream::new(|n: u32| n * 2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        stream.subscribe(move |n| sink.lock().push(n));

        stream.push(5);

        assert!(!stream.is_async());
        assert_eq!(*seen.lock(), vec![10]);
    }

    #[test]
    fn test_default_is_identity() {
        let stream = MapStream::<String, String>::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        stream.subscribe(move |s| sink.lock().push(s));

        stream.push("same".to_string());

        assert_eq!(*seen.lock(), vec!["same"]);
    }

    #[test]
    fn test_map_changes_type() {
        let source = EventStream::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        source
            .pipe(Arc::new(MapStream::new(|n: u32| format!("#{n}"))))
            .subscribe(move |s: String| sink.lock().push(s));
        source.push(7);

        assert_eq!(*seen.lock(), vec!["#7"]);
    }

    #[tokio::test]
    async fn test_async_map_runs_once_for_all_subscribers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stream = MapStream::new_async(move |n: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { n * 3 }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        for subscriber in 0..3 {
            let tx = tx.clone();
            stream.subscribe(move |n: u32| {
                let _ = tx.send((subscriber, n));
            });
        }

        stream.push(5);

        let mut received = Vec::new();
        for _ in 0..3 {
            let item = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(item);
        }

        assert!(stream.is_async());
        assert_eq!(received, vec![(0, 15), (1, 15), (2, 15)]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_async_map_without_runtime_drops_value() {
        let stream = MapStream::new_async(|n: u32| async move { n });
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        stream.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        stream.push(1);

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
