use super::{EventSink, EventSource, Subscriber, Subscribers};

/// Synchronous broadcast: `push` returns after every subscriber has run.
pub struct EventStream<E> {
    subscribers: Subscribers<E>,
}

impl<E: Clone> EventStream<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Subscribers::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<E: Clone> Default for EventStream<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventSink<E> for EventStream<E> {
    fn push(&self, event: E) {
        self.subscribers.notify(event);
    }
}

impl<E: Clone + Send + 'static> EventSource<E> for EventStream<E> {
    fn add_subscriber(&self, subscriber: Subscriber<E>) {
        self.subscribers.add(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn recorder<E: Clone + Send + 'static>() -> (Arc<Mutex<Vec<E>>>, impl Fn(E) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event| sink.lock().push(event))
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let stream = EventStream::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for index in 0..3 {
            let calls = Arc::clone(&calls);
            stream.subscribe(move |event: &'static str| calls.lock().push((index, event)));
        }

        stream.push("hello");

        assert_eq!(
            *calls.lock(),
            vec![(0, "hello"), (1, "hello"), (2, "hello")]
        );
    }

    #[test]
    fn test_only_later_pushes_are_seen() {
        let stream = EventStream::<i32>::new();
        stream.push(1);

        let (seen, handler) = recorder();
        stream.subscribe(handler);
        stream.push(2);

        assert_eq!(*seen.lock(), vec![2]);
    }

    #[test]
    fn test_pipe_forwards_and_returns_target() {
        let a = EventStream::<i32>::new();
        let b = Arc::new(EventStream::<i32>::new());
        let c = Arc::new(EventStream::<i32>::new());

        let (seen, handler) = recorder();
        a.pipe(Arc::clone(&b)).pipe(Arc::clone(&c)).subscribe(handler);
        a.push(42);

        assert_eq!(*seen.lock(), vec![42]);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn test_subscriber_may_subscribe_while_notified() {
        let stream = Arc::new(EventStream::<u8>::new());
        let inner = Arc::clone(&stream);
        stream.subscribe(move |_: u8| inner.subscribe(|_| {}));

        stream.push(0);
        stream.push(0);

        assert_eq!(stream.subscriber_count(), 3);
    }

    #[test]
    #[should_panic(expected = "subscriber failed")]
    fn test_subscriber_panic_propagates() {
        let stream = EventStream::new();
        stream.subscribe(|_: u8| panic!("subscriber failed"));
        stream.push(0);
    }
}
