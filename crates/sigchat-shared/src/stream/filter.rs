use std::sync::Arc;

use super::{EventSink, EventSource, Subscriber, Subscribers};

type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Passes on only the values its predicate accepts. Rejected values are
/// dropped, not buffered.
pub struct FilterStream<E> {
    predicate: Predicate<E>,
    subscribers: Subscribers<E>,
}

impl<E: Clone> FilterStream<E> {
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            subscribers: Subscribers::new(),
        }
    }
}

impl<E: Clone> Default for FilterStream<E> {
    fn default() -> Self {
        Self::new(|_| true)
    }
}

impl<E: Clone + Send + 'static> EventSink<E> for FilterStream<E> {
    fn push(&self, event: E) {
        if (self.predicate)(&event) {
            self.subscribers.notify(event);
        }
    }
}

impl<E: Clone + Send + 'static> EventSource<E> for FilterStream<E> {
    fn add_subscriber(&self, subscriber: Subscriber<E>) {
        self.subscribers.add(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::stream::EventStream;

    #[test]
    fn test_only_matching_events_pass() {
        let filter = FilterStream::new(|n: &u32| n % 2 == 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        filter.subscribe(move |n| sink.lock().push(n));

        for n in 1..=6 {
            filter.push(n);
        }

        assert_eq!(*seen.lock(), vec![2, 4, 6]);
    }

    #[test]
    fn test_default_passes_everything() {
        let filter = FilterStream::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        filter.subscribe(move |s: String| sink.lock().push(s));

        filter.push("a".to_string());
        filter.push("b".to_string());

        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_filter_in_a_pipeline() {
        let source = EventStream::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        source
            .pipe(Arc::new(FilterStream::new(|s: &&str| s.starts_with('h'))))
            .pipe(Arc::new(EventStream::new()))
            .subscribe(move |s| sink.lock().push(s));

        source.push("hey");
        source.push("nope");
        source.push("hello");

        assert_eq!(*seen.lock(), vec!["hey", "hello"]);
    }
}
