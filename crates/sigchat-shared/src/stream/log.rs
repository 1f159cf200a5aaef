use std::sync::Arc;

use parking_lot::RwLock;

use super::{EventSink, EventSource};

/// Append-only in-memory event log.
pub struct EventLog<E> {
    events: Arc<RwLock<Vec<E>>>,
}

impl<E: Clone + Send + Sync + 'static> EventLog<E> {
    pub fn new() -> Self {
        Self::with_events(Vec::new())
    }

    pub fn with_events(events: Vec<E>) -> Self {
        Self {
            events: Arc::new(RwLock::new(events)),
        }
    }

    /// Replay every stored event into `stream`, then record everything
    /// pushed through it from now on.
    pub fn tap<S>(&self, stream: &S)
    where
        S: EventSink<E> + EventSource<E>,
    {
        let stored = self.events.read().clone();
        for event in stored {
            stream.push(event);
        }

        let events = Arc::clone(&self.events);
        stream.subscribe(move |event| events.write().push(event));
    }

    pub fn events(&self) -> Vec<E> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl<E: Clone + Send + Sync + 'static> EventSink<E> for EventLog<E> {
    fn push(&self, event: E) {
        self.events.write().push(event);
    }
}

impl<E: Clone + Send + Sync + 'static> Default for EventLog<E> {
    fn default() -> Self {
        Self::new()
    }
}
