//! Live [`MessagingState`] kept current by folding every pushed event.
//!
//! Each event is folded and appended to the log under one write lock, so the
//! log always replays to the current state, whatever threads push.

use parking_lot::RwLock;

use sigchat_shared::events::Event;
use sigchat_shared::stream::{EventLog, EventSink, EventSource, EventStream, Subscriber};

use crate::state::{fold, reduce, MessagingState};

/// Sink of events and source of the states they produce.
pub struct StateProjection {
    state: RwLock<MessagingState>,
    log: EventLog<Event>,
    changes: EventStream<MessagingState>,
}

impl StateProjection {
    pub fn new() -> Self {
        Self::with_log(EventLog::new())
    }

    /// Starts from the fold of the stored events and keeps appending to `log`.
    pub fn with_log(log: EventLog<Event>) -> Self {
        let state = fold(&log.events());
        Self {
            state: RwLock::new(state),
            log,
            changes: EventStream::new(),
        }
    }

    pub fn snapshot(&self) -> MessagingState {
        self.state.read().clone()
    }

    /// Every event folded so far, in fold order.
    pub fn events(&self) -> Vec<Event> {
        let _state = self.state.read();
        self.log.events()
    }
}

impl Default for StateProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink<Event> for StateProjection {
    fn push(&self, event: Event) {
        let next = {
            let mut state = self.state.write();
            let next = reduce(&state, &event);
            *state = next.clone();
            self.log.push(event);
            next
        };
        self.changes.push(next);
    }
}

impl EventSource<MessagingState> for StateProjection {
    fn add_subscriber(&self, subscriber: Subscriber<MessagingState>) {
        self.changes.add_subscriber(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use sigchat_shared::types::User;

    use super::*;

    fn user(identifier: &str) -> User {
        User {
            identifier: identifier.to_string(),
            registration_id: 1,
            device_id: 0,
        }
    }

    #[test]
    fn test_folds_pushed_events() {
        let projection = StateProjection::new();
        projection.push(Event::installation(user("me")));
        projection.push(Event::set_user_details(user("me"), "sleepy_otter"));

        let state = projection.snapshot();
        assert_eq!(state.user, Some(user("me")));
        assert_eq!(state.username.as_deref(), Some("sleepy_otter"));
    }

    #[test]
    fn test_notifies_every_new_state() {
        let projection = StateProjection::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        projection.subscribe(move |state: MessagingState| sink.lock().push(state.contacts.len()));

        projection.push(Event::add_contact(user("a"), "a"));
        projection.push(Event::add_contact(user("b"), "b"));

        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_subscribers_may_read_the_snapshot() {
        let projection = Arc::new(StateProjection::new());
        let reader = Arc::clone(&projection);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        projection.subscribe(move |_| *sink.lock() = Some(reader.snapshot()));

        projection.push(Event::installation(user("me")));

        assert_eq!(seen.lock().as_ref().and_then(|s| s.user.clone()), Some(user("me")));
    }

    #[test]
    fn test_records_what_it_folds() {
        let log = EventLog::with_events(vec![Event::installation(user("me"))]);
        let projection = StateProjection::with_log(log);
        assert_eq!(projection.snapshot().user, Some(user("me")));

        projection.push(Event::add_contact(user("a"), "a"));

        let events = projection.events();
        assert_eq!(events.len(), 2);
        assert_eq!(fold(&events), projection.snapshot());
    }

    #[test]
    fn test_concurrent_pushes_keep_log_and_state_in_step() {
        let projection = Arc::new(StateProjection::new());

        std::thread::scope(|scope| {
            for t in 0..8 {
                let projection = Arc::clone(&projection);
                scope.spawn(move || {
                    for i in 0..250 {
                        let id = format!("{t}-{i}");
                        projection.push(Event::add_contact(user(&id), &id));
                    }
                });
            }
        });

        let events = projection.events();
        assert_eq!(events.len(), 2000);
        assert_eq!(fold(&events), projection.snapshot());
    }

    #[test]
    fn test_piped_from_a_stream() {
        let stream = EventStream::<Event>::new();
        let projection = stream.pipe(Arc::new(StateProjection::new()));

        stream.push(Event::installation(user("me")));

        assert!(projection.snapshot().user.is_some());
    }
}
