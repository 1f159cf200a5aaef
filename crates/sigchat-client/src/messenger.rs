//! A chat client over one communicator.
//!
//! Local actions and accepted inbound events are pushed through a single
//! event stream into the state projection, which folds and records them. Every
//! inbound message is acknowledged back to its sender, which is what moves
//! messages to delivered on both ends.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use sigchat_net::PeerToPeerCommunicator;
use sigchat_shared::events::{direct_conversation_id, Event, EventKind};
use sigchat_shared::stream::{EventLog, EventSink, EventSource, EventStream, FilterStream};
use sigchat_shared::types::User;

use crate::error::{MessengerError, Result};
use crate::projection::StateProjection;
use crate::state::MessagingState;

pub struct Messenger<C> {
    communicator: C,
    events: Arc<EventStream<Event>>,
    inbound: Arc<FilterStream<Event>>,
    projection: Arc<StateProjection>,
    user: RwLock<Option<User>>,
}

impl<C> Messenger<C>
where
    C: PeerToPeerCommunicator<String> + Clone + 'static,
{
    pub fn new(communicator: C) -> Self {
        Self::with_log(communicator, EventLog::new())
    }

    /// Replays `log` into the state before recording new events to it.
    pub fn with_log(communicator: C, log: EventLog<Event>) -> Self {
        let events = Arc::new(EventStream::new());
        let projection = events.pipe(Arc::new(StateProjection::with_log(log)));

        let inbound = Arc::new(FilterStream::new(|event: &Event| {
            matches!(event.kind, EventKind::AddMessage(_) | EventKind::AckEvent(_))
        }));
        inbound.pipe(Arc::clone(&events));

        Self {
            communicator,
            events,
            inbound,
            projection,
            user: RwLock::new(None),
        }
    }

    pub async fn setup(&self) -> Result<User> {
        if let Some(user) = self.user.read().clone() {
            return Ok(user);
        }

        let user = self.communicator.setup().await?;
        if !self.projection.snapshot().is_current_user(&user) {
            self.events.push(Event::installation(user.clone()));
        }
        *self.user.write() = Some(user.clone());
        self.listen(user.clone());

        info!(user = %user.identifier, "Messenger ready");
        Ok(user)
    }

    fn listen(&self, me: User) {
        let inbound = Arc::clone(&self.inbound);
        let communicator = self.communicator.clone();

        self.communicator.stream(Arc::new(move |peer: String, event: Event| {
            if event.user().map(|author| author.identifier != peer).unwrap_or(true) {
                warn!(peer = %peer, event_type = event.type_name(), "Dropping event not authored by its sender");
                return;
            }

            let ack = match event.kind {
                EventKind::AddMessage(_) => Some(Event::ack(me.clone(), &event)),
                _ => None,
            };
            inbound.push(event);

            if let Some(ack) = ack {
                inbound.push(ack.clone());
                send_detached(communicator.clone(), peer, ack);
            }
        }));
    }

    pub async fn connect(&self, peer: &str) -> Result<()> {
        self.local_user()?;
        self.communicator.connect(&peer.to_string()).await?;
        Ok(())
    }

    pub async fn invite_code(&self) -> Result<String> {
        self.local_user()?;
        Ok(self.communicator.invite_code().await?)
    }

    /// Returns the identifier of the inviter.
    pub async fn accept_invite(&self, code: &str) -> Result<String> {
        self.local_user()?;
        Ok(self.communicator.accept_invite(code).await?)
    }

    pub fn set_username(&self, username: &str) -> Result<()> {
        let user = self.local_user()?;
        self.events.push(Event::set_user_details(user, username));
        Ok(())
    }

    pub fn add_contact(&self, contact: User, username: &str) {
        self.events.push(Event::add_contact(contact, username));
    }

    /// Folds the message locally, then relays it. A failed relay leaves the
    /// message undelivered in the local state.
    pub async fn send_message(&self, peer: &str, body: &str) -> Result<Event> {
        let user = self.local_user()?;
        let conversation_id = direct_conversation_id(&user.identifier, peer);
        let event = Event::add_message(user, conversation_id, body, Utc::now());

        self.events.push(event.clone());
        self.communicator.send(&peer.to_string(), &event).await?;

        debug!(peer = %peer, event = %event.id, "Sent message");
        Ok(event)
    }

    pub async fn safety_number_with(&self, peer: &str) -> Result<String> {
        Ok(self.communicator.safety_number_for(&peer.to_string()).await?)
    }

    pub fn state(&self) -> MessagingState {
        self.projection.snapshot()
    }

    /// Subscribe to every state produced from here on.
    pub fn on_state<F>(&self, handler: F)
    where
        F: Fn(MessagingState) + Send + Sync + 'static,
    {
        self.projection.subscribe(handler);
    }

    pub fn events(&self) -> Vec<Event> {
        self.projection.events()
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    fn local_user(&self) -> Result<User> {
        self.user.read().clone().ok_or(MessengerError::NotSetUp)
    }
}

fn send_detached<C>(communicator: C, peer: String, event: Event)
where
    C: PeerToPeerCommunicator<String> + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        error!(peer = %peer, "No runtime to send acknowledgement on");
        return;
    };

    runtime.spawn(async move {
        if let Err(e) = communicator.send(&peer, &event).await {
            warn!(peer = %peer, error = %e, "Failed to send acknowledgement");
        }
    });
}
