//! The messaging view folded from the event log.
//!
//! [`reduce`] is a pure transition: it never fails and ignores events it
//! cannot apply (acks for unknown messages, details before installation),
//! so replaying the same events always yields the same state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sigchat_shared::constants::ADD_MESSAGE;
use sigchat_shared::events::{AddMessage, Event, EventKind};
use sigchat_shared::types::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub user: User,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub conversation_id: String,
    pub body: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Identifiers of users that have seen the message, sender first.
    pub acks: Vec<String>,
    /// Every participant of the conversation has acked.
    pub delivered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingState {
    pub user: Option<User>,
    pub username: Option<String>,
    pub contacts: Vec<Contact>,
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
}

impl MessagingState {
    pub fn is_current_user(&self, user: &User) -> bool {
        self.user
            .as_ref()
            .map(|current| current.identifier == user.identifier)
            .unwrap_or(false)
    }

    pub fn contact(&self, identifier: &str) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|contact| contact.user.identifier == identifier)
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|conversation| conversation.id == id)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Messages of one conversation in the order they were folded.
    pub fn messages_in<'a>(&'a self, conversation_id: &'a str) -> impl Iterator<Item = &'a Message> {
        self.messages
            .iter()
            .filter(move |message| message.conversation_id == conversation_id)
    }

    fn add_message(&mut self, id: &str, event: &AddMessage) {
        if self.conversation(&event.conversation_id).is_none() {
            let mut participant_ids = Vec::with_capacity(2);
            if let Some(user) = &self.user {
                participant_ids.push(user.identifier.clone());
            }
            if !participant_ids.contains(&event.user.identifier) {
                participant_ids.push(event.user.identifier.clone());
            }
            self.conversations.push(Conversation {
                id: event.conversation_id.clone(),
                participant_ids,
            });
        }

        self.messages.push(Message {
            id: id.to_string(),
            sender_id: event.user.identifier.clone(),
            conversation_id: event.conversation_id.clone(),
            body: event.body.clone(),
            timestamp: event.timestamp,
            acks: vec![event.user.identifier.clone()],
            delivered: false,
        });
    }

    fn acknowledge(&mut self, message_id: &str, user_id: &str) {
        let Some(index) = self.messages.iter().position(|message| message.id == message_id) else {
            return;
        };
        let participants = self
            .conversation(&self.messages[index].conversation_id)
            .map(|conversation| conversation.participant_ids.clone());

        let message = &mut self.messages[index];
        if !message.acks.iter().any(|ack| ack == user_id) {
            message.acks.push(user_id.to_string());
        }
        if let Some(participants) = participants {
            message.delivered = participants
                .iter()
                .all(|participant| message.acks.contains(participant));
        }
    }
}

pub fn reduce(state: &MessagingState, event: &Event) -> MessagingState {
    let mut next = state.clone();

    match &event.kind {
        EventKind::Installation(installation) => {
            next.user = Some(installation.user.clone());
        }
        EventKind::AddContact(contact) => {
            if !next.is_current_user(&contact.user) {
                next.contacts.push(Contact {
                    user: contact.user.clone(),
                    username: contact.username.clone(),
                });
            }
        }
        EventKind::AddMessage(message) => next.add_message(&event.id, message),
        EventKind::SetUserDetails(details) => {
            if next.user.is_some() {
                next.username = Some(details.username.clone());
            }
        }
        EventKind::AckEvent(ack) => {
            if ack.event_type == ADD_MESSAGE {
                next.acknowledge(&ack.event_id, &ack.user.identifier);
            }
        }
        EventKind::Unrecognized => {}
    }

    next
}

/// Fold `events` over the empty state.
pub fn fold<'a, I>(events: I) -> MessagingState
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .fold(MessagingState::default(), |state, event| reduce(&state, event))
}
