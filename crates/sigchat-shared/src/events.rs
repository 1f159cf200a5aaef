//! The messaging event model.
//!
//! Events are immutable facts. Every event carries a unique `id` and a
//! `type` discriminator; on the wire (JSON) the payload fields sit next to
//! them in camelCase, e.g.
//!
//! ```json
//! {"id":"01H...","type":"ADD_MESSAGE","user":{...},"conversationId":"c","body":"hi","timestamp":1700000000000}
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::constants::ADD_MESSAGE;
use crate::types::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Announces the local user's identity.
    Installation(Installation),
    /// Introduces a remote contact.
    AddContact(AddContact),
    /// Updates the current user's displayed username.
    SetUserDetails(SetUserDetails),
    /// Appends a chat message to a conversation.
    AddMessage(AddMessage),
    /// Records that a user has processed another event.
    AckEvent(Ack),
    /// Any type this build does not know about.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddContact {
    pub user: User,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetUserDetails {
    pub user: User,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessage {
    pub user: User,
    pub conversation_id: String,
    pub body: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub user: User,
    pub event_id: String,
    pub event_type: String,
}

impl EventKind {
    /// The wire discriminator of this event.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Installation(_) => "INSTALLATION",
            EventKind::AddContact(_) => "ADD_CONTACT",
            EventKind::SetUserDetails(_) => "SET_USER_DETAILS",
            EventKind::AddMessage(_) => ADD_MESSAGE,
            EventKind::AckEvent(_) => "ACK_EVENT",
            EventKind::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl Event {
    /// Create an event with a fresh ULID.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Ulid::new().to_string(),
            kind,
        }
    }

    pub fn installation(user: User) -> Self {
        Self::new(EventKind::Installation(Installation { user }))
    }

    pub fn add_contact(user: User, username: impl Into<String>) -> Self {
        Self::new(EventKind::AddContact(AddContact {
            user,
            username: username.into(),
        }))
    }

    pub fn set_user_details(user: User, username: impl Into<String>) -> Self {
        Self::new(EventKind::SetUserDetails(SetUserDetails {
            user,
            username: username.into(),
        }))
    }

    /// The timestamp is truncated to whole milliseconds, the precision it
    /// keeps on the wire.
    pub fn add_message(
        user: User,
        conversation_id: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(EventKind::AddMessage(AddMessage {
            user,
            conversation_id: conversation_id.into(),
            body: body.into(),
            timestamp: timestamp.trunc_subsecs(3),
        }))
    }

    /// Acknowledge `acked` on behalf of `user`.
    pub fn ack(user: User, acked: &Event) -> Self {
        Self::new(EventKind::AckEvent(Ack {
            user,
            event_id: acked.id.clone(),
            event_type: acked.type_name().to_string(),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// The user an event was authored by or is about, if any.
    pub fn user(&self) -> Option<&User> {
        match &self.kind {
            EventKind::Installation(e) => Some(&e.user),
            EventKind::AddContact(e) => Some(&e.user),
            EventKind::SetUserDetails(e) => Some(&e.user),
            EventKind::AddMessage(e) => Some(&e.user),
            EventKind::AckEvent(e) => Some(&e.user),
            EventKind::Unrecognized => None,
        }
    }
}

/// Conversation id shared by two users: both identifiers, sorted, joined by `:`.
pub fn direct_conversation_id(a: &str, b: &str) -> String {
    let mut ids = [a, b];
    ids.sort_unstable();
    ids.join(":")
}
