// Types, crypto primitives, event model and stream building blocks shared by
// every sigchat crate.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod events;
pub mod identity;
pub mod invite;
pub mod serializer;
pub mod stream;
pub mod types;

pub use error::{CodecError, CryptoError, IdentityError, InviteError};
pub use events::{direct_conversation_id, Event, EventKind};
pub use identity::IdentityKeyPair;
pub use invite::Invite;
pub use serializer::{JsonSerializer, Serializer};
pub use stream::{EventLog, EventSink, EventSource, EventStream, FilterStream, MapStream};
pub use types::{IdentityKey, PreKeyBundle, SessionAddress, User};
