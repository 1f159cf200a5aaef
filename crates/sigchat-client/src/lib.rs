// Messaging state folded from events, and the messenger that feeds it.

pub mod error;
pub mod messenger;
pub mod projection;
pub mod state;

pub use error::MessengerError;
pub use messenger::Messenger;
pub use projection::StateProjection;
pub use state::{fold, reduce, Contact, Conversation, Message, MessagingState};
