// Peer to peer relay of encrypted events over a pluggable transport.

pub mod address_book;
pub mod communicator;
pub mod error;
pub mod packet;
pub mod peer_key;
pub mod transport;

pub use address_book::{AddressBook, AddressBookEntry};
pub use communicator::{PeerHandler, PeerToPeerCommunicator, SessionCommunicator};
pub use error::{CommunicatorError, TransportError};
pub use packet::WirePacket;
pub use peer_key::PeerKey;
pub use transport::{Delivery, InMemoryTransport, Inbox, Transport};
