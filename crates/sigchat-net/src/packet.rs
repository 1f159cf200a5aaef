//! Packets exchanged between communicators.

use serde::{Deserialize, Serialize};

use sigchat_session::Ciphertext;
use sigchat_shared::types::SessionAddress;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WirePacket<K> {
    /// Serialized invite of `sender`; the receiver opens a session towards it.
    Handshake { sender: K, invite: String },

    /// An encrypted, serialized event. `address` is the sender's session
    /// address, under which the receiver keeps the session.
    Event {
        sender: K,
        address: SessionAddress,
        ciphertext: Ciphertext,
    },
}

impl<K> WirePacket<K>
where
    K: Serialize + for<'de> Deserialize<'de>,
{
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub fn sender(&self) -> &K {
        match self {
            WirePacket::Handshake { sender, .. } => sender,
            WirePacket::Event { sender, .. } => sender,
        }
    }
}
