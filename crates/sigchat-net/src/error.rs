use thiserror::Error;

use sigchat_session::SessionError;
use sigchat_shared::error::{CodecError, InviteError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No inbox registered for peer {0}")]
    UnknownPeer(String),

    #[error("Inbox closed before the packet was handled")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommunicatorError {
    #[error("Communicator is not set up")]
    NotSetUp,

    #[error("No session with peer {0}")]
    NoSession(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet from {sender} claims address {address}")]
    SenderMismatch { sender: String, address: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invite error: {0}")]
    Invite(#[from] InviteError),
}

pub type Result<T> = std::result::Result<T, CommunicatorError>;
