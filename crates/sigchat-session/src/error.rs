use thiserror::Error;

use sigchat_shared::error::{CodecError, CryptoError, IdentityError};

/// Errors produced by the key-value store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Keys must be non-empty.
    #[error("Store key must not be empty")]
    EmptyKey,

    /// A value that must exist was never written.
    #[error("Missing store key: {0}")]
    MissingKey(String),

    /// A stored value could not be encoded or decoded.
    #[error("Codec error for key {key}: {reason}")]
    Codec { key: String, reason: String },
}

/// Errors produced while establishing or using a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Registration id or identity key missing; run the installer first.
    #[error("Local user is not installed")]
    NotInstalled,

    #[error("No session established with {0}")]
    NoSession(String),

    /// The peer presented a different identity than the one pinned.
    #[error("Untrusted identity for {0}")]
    UntrustedIdentity(String),

    #[error("Signed prekey signature is invalid")]
    InvalidSignature,

    #[error("Unknown or already used prekey: {0}")]
    UnknownPreKey(u32),

    #[error("Unknown signed prekey: {0}")]
    UnknownSignedPreKey(u32),

    #[error("Message {0} was already received")]
    DuplicateMessage(u32),

    #[error("Message {counter} is too far ahead of the receiving chain (limit {limit})")]
    TooFarAhead { counter: u32, limit: usize },

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;
