use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Signature verification failed")]
    InvalidSignature,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InviteError {
    #[error("Base64 decode error")]
    Base64Decode,

    #[error("Invalid invite length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unsupported invite version: {0}")]
    UnsupportedVersion(u8),

    #[error("User identifier is not a canonical ULID: {0}")]
    InvalidIdentifier(String),

    #[error("Prekey bundle registration id {bundle} does not match user registration id {user}")]
    RegistrationMismatch { user: u32, bundle: u32 },
}
