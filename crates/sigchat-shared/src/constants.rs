/// Application name
pub const APP_NAME: &str = "sigchat";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Ed25519 / X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Version byte leading every encoded invite
pub const INVITE_VERSION: u8 = 1;

/// Encoded invite length in bytes, before base64:
/// version + ulid + registration id + device id + identity key
/// + prekey (id, key) + signed prekey (id, key, signature)
pub const INVITE_LEN: usize = 1 + 16 + 4 + 4 + PUBKEY_SIZE + (4 + PUBKEY_SIZE)
    + (4 + PUBKEY_SIZE + SIGNATURE_SIZE);

/// Prekey ids are drawn from `1..KEY_ID_LIMIT`
pub const KEY_ID_LIMIT: u32 = 1 << 24;

/// Registration ids are drawn from `1..=MAX_REGISTRATION_ID` (14 bits)
pub const MAX_REGISTRATION_ID: u32 = 16380;

/// Device id assigned at installation unless configured otherwise
pub const DEFAULT_DEVICE_ID: u32 = 0;

/// Length of a rendered safety number in digits
pub const SAFETY_NUMBER_LENGTH: usize = 60;

/// Wire name of the event type that acknowledgements track
pub const ADD_MESSAGE: &str = "ADD_MESSAGE";

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_ROOT_KEY: &str = "sigchat-x3dh-root-key-v1";
pub const KDF_CONTEXT_INITIATOR_CHAIN: &str = "sigchat-initiator-chain-v1";
pub const KDF_CONTEXT_RESPONDER_CHAIN: &str = "sigchat-responder-chain-v1";
pub const KDF_CONTEXT_MESSAGE_KEY: &str = "sigchat-message-key-v1";
pub const KDF_CONTEXT_NEXT_CHAIN: &str = "sigchat-next-chain-v1";
