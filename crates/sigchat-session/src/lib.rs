// Local identity installation, session establishment and message encryption.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod installer;
pub mod protocol_store;
pub mod record;
pub mod signator;
pub mod store;
pub mod streams;

pub use config::SessionConfig;
pub use error::{SessionError, StoreError};
pub use fingerprint::SafetyNumberGenerator;
pub use installer::{StoreUserInstaller, UserInstaller};
pub use protocol_store::ProtocolStore;
pub use signator::{Ciphertext, CiphertextType, SessionSignator, Signator};
pub use store::{InMemoryStore, KeyValueStore, KeyValueStoreExt};
pub use streams::{DecryptStream, EncryptStream};
