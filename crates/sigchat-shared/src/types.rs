use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{PUBKEY_SIZE, SIGNATURE_SIZE};

/// An installed user. The identifier is a ULID generated at installation
/// and is the join key across contacts, conversations and messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub identifier: String,
    pub registration_id: u32,
    pub device_id: u32,
}

/// Address under which cryptographic session state is kept for a peer
/// device. Rendered as `name.device_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionAddress {
    pub name: String,
    pub device_id: u32,
}

impl SessionAddress {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    /// The session address of a user's device, named by registration id.
    pub fn for_user(user: &User) -> Self {
        Self::new(user.registration_id.to_string(), user.device_id)
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid session address: {0}")]
pub struct AddressParseError(pub String);

impl FromStr for SessionAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, device) = s
            .rsplit_once('.')
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        if name.is_empty() {
            return Err(AddressParseError(s.to_string()));
        }
        let device_id = device
            .parse::<u32>()
            .map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Self::new(name, device_id))
    }
}

// Long-term identity public key (Ed25519 verifying key bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(pub [u8; PUBKEY_SIZE]);

impl IdentityKey {
    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Public half of a one-time prekey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyPublic {
    pub key_id: u32,
    pub public_key: [u8; PUBKEY_SIZE],
}

/// Public half of a signed prekey together with the identity signature
/// over `public_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPreKeyPublic {
    pub key_id: u32,
    pub public_key: [u8; PUBKEY_SIZE],
    pub signature: [u8; SIGNATURE_SIZE],
}

/// Everything a peer needs to open a session towards us without a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKeyBundle {
    pub identity_key: IdentityKey,
    pub registration_id: u32,
    pub pre_key: PreKeyPublic,
    pub signed_pre_key: SignedPreKeyPublic,
}
