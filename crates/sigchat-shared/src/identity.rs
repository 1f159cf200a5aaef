use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as DhPublicKey, StaticSecret};

use crate::constants::SIGNATURE_SIZE;
use crate::error::IdentityError;
use crate::types::IdentityKey;

/// A device's long-term identity based on Ed25519.
///
/// The same key doubles as an X25519 key for session agreement, using the
/// birational map between the Edwards and Montgomery forms of Curve25519.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

/// Stored form of an [`IdentityKeyPair`].
#[derive(Serialize, Deserialize)]
pub struct IdentityExport {
    pub secret_key: [u8; 32],
    pub public_key: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_export(export: &IdentityExport) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&export.secret_key),
        }
    }

    pub fn public_key(&self) -> IdentityKey {
        IdentityKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }

    /// X25519 secret for Diffie-Hellman with this identity
    pub fn dh_secret(&self) -> StaticSecret {
        StaticSecret::from(self.signing_key.to_scalar_bytes())
    }

    pub fn to_export(&self) -> IdentityExport {
        IdentityExport {
            secret_key: *self.signing_key.as_bytes(),
            public_key: self.signing_key.verifying_key().to_bytes(),
        }
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key().short())
            .finish_non_exhaustive()
    }
}

/// Montgomery form of a peer's identity key.
pub fn dh_public_key(identity: &IdentityKey) -> Result<DhPublicKey, IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(identity.as_bytes()).map_err(|_| IdentityError::InvalidKeyBytes)?;
    Ok(DhPublicKey::from(verifying_key.to_montgomery().to_bytes()))
}

/// Check `signature` over `message` against a peer's identity key.
pub fn verify_signature(
    identity: &IdentityKey,
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), IdentityError> {
    let verifying_key =
        VerifyingKey::from_bytes(identity.as_bytes()).map_err(|_| IdentityError::InvalidKeyBytes)?;
    let signature = Signature::from_bytes(signature);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| IdentityError::InvalidSignature)
}
