use bytes::{Buf, BufMut, BytesMut};
use ulid::Ulid;

use crate::constants::{INVITE_LEN, INVITE_VERSION, PUBKEY_SIZE, SIGNATURE_SIZE};
use crate::error::InviteError;
use crate::types::{IdentityKey, PreKeyBundle, PreKeyPublic, SignedPreKeyPublic, User};

/// A user's identity plus a prekey bundle, shareable as a copy-pasteable code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub user: User,
    pub pre_key_bundle: PreKeyBundle,
}

impl Invite {
    /// Encode the invite as a base64url string.
    ///
    /// Layout (big endian, fixed width):
    /// `version u8 | ulid u128 | registration_id u32 | device_id u32 |
    ///  identity_key [32] | pre_key_id u32 | pre_key [32] |
    ///  signed_pre_key_id u32 | signed_pre_key [32] | signature [64]`
    pub fn serialize(&self) -> Result<String, InviteError> {
        let ulid = Ulid::from_string(&self.user.identifier)
            .map_err(|_| InviteError::InvalidIdentifier(self.user.identifier.clone()))?;
        // Only canonical text survives the trip through 128 bits.
        if ulid.to_string() != self.user.identifier {
            return Err(InviteError::InvalidIdentifier(self.user.identifier.clone()));
        }
        if self.pre_key_bundle.registration_id != self.user.registration_id {
            return Err(InviteError::RegistrationMismatch {
                user: self.user.registration_id,
                bundle: self.pre_key_bundle.registration_id,
            });
        }

        let bundle = &self.pre_key_bundle;
        let mut buf = BytesMut::with_capacity(INVITE_LEN);
        buf.put_u8(INVITE_VERSION);
        buf.put_u128(ulid.into());
        buf.put_u32(self.user.registration_id);
        buf.put_u32(self.user.device_id);
        buf.put_slice(bundle.identity_key.as_bytes());
        buf.put_u32(bundle.pre_key.key_id);
        buf.put_slice(&bundle.pre_key.public_key);
        buf.put_u32(bundle.signed_pre_key.key_id);
        buf.put_slice(&bundle.signed_pre_key.public_key);
        buf.put_slice(&bundle.signed_pre_key.signature);

        Ok(base64_url_encode(&buf))
    }

    /// Decode a base64url string back into an invite.
    pub fn deserialize(code: &str) -> Result<Self, InviteError> {
        let bytes = base64_url_decode(code)?;
        if bytes.len() != INVITE_LEN {
            return Err(InviteError::InvalidLength {
                expected: INVITE_LEN,
                actual: bytes.len(),
            });
        }

        let mut buf = bytes.as_slice();
        let version = buf.get_u8();
        if version != INVITE_VERSION {
            return Err(InviteError::UnsupportedVersion(version));
        }

        let identifier = Ulid::from(buf.get_u128()).to_string();
        let registration_id = buf.get_u32();
        let device_id = buf.get_u32();
        let identity_key = IdentityKey(take_array::<PUBKEY_SIZE>(&mut buf));
        let pre_key = PreKeyPublic {
            key_id: buf.get_u32(),
            public_key: take_array::<PUBKEY_SIZE>(&mut buf),
        };
        let signed_pre_key = SignedPreKeyPublic {
            key_id: buf.get_u32(),
            public_key: take_array::<PUBKEY_SIZE>(&mut buf),
            signature: take_array::<SIGNATURE_SIZE>(&mut buf),
        };

        Ok(Self {
            user: User {
                identifier,
                registration_id,
                device_id,
            },
            pre_key_bundle: PreKeyBundle {
                identity_key,
                registration_id,
                pre_key,
                signed_pre_key,
            },
        })
    }
}

fn take_array<const N: usize>(buf: &mut &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    out
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, InviteError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| InviteError::Base64Decode)
}
