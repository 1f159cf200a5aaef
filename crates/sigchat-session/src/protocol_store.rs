//! Typed view over a [`KeyValueStore`] for everything the session layer
//! persists: the local identity, prekeys, session records and the identity
//! pinned for each peer address.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sigchat_shared::constants::PUBKEY_SIZE;
use sigchat_shared::identity::{IdentityExport, IdentityKeyPair};
use sigchat_shared::types::{IdentityKey, SessionAddress};

use crate::error::{Result, SessionError};
use crate::record::SessionRecord;
use crate::store::{KeyValueStore, KeyValueStoreExt};

pub const USER_ID_KEY: &str = "userId";
pub const REGISTRATION_ID_KEY: &str = "registrationId";
pub const DEVICE_ID_KEY: &str = "deviceId";
pub const IDENTITY_KEY_KEY: &str = "identityKey";

fn pre_key_key(key_id: u32) -> String {
    format!("preKey:{key_id}")
}

fn signed_pre_key_key(key_id: u32) -> String {
    format!("signedPreKey:{key_id}")
}

fn session_key(address: &SessionAddress) -> String {
    format!("session:{address}")
}

fn remote_identity_key(address: &SessionAddress) -> String {
    format!("identity:{address}")
}

/// Secret and public halves of an X25519 prekey.
#[derive(Clone, Serialize, Deserialize)]
pub struct PreKeyRecord {
    pub key_id: u32,
    pub secret: [u8; PUBKEY_SIZE],
    pub public: [u8; PUBKEY_SIZE],
}

impl std::fmt::Debug for PreKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreKeyRecord")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ProtocolStore {
    store: Arc<dyn KeyValueStore>,
}

impl ProtocolStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    // -- Local identity --

    pub fn identity_key_pair(&self) -> Result<IdentityKeyPair> {
        match self.store.load::<IdentityExport>(IDENTITY_KEY_KEY)? {
            Some(export) => Ok(IdentityKeyPair::from_export(&export)),
            None => Err(SessionError::NotInstalled),
        }
    }

    pub fn save_identity_key_pair(&self, identity: &IdentityKeyPair) -> Result<()> {
        Ok(self.store.save(IDENTITY_KEY_KEY, &identity.to_export())?)
    }

    pub fn local_registration_id(&self) -> Result<u32> {
        self.store
            .load::<u32>(REGISTRATION_ID_KEY)?
            .ok_or(SessionError::NotInstalled)
    }

    /// Fails with `NotInstalled` unless a registration id and an identity
    /// key have been stored.
    pub fn check_registration(&self) -> Result<()> {
        if self.store.contains(REGISTRATION_ID_KEY)? && self.store.contains(IDENTITY_KEY_KEY)? {
            Ok(())
        } else {
            Err(SessionError::NotInstalled)
        }
    }

    // -- Prekeys --

    pub fn store_pre_key(&self, record: &PreKeyRecord) -> Result<()> {
        Ok(self.store.save(&pre_key_key(record.key_id), record)?)
    }

    pub fn load_pre_key(&self, key_id: u32) -> Result<Option<PreKeyRecord>> {
        Ok(self.store.load(&pre_key_key(key_id))?)
    }

    pub fn contains_pre_key(&self, key_id: u32) -> Result<bool> {
        Ok(self.store.contains(&pre_key_key(key_id))?)
    }

    pub fn remove_pre_key(&self, key_id: u32) -> Result<()> {
        debug!(key_id, "Removing used prekey");
        Ok(self.store.remove(&pre_key_key(key_id))?)
    }

    pub fn store_signed_pre_key(&self, record: &PreKeyRecord) -> Result<()> {
        Ok(self.store.save(&signed_pre_key_key(record.key_id), record)?)
    }

    pub fn load_signed_pre_key(&self, key_id: u32) -> Result<Option<PreKeyRecord>> {
        Ok(self.store.load(&signed_pre_key_key(key_id))?)
    }

    pub fn contains_signed_pre_key(&self, key_id: u32) -> Result<bool> {
        Ok(self.store.contains(&signed_pre_key_key(key_id))?)
    }

    // -- Sessions --

    pub fn load_session(&self, address: &SessionAddress) -> Result<Option<SessionRecord>> {
        Ok(self.store.load(&session_key(address))?)
    }

    pub fn store_session(&self, address: &SessionAddress, record: &SessionRecord) -> Result<()> {
        Ok(self.store.save(&session_key(address), record)?)
    }

    pub fn remove_session(&self, address: &SessionAddress) -> Result<()> {
        Ok(self.store.remove(&session_key(address))?)
    }

    // -- Remote identities --

    pub fn load_identity(&self, address: &SessionAddress) -> Result<Option<IdentityKey>> {
        Ok(self.store.load(&remote_identity_key(address))?)
    }

    /// Pin `identity` for `address`. Returns true when it replaced a
    /// different identity.
    pub fn save_identity(&self, address: &SessionAddress, identity: &IdentityKey) -> Result<bool> {
        let key = remote_identity_key(address);
        let existing: Option<IdentityKey> = self.store.load(&key)?;
        self.store.save(&key, identity)?;

        let changed = matches!(existing, Some(previous) if previous != *identity);
        if changed {
            warn!(address = %address, identity = %identity.short(), "Identity changed for address");
        }
        Ok(changed)
    }

    /// Trust on first use: unknown addresses accept any identity.
    pub fn is_trusted_identity(&self, address: &SessionAddress, identity: &IdentityKey) -> Result<bool> {
        Ok(match self.load_identity(address)? {
            Some(pinned) => pinned == *identity,
            None => true,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn protocol_store() -> ProtocolStore {
        ProtocolStore::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_not_installed_until_identity_and_registration_exist() {
        let store = protocol_store();
        assert_eq!(store.check_registration(), Err(SessionError::NotInstalled));
        assert!(matches!(store.identity_key_pair(), Err(SessionError::NotInstalled)));

        store.inner().save(REGISTRATION_ID_KEY, &12u32).unwrap();
        assert_eq!(store.check_registration(), Err(SessionError::NotInstalled));

        let identity = IdentityKeyPair::generate();
        store.save_identity_key_pair(&identity).unwrap();
        assert_eq!(store.check_registration(), Ok(()));
        assert_eq!(store.local_registration_id().unwrap(), 12);
        assert_eq!(
            store.identity_key_pair().unwrap().public_key(),
            identity.public_key()
        );
    }

    #[test]
    fn test_trust_on_first_use() {
        let store = protocol_store();
        let address = SessionAddress::new("1234", 0);
        let first = IdentityKey([1; 32]);
        let second = IdentityKey([2; 32]);

        assert!(store.is_trusted_identity(&address, &first).unwrap());
        assert!(!store.save_identity(&address, &first).unwrap());
        assert!(store.is_trusted_identity(&address, &first).unwrap());
        assert!(!store.is_trusted_identity(&address, &second).unwrap());

        assert!(store.save_identity(&address, &second).unwrap());
        assert_eq!(store.load_identity(&address).unwrap(), Some(second));
    }

    #[test]
    fn test_pre_key_lifecycle() {
        let store = protocol_store();
        let record = PreKeyRecord {
            key_id: 99,
            secret: [5; 32],
            public: [6; 32],
        };

        store.store_pre_key(&record).unwrap();
        assert!(store.contains_pre_key(99).unwrap());
        assert!(!store.contains_signed_pre_key(99).unwrap());
        assert_eq!(store.load_pre_key(99).unwrap().unwrap().public, [6; 32]);

        store.remove_pre_key(99).unwrap();
        assert!(store.load_pre_key(99).unwrap().is_none());
    }
}
