use async_trait::async_trait;
use tracing::info;
use ulid::Ulid;

use sigchat_shared::crypto::generate_registration_id;
use sigchat_shared::identity::IdentityKeyPair;
use sigchat_shared::types::User;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::protocol_store::{
    ProtocolStore, DEVICE_ID_KEY, IDENTITY_KEY_KEY, REGISTRATION_ID_KEY, USER_ID_KEY,
};
use crate::store::KeyValueStoreExt;

/// Creates and reads back the local user.
#[async_trait]
pub trait UserInstaller: Send + Sync {
    /// Generate whatever part of the local identity is missing. Calling it
    /// again never replaces existing values.
    async fn install(&self) -> Result<()>;

    async fn get_local_user(&self) -> Result<User>;
}

/// Installer writing the local identity into a [`ProtocolStore`].
pub struct StoreUserInstaller {
    store: ProtocolStore,
    device_id: u32,
}

impl StoreUserInstaller {
    pub fn new(store: ProtocolStore, config: &SessionConfig) -> Self {
        Self {
            store,
            device_id: config.device_id,
        }
    }
}

#[async_trait]
impl UserInstaller for StoreUserInstaller {
    async fn install(&self) -> Result<()> {
        let kv = self.store.inner();

        if !kv.contains(USER_ID_KEY)? {
            kv.save(USER_ID_KEY, &Ulid::new().to_string())?;
        }

        if !kv.contains(REGISTRATION_ID_KEY)? {
            kv.save(REGISTRATION_ID_KEY, &generate_registration_id())?;
        }

        if !kv.contains(DEVICE_ID_KEY)? {
            kv.save(DEVICE_ID_KEY, &self.device_id)?;
        }

        if !kv.contains(IDENTITY_KEY_KEY)? {
            let identity = IdentityKeyPair::generate();
            self.store.save_identity_key_pair(&identity)?;
            info!(identity = %identity.public_key().short(), "Generated local identity");
        }

        Ok(())
    }

    async fn get_local_user(&self) -> Result<User> {
        let kv = self.store.inner();
        Ok(User {
            identifier: kv.require(USER_ID_KEY)?,
            registration_id: kv.require(REGISTRATION_ID_KEY)?,
            device_id: kv.require(DEVICE_ID_KEY)?,
        })
    }
}
