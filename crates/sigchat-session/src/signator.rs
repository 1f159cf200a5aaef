//! Session establishment and message encryption between two identities.
//!
//! [`SessionSignator`] runs an X3DH-style agreement over X25519. The
//! initiator combines its identity key and a fresh base key with the
//! responder's identity, signed prekey and one-time prekey:
//!
//! ```text
//! dh1 = DH(IK_a, SPK_b)   dh2 = DH(EK_a, IK_b)
//! dh3 = DH(EK_a, SPK_b)   dh4 = DH(EK_a, OPK_b)
//! root = KDF(dh1 || dh2 || dh3 || dh4)
//! ```
//!
//! Each side then keeps one hash chain per direction. Messages are sealed
//! with XChaCha20-Poly1305 under the per-message chain key, bound to both
//! identities and the message counter. Until the initiator hears back, its
//! messages carry the prekey header so the responder can derive the same
//! root.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use x25519_dalek::{PublicKey as DhPublicKey, StaticSecret};

use sigchat_shared::constants::{KDF_CONTEXT_ROOT_KEY, PUBKEY_SIZE};
use sigchat_shared::crypto::{self, generate_key_id, SymmetricKey};
use sigchat_shared::identity::{dh_public_key, verify_signature, IdentityKeyPair};
use sigchat_shared::types::{
    IdentityKey, PreKeyBundle, PreKeyPublic, SessionAddress, SignedPreKeyPublic,
};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::protocol_store::{PreKeyRecord, ProtocolStore};
use crate::record::{PendingPreKey, Role, SessionState};

/// Distinguishes a session-establishing first message from an ordinary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CiphertextType {
    Whisper = 1,
    PreKey = 3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub message_type: CiphertextType,
    pub body: Vec<u8>,
    /// Registration id of the sender.
    pub registration_id: u32,
}

/// Cryptographic capability the messaging layer is written against.
#[async_trait]
pub trait Signator: Send + Sync {
    /// Generate and store a fresh one-time prekey and signed prekey.
    async fn create_pre_key_bundle(&self) -> Result<PreKeyBundle>;

    /// Establish an outgoing session towards `address` from its bundle.
    async fn create_session(&self, address: &SessionAddress, bundle: &PreKeyBundle) -> Result<()>;

    async fn encrypt(&self, address: &SessionAddress, plaintext: &[u8]) -> Result<Ciphertext>;

    async fn decrypt(&self, address: &SessionAddress, ciphertext: &Ciphertext) -> Result<Vec<u8>>;

    async fn local_identity_key(&self) -> Result<IdentityKey>;

    /// Identity pinned for `address`, present once a session exists.
    async fn remote_identity_key(&self, address: &SessionAddress) -> Result<Option<IdentityKey>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WhisperMessage {
    counter: u32,
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PreKeyWhisperMessage {
    registration_id: u32,
    pre_key_id: u32,
    signed_pre_key_id: u32,
    base_key: [u8; PUBKEY_SIZE],
    identity_key: IdentityKey,
    message: WhisperMessage,
}

fn message_aad(sender: &IdentityKey, receiver: &IdentityKey, counter: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(PUBKEY_SIZE * 2 + 4);
    aad.extend_from_slice(sender.as_bytes());
    aad.extend_from_slice(receiver.as_bytes());
    aad.extend_from_slice(&counter.to_be_bytes());
    aad
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| SessionError::MalformedCiphertext(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| SessionError::MalformedCiphertext(e.to_string()))
}

fn generate_key_pair(key_id: u32) -> PreKeyRecord {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = DhPublicKey::from(&secret);
    PreKeyRecord {
        key_id,
        secret: secret.to_bytes(),
        public: public.to_bytes(),
    }
}

/// Signator backed by a [`ProtocolStore`].
///
/// All state changes are computed on copies and written back only when the
/// whole operation succeeds, so a rejected message leaves the session
/// untouched. Operations on the same address are serialized.
pub struct SessionSignator {
    store: ProtocolStore,
    config: SessionConfig,
    locks: Mutex<HashMap<SessionAddress, Arc<Mutex<()>>>>,
}

impl SessionSignator {
    pub fn new(store: ProtocolStore, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ProtocolStore {
        &self.store
    }

    /// Locks nobody else holds are dropped on the way in, so the map stays
    /// bounded by the number of addresses in use.
    fn lock_for(&self, address: &SessionAddress) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(address.clone()).or_default())
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    fn fresh_key_id(&self, taken: impl Fn(u32) -> Result<bool>) -> Result<u32> {
        loop {
            let key_id = generate_key_id();
            if !taken(key_id)? {
                return Ok(key_id);
            }
            debug!(key_id, "Prekey id collision, drawing again");
        }
    }

    fn build_pre_key_bundle(&self) -> Result<PreKeyBundle> {
        let identity = self.store.identity_key_pair()?;
        let registration_id = self.store.local_registration_id()?;

        let pre_key_id = self.fresh_key_id(|id| self.store.contains_pre_key(id))?;
        let signed_pre_key_id = self.fresh_key_id(|id| self.store.contains_signed_pre_key(id))?;

        let pre_key = generate_key_pair(pre_key_id);
        let signed_pre_key = generate_key_pair(signed_pre_key_id);
        let signature = identity.sign(&signed_pre_key.public);

        self.store.store_pre_key(&pre_key)?;
        self.store.store_signed_pre_key(&signed_pre_key)?;

        debug!(pre_key_id, signed_pre_key_id, "Generated prekey bundle");

        Ok(PreKeyBundle {
            identity_key: identity.public_key(),
            registration_id,
            pre_key: PreKeyPublic {
                key_id: pre_key_id,
                public_key: pre_key.public,
            },
            signed_pre_key: SignedPreKeyPublic {
                key_id: signed_pre_key_id,
                public_key: signed_pre_key.public,
                signature,
            },
        })
    }

    fn process_pre_key_bundle(&self, address: &SessionAddress, bundle: &PreKeyBundle) -> Result<()> {
        verify_signature(
            &bundle.identity_key,
            &bundle.signed_pre_key.public_key,
            &bundle.signed_pre_key.signature,
        )
        .map_err(|_| SessionError::InvalidSignature)?;

        let lock = self.lock_for(address);
        let _guard = lock.lock();

        if !self.store.is_trusted_identity(address, &bundle.identity_key)? {
            return Err(SessionError::UntrustedIdentity(address.to_string()));
        }

        let identity = self.store.identity_key_pair()?;
        let base_secret = StaticSecret::random_from_rng(OsRng);
        let base_key = DhPublicKey::from(&base_secret).to_bytes();

        let their_identity = dh_public_key(&bundle.identity_key)?;
        let their_signed = DhPublicKey::from(bundle.signed_pre_key.public_key);
        let their_one_time = DhPublicKey::from(bundle.pre_key.public_key);

        let dh1 = identity.dh_secret().diffie_hellman(&their_signed);
        let dh2 = base_secret.diffie_hellman(&their_identity);
        let dh3 = base_secret.diffie_hellman(&their_signed);
        let dh4 = base_secret.diffie_hellman(&their_one_time);
        let root = root_key(&[dh1.as_bytes(), dh2.as_bytes(), dh3.as_bytes(), dh4.as_bytes()]);

        let state = SessionState::new(
            Role::Initiator,
            &root,
            bundle.identity_key,
            bundle.registration_id,
            base_key,
            Some(PendingPreKey {
                pre_key_id: bundle.pre_key.key_id,
                signed_pre_key_id: bundle.signed_pre_key.key_id,
            }),
        );

        let mut record = self.store.load_session(address)?.unwrap_or_default();
        record.promote(state, self.config.max_archived_states);

        self.store.save_identity(address, &bundle.identity_key)?;
        self.store.store_session(address, &record)?;

        info!(address = %address, identity = %bundle.identity_key.short(), "Session created from prekey bundle");
        Ok(())
    }

    fn encrypt_message(&self, address: &SessionAddress, plaintext: &[u8]) -> Result<Ciphertext> {
        self.store.check_registration()?;

        let lock = self.lock_for(address);
        let _guard = lock.lock();

        let mut record = self
            .store
            .load_session(address)?
            .ok_or_else(|| SessionError::NoSession(address.to_string()))?;
        let mut state = record
            .current()
            .cloned()
            .ok_or_else(|| SessionError::NoSession(address.to_string()))?;

        let identity = self.store.identity_key_pair()?;
        let local_identity = identity.public_key();
        let registration_id = self.store.local_registration_id()?;

        let (counter, message_key) = state.next_sending_key();
        let aad = message_aad(&local_identity, &state.remote_identity, counter);
        let message = WhisperMessage {
            counter,
            ciphertext: crypto::seal(&message_key, plaintext, &aad)?,
        };

        let (message_type, body) = match &state.pending_pre_key {
            Some(pending) => (
                CiphertextType::PreKey,
                encode(&PreKeyWhisperMessage {
                    registration_id,
                    pre_key_id: pending.pre_key_id,
                    signed_pre_key_id: pending.signed_pre_key_id,
                    base_key: state.base_key,
                    identity_key: local_identity,
                    message,
                })?,
            ),
            None => (CiphertextType::Whisper, encode(&message)?),
        };

        record.promote(state, self.config.max_archived_states);
        self.store.store_session(address, &record)?;

        Ok(Ciphertext {
            message_type,
            body,
            registration_id,
        })
    }

    fn decrypt_message(&self, address: &SessionAddress, ciphertext: &Ciphertext) -> Result<Vec<u8>> {
        let lock = self.lock_for(address);
        let _guard = lock.lock();

        match ciphertext.message_type {
            CiphertextType::PreKey => self.decrypt_pre_key_message(address, &decode(&ciphertext.body)?),
            CiphertextType::Whisper => self.decrypt_whisper_message(address, &decode(&ciphertext.body)?),
        }
    }

    fn decrypt_pre_key_message(
        &self,
        address: &SessionAddress,
        message: &PreKeyWhisperMessage,
    ) -> Result<Vec<u8>> {
        if !self.store.is_trusted_identity(address, &message.identity_key)? {
            return Err(SessionError::UntrustedIdentity(address.to_string()));
        }

        let identity = self.store.identity_key_pair()?;
        let mut record = self.store.load_session(address)?.unwrap_or_default();

        // The initiator repeats the prekey header until it hears back.
        let existing = record.find_by_base_key(&message.base_key).cloned();
        let is_new = existing.is_none();
        let mut state = match existing {
            Some(state) => state,
            None => self.accept_session(&identity, message)?,
        };

        let plaintext = self.open_with(&identity, &mut state, &message.message)?;

        if is_new {
            self.store.remove_pre_key(message.pre_key_id)?;
            self.store.save_identity(address, &message.identity_key)?;
            info!(address = %address, identity = %message.identity_key.short(), "Session accepted from prekey message");
        }
        record.promote(state, self.config.max_archived_states);
        self.store.store_session(address, &record)?;

        Ok(plaintext)
    }

    /// Responder side of the key agreement.
    fn accept_session(
        &self,
        identity: &IdentityKeyPair,
        message: &PreKeyWhisperMessage,
    ) -> Result<SessionState> {
        let signed_pre_key = self
            .store
            .load_signed_pre_key(message.signed_pre_key_id)?
            .ok_or(SessionError::UnknownSignedPreKey(message.signed_pre_key_id))?;
        let one_time = self
            .store
            .load_pre_key(message.pre_key_id)?
            .ok_or(SessionError::UnknownPreKey(message.pre_key_id))?;

        let signed_secret = StaticSecret::from(signed_pre_key.secret);
        let one_time_secret = StaticSecret::from(one_time.secret);
        let their_identity = dh_public_key(&message.identity_key)?;
        let their_base = DhPublicKey::from(message.base_key);

        let dh1 = signed_secret.diffie_hellman(&their_identity);
        let dh2 = identity.dh_secret().diffie_hellman(&their_base);
        let dh3 = signed_secret.diffie_hellman(&their_base);
        let dh4 = one_time_secret.diffie_hellman(&their_base);
        let root = root_key(&[dh1.as_bytes(), dh2.as_bytes(), dh3.as_bytes(), dh4.as_bytes()]);

        Ok(SessionState::new(
            Role::Responder,
            &root,
            message.identity_key,
            message.registration_id,
            message.base_key,
            None,
        ))
    }

    fn decrypt_whisper_message(
        &self,
        address: &SessionAddress,
        message: &WhisperMessage,
    ) -> Result<Vec<u8>> {
        let mut record = self
            .store
            .load_session(address)?
            .ok_or_else(|| SessionError::NoSession(address.to_string()))?;
        let identity = self.store.identity_key_pair()?;

        let mut first_error = None;
        let candidates: Vec<SessionState> = record.states().cloned().collect();
        for mut state in candidates {
            match self.open_with(&identity, &mut state, message) {
                Ok(plaintext) => {
                    // A reply proves the peer holds the session.
                    state.pending_pre_key = None;
                    record.promote(state, self.config.max_archived_states);
                    self.store.store_session(address, &record)?;
                    return Ok(plaintext);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!(address = %address, error = %e, "Failed to decrypt message with any session state");
                Err(e)
            }
            None => Err(SessionError::NoSession(address.to_string())),
        }
    }

    fn open_with(
        &self,
        identity: &IdentityKeyPair,
        state: &mut SessionState,
        message: &WhisperMessage,
    ) -> Result<Vec<u8>> {
        let message_key = state.receiving_key(message.counter, self.config.max_skipped_keys)?;
        let aad = message_aad(&state.remote_identity, &identity.public_key(), message.counter);
        Ok(crypto::open(&message_key, &message.ciphertext, &aad)?)
    }
}

fn root_key(shared: &[&[u8; 32]; 4]) -> SymmetricKey {
    let parts: Vec<&[u8]> = shared.iter().map(|s| s.as_slice()).collect();
    crypto::derive_key(KDF_CONTEXT_ROOT_KEY, &parts)
}

#[async_trait]
impl Signator for SessionSignator {
    async fn create_pre_key_bundle(&self) -> Result<PreKeyBundle> {
        self.build_pre_key_bundle()
    }

    async fn create_session(&self, address: &SessionAddress, bundle: &PreKeyBundle) -> Result<()> {
        self.process_pre_key_bundle(address, bundle)
    }

    async fn encrypt(&self, address: &SessionAddress, plaintext: &[u8]) -> Result<Ciphertext> {
        self.encrypt_message(address, plaintext)
    }

    async fn decrypt(&self, address: &SessionAddress, ciphertext: &Ciphertext) -> Result<Vec<u8>> {
        self.decrypt_message(address, ciphertext)
    }

    async fn local_identity_key(&self) -> Result<IdentityKey> {
        Ok(self.store.identity_key_pair()?.public_key())
    }

    async fn remote_identity_key(&self, address: &SessionAddress) -> Result<Option<IdentityKey>> {
        self.store.load_identity(address)
    }
}
