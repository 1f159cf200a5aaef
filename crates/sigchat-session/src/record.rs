//! Per-peer session state and the symmetric ratchet over it.
//!
//! A [`SessionRecord`] holds the state currently used for sending plus a
//! bounded list of superseded states. Each [`SessionState`] owns one sending
//! and one receiving hash chain; every message consumes one step of a chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sigchat_shared::constants::{
    KDF_CONTEXT_INITIATOR_CHAIN, KDF_CONTEXT_MESSAGE_KEY, KDF_CONTEXT_NEXT_CHAIN,
    KDF_CONTEXT_RESPONDER_CHAIN, PUBKEY_SIZE,
};
use sigchat_shared::crypto::{self, SymmetricKey};
use sigchat_shared::types::IdentityKey;

use crate::error::{Result, SessionError};

/// One direction of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    key: SymmetricKey,
    counter: u32,
}

impl ChainState {
    pub fn new(key: SymmetricKey) -> Self {
        Self { key, counter: 0 }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Step the chain, returning the counter and key of the message slot
    /// just consumed.
    pub fn advance(&mut self) -> (u32, SymmetricKey) {
        let message_key = crypto::derive_key(KDF_CONTEXT_MESSAGE_KEY, &[&self.key]);
        let counter = self.counter;
        self.key = crypto::derive_key(KDF_CONTEXT_NEXT_CHAIN, &[&self.key]);
        self.counter += 1;
        (counter, message_key)
    }
}

/// Which side of the key agreement this state was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
}

/// Prekey header repeated on every outgoing message until the peer replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPreKey {
    pub pre_key_id: u32,
    pub signed_pre_key_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub remote_identity: IdentityKey,
    pub remote_registration_id: u32,
    /// Initiator's ephemeral public key; identifies the state on both sides.
    pub base_key: [u8; PUBKEY_SIZE],
    pub pending_pre_key: Option<PendingPreKey>,
    sending: ChainState,
    receiving: ChainState,
    skipped: BTreeMap<u32, SymmetricKey>,
}

impl SessionState {
    /// Derive both chains from the agreed root key.
    pub fn new(
        role: Role,
        root_key: &SymmetricKey,
        remote_identity: IdentityKey,
        remote_registration_id: u32,
        base_key: [u8; PUBKEY_SIZE],
        pending_pre_key: Option<PendingPreKey>,
    ) -> Self {
        let initiator = ChainState::new(crypto::derive_key(KDF_CONTEXT_INITIATOR_CHAIN, &[root_key]));
        let responder = ChainState::new(crypto::derive_key(KDF_CONTEXT_RESPONDER_CHAIN, &[root_key]));
        let (sending, receiving) = match role {
            Role::Initiator => (initiator, responder),
            Role::Responder => (responder, initiator),
        };

        Self {
            remote_identity,
            remote_registration_id,
            base_key,
            pending_pre_key,
            sending,
            receiving,
            skipped: BTreeMap::new(),
        }
    }

    pub fn next_sending_key(&mut self) -> (u32, SymmetricKey) {
        self.sending.advance()
    }

    /// Message key for `counter` on the receiving chain. Keys for skipped
    /// counters are kept, oldest evicted beyond `max_skipped`.
    pub fn receiving_key(&mut self, counter: u32, max_skipped: usize) -> Result<SymmetricKey> {
        if counter < self.receiving.counter() {
            return self
                .skipped
                .remove(&counter)
                .ok_or(SessionError::DuplicateMessage(counter));
        }

        if (counter - self.receiving.counter()) as usize > max_skipped {
            return Err(SessionError::TooFarAhead {
                counter,
                limit: max_skipped,
            });
        }

        while self.receiving.counter() < counter {
            let (skipped_counter, key) = self.receiving.advance();
            self.skipped.insert(skipped_counter, key);
            if self.skipped.len() > max_skipped {
                self.skipped.pop_first();
            }
        }

        let (_, key) = self.receiving.advance();
        Ok(key)
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    current: Option<SessionState>,
    archived: Vec<SessionState>,
}

impl SessionRecord {
    pub fn current(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub fn archived(&self) -> &[SessionState] {
        &self.archived
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Whether the current state still announces itself with a prekey header.
    pub fn is_pending(&self) -> bool {
        self.current
            .as_ref()
            .map(|state| state.pending_pre_key.is_some())
            .unwrap_or(false)
    }

    /// Current state first, then archived states newest first.
    pub fn states(&self) -> impl Iterator<Item = &SessionState> {
        self.current.iter().chain(self.archived.iter())
    }

    pub fn find_by_base_key(&self, base_key: &[u8; PUBKEY_SIZE]) -> Option<&SessionState> {
        self.states().find(|state| &state.base_key == base_key)
    }

    /// Make `state` current. The previous current state is archived unless
    /// it is the same session; any archived copy of `state` is dropped.
    pub fn promote(&mut self, state: SessionState, max_archived: usize) {
        self.archived.retain(|archived| archived.base_key != state.base_key);
        if let Some(previous) = self.current.take() {
            if previous.base_key != state.base_key {
                self.archived.insert(0, previous);
            }
        }
        self.archived.truncate(max_archived);
        self.current = Some(state);
    }
}
