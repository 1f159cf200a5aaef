//! Map streams that serialize and encrypt outgoing events for one peer and
//! decrypt and deserialize what that peer sends back.

use std::sync::Arc;

use sigchat_shared::events::Event;
use sigchat_shared::serializer::{JsonSerializer, Serializer};
use sigchat_shared::stream::{EventSink, EventSource, MapStream, Subscriber};
use sigchat_shared::types::SessionAddress;

use crate::error::{Result, SessionError};
use crate::protocol_store::ProtocolStore;
use crate::signator::{Ciphertext, Signator};

async fn validate_session_established(address: &SessionAddress, store: &ProtocolStore) -> Result<()> {
    match store.load_identity(address)? {
        Some(_) => Ok(()),
        None => Err(SessionError::NoSession(address.to_string())),
    }
}

/// Events in, ciphertext for `address` out.
pub struct EncryptStream {
    address: SessionAddress,
    inner: MapStream<Event, Result<Ciphertext>>,
}

impl EncryptStream {
    /// Fails with `NoSession` unless a session with `address` exists.
    /// Events are serialized as JSON.
    pub async fn for_address(
        address: SessionAddress,
        store: &ProtocolStore,
        signator: Arc<dyn Signator>,
    ) -> Result<Self> {
        Self::with_serializer(address, store, signator, Arc::new(JsonSerializer::new())).await
    }

    pub async fn with_serializer(
        address: SessionAddress,
        store: &ProtocolStore,
        signator: Arc<dyn Signator>,
        serializer: Arc<dyn Serializer<Event>>,
    ) -> Result<Self> {
        validate_session_established(&address, store).await?;
        Ok(Self::new(address, signator, serializer))
    }

    fn new(
        address: SessionAddress,
        signator: Arc<dyn Signator>,
        serializer: Arc<dyn Serializer<Event>>,
    ) -> Self {
        let target = address.clone();
        let inner = MapStream::new_async(move |event: Event| {
            let signator = Arc::clone(&signator);
            let address = target.clone();
            let plaintext = serializer.serialize(&event);
            async move {
                let plaintext = plaintext?;
                signator.encrypt(&address, plaintext.as_bytes()).await
            }
        });
        Self { address, inner }
    }

    pub fn address(&self) -> &SessionAddress {
        &self.address
    }
}

impl EventSink<Event> for EncryptStream {
    fn push(&self, event: Event) {
        self.inner.push(event);
    }
}

impl EventSource<Result<Ciphertext>> for EncryptStream {
    fn add_subscriber(&self, subscriber: Subscriber<Result<Ciphertext>>) {
        self.inner.add_subscriber(subscriber);
    }
}

/// Ciphertext from `address` in, events out.
pub struct DecryptStream {
    address: SessionAddress,
    inner: MapStream<Ciphertext, Result<Event>>,
}

impl DecryptStream {
    /// Fails with `NoSession` unless a session with `address` exists.
    /// Plaintext is read as JSON.
    pub async fn for_address(
        address: SessionAddress,
        store: &ProtocolStore,
        signator: Arc<dyn Signator>,
    ) -> Result<Self> {
        Self::with_serializer(address, store, signator, Arc::new(JsonSerializer::new())).await
    }

    pub async fn with_serializer(
        address: SessionAddress,
        store: &ProtocolStore,
        signator: Arc<dyn Signator>,
        serializer: Arc<dyn Serializer<Event>>,
    ) -> Result<Self> {
        validate_session_established(&address, store).await?;
        Ok(Self::new(address, signator, serializer))
    }

    fn new(
        address: SessionAddress,
        signator: Arc<dyn Signator>,
        serializer: Arc<dyn Serializer<Event>>,
    ) -> Self {
        let source = address.clone();
        let inner = MapStream::new_async(move |ciphertext: Ciphertext| {
            let signator = Arc::clone(&signator);
            let serializer = Arc::clone(&serializer);
            let address = source.clone();
            async move {
                let plaintext = signator.decrypt(&address, &ciphertext).await?;
                let text = String::from_utf8(plaintext)
                    .map_err(|e| SessionError::MalformedCiphertext(e.to_string()))?;
                Ok(serializer.deserialize(&text)?)
            }
        });
        Self { address, inner }
    }

    pub fn address(&self) -> &SessionAddress {
        &self.address
    }
}

impl EventSink<Ciphertext> for DecryptStream {
    fn push(&self, ciphertext: Ciphertext) {
        self.inner.push(ciphertext);
    }
}

impl EventSource<Result<Event>> for DecryptStream {
    fn add_subscriber(&self, subscriber: Subscriber<Result<Event>>) {
        self.inner.add_subscriber(subscriber);
    }
}
