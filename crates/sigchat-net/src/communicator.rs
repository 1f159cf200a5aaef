//! Encrypted event relay between peers.
//!
//! A [`SessionCommunicator`] owns the local identity, an address book of
//! peers it holds sessions with, and a receive loop that decrypts inbound
//! packets into events. Cryptography is delegated to a [`Signator`].

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sigchat_session::{
    ProtocolStore, SafetyNumberGenerator, SessionConfig, SessionSignator, Signator,
    StoreUserInstaller, UserInstaller,
};
use sigchat_shared::events::Event;
use sigchat_shared::invite::Invite;
use sigchat_shared::serializer::{JsonSerializer, Serializer};
use sigchat_shared::stream::{EventSink, EventSource, EventStream};
use sigchat_shared::types::{SessionAddress, User};

use crate::address_book::AddressBook;
use crate::error::{CommunicatorError, Result};
use crate::packet::WirePacket;
use crate::peer_key::PeerKey;
use crate::transport::{Delivery, Transport};

/// Called with the sending peer and the decrypted event.
pub type PeerHandler<K> = Arc<dyn Fn(K, Event) + Send + Sync>;

#[async_trait]
pub trait PeerToPeerCommunicator<K: Send + Sync>: Send + Sync {
    /// Install or load the local user and start receiving.
    async fn setup(&self) -> Result<User>;

    /// Hand `peer` a fresh prekey bundle so it can open a session towards us.
    /// Only the peer gains a session; we need its handshake in return.
    async fn connect(&self, peer: &K) -> Result<()>;

    async fn send(&self, peer: &K, event: &Event) -> Result<()>;

    fn stream(&self, handler: PeerHandler<K>);

    /// 60 digit number, identical on both ends of the session.
    async fn safety_number_for(&self, peer: &K) -> Result<String>;

    /// Invite code carrying the local user and a fresh prekey bundle.
    async fn invite_code(&self) -> Result<String>;

    /// Open a session from an invite and connect back to its author.
    async fn accept_invite(&self, code: &str) -> Result<K>;
}

#[derive(Debug, Clone)]
struct LocalPeer<K> {
    user: User,
    key: K,
}

struct Inner<K: PeerKey> {
    installer: Arc<dyn UserInstaller>,
    signator: Arc<dyn Signator>,
    transport: Arc<dyn Transport<K>>,
    serializer: Arc<dyn Serializer<Event>>,
    fingerprints: SafetyNumberGenerator,
    local: RwLock<Option<LocalPeer<K>>>,
    address_book: RwLock<AddressBook<K>>,
    inbound: EventStream<(K, Event)>,
}

pub struct SessionCommunicator<K: PeerKey> {
    inner: Arc<Inner<K>>,
}

impl<K: PeerKey> Clone for SessionCommunicator<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: PeerKey> SessionCommunicator<K> {
    pub fn new(
        installer: Arc<dyn UserInstaller>,
        signator: Arc<dyn Signator>,
        transport: Arc<dyn Transport<K>>,
        config: &SessionConfig,
    ) -> Self {
        Self::with_serializer(
            installer,
            signator,
            transport,
            Arc::new(JsonSerializer::new()),
            config,
        )
    }

    pub fn with_serializer(
        installer: Arc<dyn UserInstaller>,
        signator: Arc<dyn Signator>,
        transport: Arc<dyn Transport<K>>,
        serializer: Arc<dyn Serializer<Event>>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                installer,
                signator,
                transport,
                serializer,
                fingerprints: SafetyNumberGenerator::new(config.safety_number_iterations),
                local: RwLock::new(None),
                address_book: RwLock::new(AddressBook::new()),
                inbound: EventStream::new(),
            }),
        }
    }

    /// Store-backed installer and signator sharing `store`.
    pub fn from_store(
        store: ProtocolStore,
        transport: Arc<dyn Transport<K>>,
        config: SessionConfig,
    ) -> Self {
        let installer = Arc::new(StoreUserInstaller::new(store.clone(), &config));
        let signator = Arc::new(SessionSignator::new(store, config.clone()));
        Self::new(installer, signator, transport, &config)
    }

    pub fn local_user(&self) -> Option<User> {
        self.inner.local.read().as_ref().map(|local| local.user.clone())
    }

    pub fn local_key(&self) -> Option<K> {
        self.inner.local.read().as_ref().map(|local| local.key.clone())
    }

    pub fn peers(&self) -> Vec<K> {
        self.inner.address_book.read().peers()
    }

    pub fn address_of(&self, peer: &K) -> Option<SessionAddress> {
        self.inner.address_book.read().address_of(peer).cloned()
    }
}

impl<K: PeerKey> Inner<K> {
    fn local(&self) -> Result<LocalPeer<K>> {
        self.local.read().clone().ok_or(CommunicatorError::NotSetUp)
    }

    fn address_of(&self, peer: &K) -> Result<SessionAddress> {
        self.address_book
            .read()
            .address_of(peer)
            .cloned()
            .ok_or_else(|| CommunicatorError::NoSession(peer.to_string()))
    }

    async fn invite_code(&self) -> Result<String> {
        let local = self.local()?;
        let pre_key_bundle = self.signator.create_pre_key_bundle().await?;
        let invite = Invite {
            user: local.user,
            pre_key_bundle,
        };
        Ok(invite.serialize()?)
    }

    async fn connect(&self, peer: &K) -> Result<()> {
        let local = self.local()?;
        let invite = self.invite_code().await?;
        let packet = WirePacket::Handshake {
            sender: local.key,
            invite,
        }
        .to_bytes()
        .map_err(|e| CommunicatorError::MalformedPacket(e.to_string()))?;

        self.transport.deliver(peer, packet).await?;
        info!(peer = %peer, "Sent handshake");
        Ok(())
    }

    async fn handle_packet(&self, bytes: &[u8]) -> Result<()> {
        let packet = WirePacket::<K>::from_bytes(bytes)
            .map_err(|e| CommunicatorError::MalformedPacket(e.to_string()))?;

        match packet {
            WirePacket::Handshake { sender, invite } => self.handle_handshake(sender, &invite).await,
            WirePacket::Event {
                sender,
                address,
                ciphertext,
            } => {
                if !sender.matches(&address) {
                    return Err(CommunicatorError::SenderMismatch {
                        sender: sender.to_string(),
                        address: address.to_string(),
                    });
                }
                let known = self.address_book.read().address_of(&sender).cloned();
                if let Some(known) = known {
                    if known != address {
                        return Err(CommunicatorError::SenderMismatch {
                            sender: sender.to_string(),
                            address: address.to_string(),
                        });
                    }
                }

                let plaintext = self.signator.decrypt(&address, &ciphertext).await?;
                let text = String::from_utf8(plaintext)
                    .map_err(|e| CommunicatorError::MalformedPacket(e.to_string()))?;
                let event = self.serializer.deserialize(&text)?;

                {
                    let mut book = self.address_book.write();
                    if !book.contains(&sender) {
                        book.insert(sender.clone(), address);
                    }
                }

                debug!(peer = %sender, event_type = event.type_name(), "Received event");
                self.inbound.push((sender, event));
                Ok(())
            }
        }
    }

    async fn handle_handshake(&self, sender: K, code: &str) -> Result<()> {
        let invite = Invite::deserialize(code)?;
        let address = SessionAddress::for_user(&invite.user);
        if K::for_user(&invite.user) != sender {
            return Err(CommunicatorError::SenderMismatch {
                sender: sender.to_string(),
                address: address.to_string(),
            });
        }

        self.signator
            .create_session(&address, &invite.pre_key_bundle)
            .await?;
        self.address_book.write().insert(sender.clone(), address);

        info!(peer = %sender, "Accepted handshake");
        Ok(())
    }
}

async fn receive_loop<K: PeerKey>(
    inner: Weak<Inner<K>>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(Delivery { packet, receipt }) = deliveries.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        if let Err(e) = inner.handle_packet(&packet).await {
            warn!(error = %e, len = packet.len(), "Dropping inbound packet");
        }
        let _ = receipt.send(());
    }

    debug!("Receive loop stopped");
}

#[async_trait]
impl<K: PeerKey> PeerToPeerCommunicator<K> for SessionCommunicator<K> {
    async fn setup(&self) -> Result<User> {
        let inner = &self.inner;
        inner.installer.install().await?;
        let user = inner.installer.get_local_user().await?;
        let key = K::for_user(&user);

        let (inbox, deliveries) = mpsc::unbounded_channel();
        inner.transport.register(key.clone(), inbox).await?;
        *inner.local.write() = Some(LocalPeer {
            user: user.clone(),
            key: key.clone(),
        });
        tokio::spawn(receive_loop(Arc::downgrade(inner), deliveries));

        info!(peer = %key, "Communicator ready");
        Ok(user)
    }

    async fn connect(&self, peer: &K) -> Result<()> {
        self.inner.connect(peer).await
    }

    async fn send(&self, peer: &K, event: &Event) -> Result<()> {
        let inner = &self.inner;
        let local = inner.local()?;
        let address = inner.address_of(peer)?;

        let text = inner.serializer.serialize(event)?;
        let ciphertext = inner.signator.encrypt(&address, text.as_bytes()).await?;
        let packet = WirePacket::Event {
            sender: local.key,
            address: SessionAddress::for_user(&local.user),
            ciphertext,
        }
        .to_bytes()
        .map_err(|e| CommunicatorError::MalformedPacket(e.to_string()))?;

        inner.transport.deliver(peer, packet).await?;
        debug!(peer = %peer, event_type = event.type_name(), "Sent event");
        Ok(())
    }

    fn stream(&self, handler: PeerHandler<K>) {
        self.inner
            .inbound
            .subscribe(move |(peer, event)| handler(peer, event));
    }

    async fn safety_number_for(&self, peer: &K) -> Result<String> {
        let inner = &self.inner;
        let local = inner.local()?;
        let address = inner.address_of(peer)?;

        let ours = inner.signator.local_identity_key().await?;
        let theirs = inner
            .signator
            .remote_identity_key(&address)
            .await?
            .ok_or_else(|| CommunicatorError::NoSession(peer.to_string()))?;

        Ok(inner.fingerprints.create_for(
            &local.key.to_string(),
            &ours,
            &peer.to_string(),
            &theirs,
        ))
    }

    async fn invite_code(&self) -> Result<String> {
        self.inner.invite_code().await
    }

    async fn accept_invite(&self, code: &str) -> Result<K> {
        let inner = &self.inner;
        inner.local()?;
        let invite = Invite::deserialize(code)?;
        let peer = K::for_user(&invite.user);
        let address = SessionAddress::for_user(&invite.user);

        inner
            .signator
            .create_session(&address, &invite.pre_key_bundle)
            .await?;
        inner.address_book.write().insert(peer.clone(), address);
        inner.connect(&peer).await?;

        info!(peer = %peer, "Accepted invite");
        Ok(peer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sigchat_session::InMemoryStore;
    use sigchat_shared::constants::SAFETY_NUMBER_LENGTH;

    use super::*;
    use crate::transport::InMemoryTransport;

    fn communicator<K: PeerKey>(
        transport: &Arc<InMemoryTransport<K>>,
        device_id: u32,
    ) -> SessionCommunicator<K> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = SessionConfig {
            device_id,
            safety_number_iterations: 10,
            ..SessionConfig::default()
        };
        let store = ProtocolStore::new(Arc::new(InMemoryStore::new()));
        SessionCommunicator::from_store(store, transport.clone(), config)
    }

    fn collect<K: PeerKey>(communicator: &SessionCommunicator<K>) -> mpsc::UnboundedReceiver<(K, Event)> {
        let (tx, rx) = mpsc::unbounded_channel();
        communicator.stream(Arc::new(move |peer: K, event: Event| {
            let _ = tx.send((peer, event));
        }));
        rx
    }

    fn message(from: &User, body: &str) -> Event {
        Event::add_message(from.clone(), "conversation", body, Utc::now())
    }

    #[tokio::test]
    async fn test_event_reaches_peer_once() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        let bob = communicator(&transport, 0);
        let alice_user = alice.setup().await.unwrap();
        let bob_user = bob.setup().await.unwrap();
        let mut received = collect(&alice);

        alice.connect(&bob_user.identifier).await.unwrap();
        let event = message(&bob_user, "hey alice!");
        bob.send(&alice_user.identifier, &event).await.unwrap();

        let (sender, got) = received.try_recv().unwrap();
        assert_eq!(sender, bob_user.identifier);
        assert_eq!(got, event);
        assert!(received.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_are_attributed_to_their_sender() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        let bob = communicator(&transport, 0);
        let jamie = communicator(&transport, 0);
        let alice_user = alice.setup().await.unwrap();
        let bob_user = bob.setup().await.unwrap();
        let jamie_user = jamie.setup().await.unwrap();
        let mut received = collect(&alice);

        alice.connect(&bob_user.identifier).await.unwrap();
        alice.connect(&jamie_user.identifier).await.unwrap();

        let from_bob = message(&bob_user, "from bob");
        let from_jamie = message(&jamie_user, "from jamie");
        bob.send(&alice_user.identifier, &from_bob).await.unwrap();
        jamie.send(&alice_user.identifier, &from_jamie).await.unwrap();

        assert_eq!(received.try_recv().unwrap(), (bob_user.identifier.clone(), from_bob));
        assert_eq!(received.try_recv().unwrap(), (jamie_user.identifier.clone(), from_jamie));

        let mut peers = alice.peers();
        peers.sort();
        let mut expected = vec![bob_user.identifier, jamie_user.identifier];
        expected.sort();
        assert_eq!(peers, expected);
    }

    #[tokio::test]
    async fn test_send_without_session() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        let bob = communicator(&transport, 0);
        let alice_user = alice.setup().await.unwrap();
        let bob_user = bob.setup().await.unwrap();

        let result = alice
            .send(&bob_user.identifier, &message(&alice_user, "too early"))
            .await;

        assert_eq!(
            result,
            Err(CommunicatorError::NoSession(bob_user.identifier.clone()))
        );
        assert!(alice.peers().is_empty());
        assert_eq!(alice.address_of(&bob_user.identifier), None);
    }

    #[tokio::test]
    async fn test_requires_setup() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);

        assert_eq!(
            alice.connect(&"bob".to_string()).await,
            Err(CommunicatorError::NotSetUp)
        );
        assert_eq!(alice.invite_code().await, Err(CommunicatorError::NotSetUp));
        assert!(alice.local_user().is_none());
    }

    #[tokio::test]
    async fn test_bad_packets_do_not_stop_the_receive_loop() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        let bob = communicator(&transport, 0);
        let alice_user = alice.setup().await.unwrap();
        let bob_user = bob.setup().await.unwrap();
        let mut received = collect(&alice);
        alice.connect(&bob_user.identifier).await.unwrap();

        transport
            .deliver(&alice_user.identifier, vec![0xff; 16])
            .await
            .unwrap();

        let forged = WirePacket::Event {
            sender: bob_user.identifier.clone(),
            address: SessionAddress::for_user(&bob_user),
            ciphertext: sigchat_session::Ciphertext {
                message_type: sigchat_session::CiphertextType::Whisper,
                body: vec![7; 40],
                registration_id: bob_user.registration_id,
            },
        };
        transport
            .deliver(&alice_user.identifier, forged.to_bytes().unwrap())
            .await
            .unwrap();
        assert!(received.try_recv().is_err());

        let event = message(&bob_user, "still there?");
        bob.send(&alice_user.identifier, &event).await.unwrap();
        assert_eq!(received.try_recv().unwrap().1, event);
    }

    #[tokio::test]
    async fn test_handshake_must_come_from_invite_author() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        let bob = communicator(&transport, 0);
        let alice_user = alice.setup().await.unwrap();
        bob.setup().await.unwrap();

        let spoofed = WirePacket::Handshake {
            sender: "mallory".to_string(),
            invite: bob.invite_code().await.unwrap(),
        };
        transport
            .deliver(&alice_user.identifier, spoofed.to_bytes().unwrap())
            .await
            .unwrap();

        assert!(alice.peers().is_empty());
    }

    #[tokio::test]
    async fn test_safety_numbers_match() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let fox = communicator(&transport, 0);
        let dana = communicator(&transport, 0);
        let fox_user = fox.setup().await.unwrap();
        let dana_user = dana.setup().await.unwrap();

        fox.connect(&dana_user.identifier).await.unwrap();
        dana.connect(&fox_user.identifier).await.unwrap();

        let from_fox = fox.safety_number_for(&dana_user.identifier).await.unwrap();
        let from_dana = dana.safety_number_for(&fox_user.identifier).await.unwrap();

        assert_eq!(from_fox, from_dana);
        assert_eq!(from_fox.len(), SAFETY_NUMBER_LENGTH);
    }

    #[tokio::test]
    async fn test_safety_number_needs_session() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let fox = communicator(&transport, 0);
        fox.setup().await.unwrap();

        assert_eq!(
            fox.safety_number_for(&"dana".to_string()).await,
            Err(CommunicatorError::NoSession("dana".to_string()))
        );
    }

    #[tokio::test]
    async fn test_address_keyed_peers() {
        let transport = Arc::new(InMemoryTransport::<SessionAddress>::new());
        let alice = communicator(&transport, 1);
        let bob = communicator(&transport, 2);
        let alice_user = alice.setup().await.unwrap();
        let bob_user = bob.setup().await.unwrap();
        let alice_address = SessionAddress::for_user(&alice_user);
        let bob_address = SessionAddress::for_user(&bob_user);
        let mut received = collect(&alice);

        alice.connect(&bob_address).await.unwrap();
        let event = message(&bob_user, "hey alice!");
        bob.send(&alice_address, &event).await.unwrap();

        assert_eq!(received.try_recv().unwrap(), (bob_address.clone(), event));
        assert_eq!(alice.local_key(), Some(alice_address));
    }

    #[tokio::test]
    async fn test_invite_opens_both_directions() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        let bob = communicator(&transport, 0);
        let alice_user = alice.setup().await.unwrap();
        let bob_user = bob.setup().await.unwrap();
        let mut alice_received = collect(&alice);
        let mut bob_received = collect(&bob);

        let code = bob.invite_code().await.unwrap();
        let inviter = alice.accept_invite(&code).await.unwrap();
        assert_eq!(inviter, bob_user.identifier);
        assert_eq!(bob.peers(), vec![alice_user.identifier.clone()]);

        let hello = message(&alice_user, "hi bob");
        alice.send(&bob_user.identifier, &hello).await.unwrap();
        assert_eq!(bob_received.try_recv().unwrap().1, hello);

        let reply = message(&bob_user, "hi alice");
        bob.send(&alice_user.identifier, &reply).await.unwrap();
        assert_eq!(alice_received.try_recv().unwrap().1, reply);
    }

    #[tokio::test]
    async fn test_malformed_invite() {
        let transport = Arc::new(InMemoryTransport::<String>::new());
        let alice = communicator(&transport, 0);
        alice.setup().await.unwrap();

        assert!(matches!(
            alice.accept_invite("not an invite").await,
            Err(CommunicatorError::Invite(_))
        ));
        assert!(alice.peers().is_empty());
    }
}
