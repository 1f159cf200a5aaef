//! How a communicator names its peers.
//!
//! Peers are either addressed by their user identifier or by their session
//! address; the communicator is generic over both.

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use sigchat_shared::types::{SessionAddress, User};

pub trait PeerKey:
    Clone + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The key under which `user` is reachable.
    fn for_user(user: &User) -> Self;

    /// Whether a packet sent by this peer may carry `address` as its session
    /// address.
    fn matches(&self, _address: &SessionAddress) -> bool {
        true
    }
}

/// Peers named by user identifier.
impl PeerKey for String {
    fn for_user(user: &User) -> Self {
        user.identifier.clone()
    }
}

/// Peers named by session address.
impl PeerKey for SessionAddress {
    fn for_user(user: &User) -> Self {
        SessionAddress::for_user(user)
    }

    fn matches(&self, address: &SessionAddress) -> bool {
        self == address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            identifier: "01F07WMZ2J7ZD725X25VJ6NE6J".to_string(),
            registration_id: 42,
            device_id: 1,
        }
    }

    #[test]
    fn test_identifier_keys() {
        let key = String::for_user(&user());
        assert_eq!(key, "01F07WMZ2J7ZD725X25VJ6NE6J");
        assert!(key.matches(&SessionAddress::new("7", 0)));
    }

    #[test]
    fn test_address_keys() {
        let key = SessionAddress::for_user(&user());
        assert_eq!(key.to_string(), "42.1");
        assert!(PeerKey::matches(&key, &SessionAddress::new("42", 1)));
        assert!(!PeerKey::matches(&key, &SessionAddress::new("43", 1)));
    }
}
