//! Peers we hold a session with.
//!
//! Maps a peer key to the session address its messages are encrypted under.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use chrono::Utc;
use tracing::debug;

use sigchat_shared::types::SessionAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBookEntry {
    pub address: SessionAddress,
    /// When the peer was added (Unix epoch millis).
    pub added_at: i64,
}

#[derive(Debug, Clone)]
pub struct AddressBook<K> {
    entries: HashMap<K, AddressBookEntry>,
}

impl<K> AddressBook<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record `peer` under `address`, returning the address it replaced.
    pub fn insert(&mut self, peer: K, address: SessionAddress) -> Option<SessionAddress> {
        debug!(peer = %peer, address = %address, "Adding peer to address book");

        let entry = AddressBookEntry {
            address,
            added_at: Utc::now().timestamp_millis(),
        };
        self.entries.insert(peer, entry).map(|previous| previous.address)
    }

    pub fn remove(&mut self, peer: &K) -> Option<SessionAddress> {
        let removed = self.entries.remove(peer).map(|entry| entry.address);
        if removed.is_some() {
            debug!(peer = %peer, "Removed peer from address book");
        }
        removed
    }

    pub fn address_of(&self, peer: &K) -> Option<&SessionAddress> {
        self.entries.get(peer).map(|entry| &entry.address)
    }

    pub fn get(&self, peer: &K) -> Option<&AddressBookEntry> {
        self.entries.get(peer)
    }

    pub fn contains(&self, peer: &K) -> bool {
        self.entries.contains_key(peer)
    }

    pub fn peers(&self) -> Vec<K> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K> Default for AddressBook<K>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut book = AddressBook::new();
        assert!(book.is_empty());

        assert_eq!(book.insert("bob".to_string(), SessionAddress::new("12", 0)), None);
        assert!(book.contains(&"bob".to_string()));
        assert_eq!(
            book.address_of(&"bob".to_string()),
            Some(&SessionAddress::new("12", 0))
        );
        assert!(book.get(&"bob".to_string()).unwrap().added_at > 0);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_insert_replaces() {
        let mut book = AddressBook::new();
        book.insert("bob".to_string(), SessionAddress::new("12", 0));

        let previous = book.insert("bob".to_string(), SessionAddress::new("12", 1));
        assert_eq!(previous, Some(SessionAddress::new("12", 0)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut book = AddressBook::new();
        book.insert("bob".to_string(), SessionAddress::new("12", 0));

        assert_eq!(
            book.remove(&"bob".to_string()),
            Some(SessionAddress::new("12", 0))
        );
        assert_eq!(book.remove(&"bob".to_string()), None);
        assert!(book.peers().is_empty());
    }
}
