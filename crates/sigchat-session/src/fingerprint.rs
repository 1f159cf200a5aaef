//! Numeric safety numbers for out-of-band identity verification.
//!
//! Each party contributes a 30-digit half derived by iterated SHA-512 over
//! its identifier and identity key. The halves are sorted before joining, so
//! both sides of a conversation display the same 60 digits.

use sha2::{Digest, Sha512};

use sigchat_shared::constants::SAFETY_NUMBER_LENGTH;
use sigchat_shared::types::IdentityKey;

const FINGERPRINT_VERSION: u16 = 0;
const CHUNKS: usize = 6;
const CHUNK_BYTES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct SafetyNumberGenerator {
    iterations: u32,
}

impl SafetyNumberGenerator {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn create_for(
        &self,
        local_identifier: &str,
        local_key: &IdentityKey,
        remote_identifier: &str,
        remote_key: &IdentityKey,
    ) -> String {
        let local = self.half(local_identifier.as_bytes(), local_key);
        let remote = self.half(remote_identifier.as_bytes(), remote_key);

        let mut number = String::with_capacity(SAFETY_NUMBER_LENGTH);
        if local <= remote {
            number.push_str(&local);
            number.push_str(&remote);
        } else {
            number.push_str(&remote);
            number.push_str(&local);
        }
        number
    }

    fn half(&self, identifier: &[u8], key: &IdentityKey) -> String {
        let mut hash = Vec::with_capacity(2 + key.as_bytes().len() + identifier.len());
        hash.extend_from_slice(&FINGERPRINT_VERSION.to_be_bytes());
        hash.extend_from_slice(key.as_bytes());
        hash.extend_from_slice(identifier);

        for _ in 0..self.iterations {
            let mut digest = Sha512::new();
            digest.update(&hash);
            digest.update(key.as_bytes());
            hash = digest.finalize().to_vec();
        }

        hash.chunks(CHUNK_BYTES)
            .take(CHUNKS)
            .map(|chunk| {
                let value = chunk.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
                format!("{:05}", value % 100_000)
            })
            .collect()
    }
}
